use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::{ExecutionContext, Executor, ExecutorError};
use crate::config::SmtpConfig;

#[derive(Debug, Deserialize)]
struct EmailPayload {
    to: Vec<String>,
    subject: String,
    body: String,
    #[serde(default)]
    html: bool,
}

/// Sends transactional mail over SMTP.
///
/// The Message-ID is derived from the entry id, so a re-delivered entry
/// produces the same Message-ID and is also the external id.
pub struct EmailExecutor {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailExecutor {
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.user.clone(), config.pass.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("SMTP starttls error: {e}"))?
            .port(config.port)
            .credentials(creds)
            .build();

        let from = config
            .from
            .parse()
            .map_err(|e| format!("Invalid from address: {e}"))?;

        Ok(Self { transport, from })
    }
}

fn message_id_for(from: &Mailbox, ctx: &ExecutionContext) -> String {
    format!("<outbox.{}@{}>", ctx.entry_id, from.email.domain())
}

fn build_message(
    from: &Mailbox,
    ctx: &ExecutionContext,
    payload: &serde_json::Value,
) -> Result<(Message, String), ExecutorError> {
    let email: EmailPayload = serde_json::from_value(payload.clone())
        .map_err(|e| ExecutorError::permanent(format!("Invalid email payload: {e}")))?;

    if email.to.is_empty() {
        return Err(ExecutorError::permanent("Email has no recipients"));
    }

    let message_id = message_id_for(from, ctx);
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(email.subject)
        .message_id(Some(message_id.clone()));

    for to in &email.to {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| ExecutorError::permanent(format!("Invalid to address '{to}': {e}")))?;
        builder = builder.to(mailbox);
    }

    let content_type = if email.html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    let message = builder
        .header(content_type)
        .body(email.body)
        .map_err(|e| ExecutorError::permanent(format!("Failed to build email: {e}")))?;

    Ok((message, message_id))
}

/// 5xx replies (unknown mailbox, rejected sender) fail the same way on every retry.
fn send_error(e: SmtpError) -> ExecutorError {
    let message = format!("Failed to send email: {e}");
    if e.is_permanent() {
        ExecutorError::permanent(message)
    } else {
        ExecutorError::transient(message)
    }
}

#[async_trait]
impl Executor for EmailExecutor {
    fn action_type(&self) -> &str {
        "email"
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError> {
        let (message, message_id) = build_message(&self.from, ctx, payload)?;

        self.transport
            .send(message)
            .await
            .map_err(send_error)?;

        Ok(message_id)
    }
}
