use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use dojo_outbox::config::{Config, OutboxConfig};
use dojo_outbox::db::MemoryOutboxStore;
use dojo_outbox::executors::{ExecutionContext, Executor, ExecutorError, ExecutorRegistry};
use dojo_outbox::state::SharedState;

pub const ADMIN_TOKEN: &str = "test-admin-token-long-enough";

/// Stands in for the SMTP executor. Payload flags pick the outcome:
/// `"fail": true` is a transient error, `"bad": true` a permanent one.
pub struct FakeMailer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Executor for FakeMailer {
    fn action_type(&self) -> &str {
        "email"
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        payload: &Value,
    ) -> Result<String, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if payload["bad"].as_bool().unwrap_or(false) {
            return Err(ExecutorError::permanent("Email has no recipients"));
        }
        if payload["fail"].as_bool().unwrap_or(false) {
            return Err(ExecutorError::transient("smtp timeout"));
        }
        Ok(format!("<outbox.{}@dojo.test>", ctx.entry_id))
    }
}

/// A running test server backed by the in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: SharedState,
    pub mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn mailer_calls(&self) -> usize {
        self.mailer.calls.load(Ordering::SeqCst)
    }

    /// Make an authenticated GET request.
    pub async fn get_auth(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Enqueue an email entry, return the entry JSON.
    pub async fn enqueue_email(&self, payload: Value) -> Value {
        let (body, status) = self
            .post_auth(
                "/api/v1/outbox",
                &json!({ "action_type": "email", "payload": payload }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "enqueue failed: {body}");
        body
    }
}

/// Spawn a test app on a random port.
pub async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: None,
        admin_token: ADMIN_TOKEN.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        log_level: "warn".to_string(),
        outbox: OutboxConfig::default(),
        github: None,
        smtp: None,
    };

    let mailer = Arc::new(FakeMailer {
        calls: AtomicUsize::new(0),
    });
    let mut executors = ExecutorRegistry::new();
    executors.register(mailer.clone());

    let (app, state) =
        dojo_outbox::build_app(Arc::new(MemoryOutboxStore::new()), executors, config);

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        state,
        mailer,
    }
}
