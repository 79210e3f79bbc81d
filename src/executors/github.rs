use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::json;

use super::{ExecutionContext, Executor, ExecutorError};
use crate::config::GithubConfig;

#[derive(Debug, Deserialize)]
struct IssuePayload {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    labels: Vec<String>,
    /// `owner/name`
    repository: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

/// Opens an issue through the GitHub REST API. The external id is the issue number.
pub struct GithubIssueExecutor {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl GithubIssueExecutor {
    pub fn new(config: &GithubConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build GitHub client: {e}"))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

fn parse_payload(payload: &serde_json::Value) -> Result<IssuePayload, ExecutorError> {
    let issue: IssuePayload = serde_json::from_value(payload.clone())
        .map_err(|e| ExecutorError::permanent(format!("Invalid github_issue payload: {e}")))?;

    if issue.title.trim().is_empty() {
        return Err(ExecutorError::permanent("Issue title is required"));
    }

    match issue.repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(issue)
        }
        _ => Err(ExecutorError::permanent(format!(
            "Invalid repository '{}', expected owner/name",
            issue.repository
        ))),
    }
}

fn is_permanent_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::UNPROCESSABLE_ENTITY
    )
}

#[async_trait]
impl Executor for GithubIssueExecutor {
    fn action_type(&self) -> &str {
        "github_issue"
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError> {
        let issue = parse_payload(payload)?;

        // Marker lets a human or a later search spot duplicates from re-delivery.
        let body = format!("{}\n\n<!-- outbox:{} -->", issue.body, ctx.entry_id);

        let url = format!("{}/repos/{}/issues", self.api_url, issue.repository);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "dojo-outbox")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&json!({
                "title": issue.title,
                "body": body,
                "labels": issue.labels,
            }))
            .send()
            .await
            .map_err(|e| ExecutorError::transient(format!("GitHub request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(512)
                .collect::<String>();
            let message = format!("GitHub returned {status}: {detail}");
            return Err(if is_permanent_status(status) {
                ExecutorError::permanent(message)
            } else {
                ExecutorError::transient(message)
            });
        }

        let created: CreatedIssue = resp
            .json()
            .await
            .map_err(|e| ExecutorError::transient(format!("Unreadable GitHub response: {e}")))?;

        tracing::debug!(
            "Created issue #{} in {} for entry {}",
            created.number,
            issue.repository,
            ctx.entry_id
        );

        Ok(created.number.to_string())
    }
}
