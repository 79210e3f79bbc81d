pub mod email;
pub mod github;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying later (network trouble, 5xx, rate limiting).
    Transient,
    /// Will fail the same way every time (malformed payload, rejected request).
    Permanent,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ErrorKind::Permanent
    }
}

/// What an executor knows about the attempt it is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub entry_id: Uuid,
    pub attempt: i32,
}

/// Performs the external call for one action type.
///
/// Delivery is at-least-once: the same entry may be executed again after a
/// crash or a lost save, so implementations should be idempotent or make the
/// duplicate detectable through `ExecutionContext::entry_id`.
#[async_trait]
pub trait Executor: Send + Sync {
    fn action_type(&self) -> &str;

    /// Returns the external identifier of whatever was created.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError>;
}

#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let action_type = executor.action_type().to_string();
        if self.executors.insert(action_type.clone(), executor).is_some() {
            tracing::warn!("Executor for {action_type} replaced");
        }
    }

    pub fn get(&self, action_type: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(action_type)
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.executors.contains_key(action_type)
    }

    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Executor for Named {
        fn action_type(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
            _payload: &serde_json::Value,
        ) -> Result<String, ExecutorError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn looks_up_by_action_type() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(Named("email")));
        registry.register(Arc::new(Named("github_issue")));

        assert!(registry.contains("email"));
        assert_eq!(registry.get("github_issue").unwrap().action_type(), "github_issue");
        assert!(registry.get("sms").is_none());
        assert_eq!(registry.action_types(), vec!["email", "github_issue"]);
    }

    #[test]
    fn error_displays_only_its_message() {
        let err = ExecutorError::transient("smtp timeout");
        assert_eq!(err.to_string(), "smtp timeout");
        assert!(!err.is_permanent());
        assert!(ExecutorError::permanent("bad payload").is_permanent());
    }
}
