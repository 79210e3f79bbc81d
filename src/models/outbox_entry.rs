use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    /// An attempt is in flight until `lease_expires_at`.
    Claimed,
    Failed,
    Succeeded,
    Abandoned,
    /// No executor can ever handle this entry (unknown action type or permanently bad payload).
    Unroutable,
    /// Ran out of attempts.
    Exhausted,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 7] = [
        EntryStatus::Pending,
        EntryStatus::Claimed,
        EntryStatus::Failed,
        EntryStatus::Succeeded,
        EntryStatus::Abandoned,
        EntryStatus::Unroutable,
        EntryStatus::Exhausted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Claimed => "claimed",
            EntryStatus::Failed => "failed",
            EntryStatus::Succeeded => "succeeded",
            EntryStatus::Abandoned => "abandoned",
            EntryStatus::Unroutable => "unroutable",
            EntryStatus::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryStatus::Succeeded
                | EntryStatus::Abandoned
                | EntryStatus::Unroutable
                | EntryStatus::Exhausted
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EntryError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntryError {
    #[error("entry {id} is {status} and accepts no further attempts")]
    Terminal { id: Uuid, status: EntryStatus },
    #[error("unknown entry status: {0}")]
    UnknownStatus(String),
}

/// One deferred side effect and its delivery history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub status: EntryStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful save; 0 means never saved.
    pub version: i64,
}

impl OutboxEntry {
    pub fn new(action_type: impl Into<String>, payload: serde_json::Value, max_attempts: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            action_type: action_type.into(),
            payload,
            status: EntryStatus::Pending,
            attempts: 0,
            max_attempts,
            last_attempted_at: None,
            created_at: Utc::now(),
            external_id: None,
            error_message: None,
            lease_expires_at: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True while another attempt holds a live lease on this entry.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Claimed
            && self.lease_expires_at.is_some_and(|expires| expires > now)
    }

    pub fn mark_attempt(&mut self, now: DateTime<Utc>) -> Result<(), EntryError> {
        if self.is_terminal() {
            return Err(EntryError::Terminal {
                id: self.id,
                status: self.status,
            });
        }
        self.attempts += 1;
        self.last_attempted_at = Some(now);
        Ok(())
    }

    /// Record an attempt and take a lease on the entry for `lease`.
    pub fn claim(&mut self, now: DateTime<Utc>, lease: Duration) -> Result<(), EntryError> {
        self.mark_attempt(now)?;
        let expires = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or_else(|| now + chrono::Duration::days(365));
        self.status = EntryStatus::Claimed;
        self.lease_expires_at = Some(expires);
        Ok(())
    }

    pub fn mark_success(&mut self, external_id: impl Into<String>) {
        self.status = EntryStatus::Succeeded;
        self.external_id = Some(external_id.into());
        self.error_message = None;
        self.lease_expires_at = None;
    }

    pub fn mark_failed(&mut self, err: impl fmt::Display) {
        self.status = EntryStatus::Failed;
        self.error_message = Some(err.to_string());
        self.lease_expires_at = None;
    }

    pub fn mark_unroutable(&mut self, err: impl fmt::Display) {
        self.status = EntryStatus::Unroutable;
        self.error_message = Some(err.to_string());
        self.lease_expires_at = None;
    }

    /// Keeps the last failure message so operators can see why it gave up.
    pub fn mark_exhausted(&mut self) {
        self.status = EntryStatus::Exhausted;
        self.lease_expires_at = None;
    }

    pub fn mark_abandoned(&mut self) {
        self.status = EntryStatus::Abandoned;
        self.lease_expires_at = None;
    }

    pub fn next_retry_delay(&self, base_delay: Duration, max_delay: Duration) -> Duration {
        backoff::next_retry_delay(self.attempts, base_delay, max_delay)
    }

    /// Whether enough time has passed since the last attempt for another one.
    pub fn is_due(&self, now: DateTime<Utc>, base_delay: Duration, max_delay: Duration) -> bool {
        let Some(last) = self.last_attempted_at else {
            return true;
        };
        let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
        elapsed >= self.next_retry_delay(base_delay, max_delay)
    }
}

/// Row shape of `outbox_entries`; status is stored as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = EntryError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            id: row.id,
            action_type: row.action_type,
            payload: row.payload,
            status: row.status.parse()?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_attempted_at: row.last_attempted_at,
            created_at: row.created_at,
            external_id: row.external_id,
            error_message: row.error_message,
            lease_expires_at: row.lease_expires_at,
            version: row.version,
        })
    }
}
