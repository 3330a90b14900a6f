use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OutboxError, Result};

/// Surrogate key of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagedEventId(i64);

impl StagedEventId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StagedEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of an outbox row.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Sent
///           └──► Failed
/// ```
/// Each row leaves `Pending` exactly once; `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Waiting for the relay.
    #[default]
    Pending,

    /// Acknowledged by the broker (terminal state).
    Sent,

    /// Gave up after too many failed publish attempts (terminal state).
    Failed,
}

impl OutboxStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Sent | OutboxStatus::Failed)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SENT" => Ok(OutboxStatus::Sent),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(OutboxError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event ready to be inserted into the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStagedEvent {
    pub correlation_key: String,
    pub topic: String,
    pub event_type: String,
    /// Serialized event body; opaque to the store.
    pub payload: String,
}

/// A row of the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedEvent {
    pub id: StagedEventId,
    /// Business ID the event is about; also the broker partition key.
    pub correlation_key: String,
    pub topic: String,
    pub event_type: String,
    pub payload: String,
    pub status: OutboxStatus,
    /// Number of failed publish attempts so far.
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedEvent {
    /// Creates a pending row from a new event.
    pub fn pending(id: StagedEventId, event: NewStagedEvent, now: DateTime<Utc>) -> Self {
        Self {
            id,
            correlation_key: event.correlation_key,
            topic: event.topic,
            event_type: event.event_type,
            payload: event.payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a successful publish.
    pub fn mark_sent(&mut self) -> Result<()> {
        self.ensure_pending(OutboxStatus::Sent)?;
        self.status = OutboxStatus::Sent;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a failed publish attempt and returns the resulting status.
    ///
    /// The row becomes `Failed` on the attempt that brings `retry_count` up to
    /// `max_retry_count`; otherwise it stays `Pending` for the next tick.
    pub fn record_failed_attempt(
        &mut self,
        error: impl Into<String>,
        max_retry_count: u32,
    ) -> Result<OutboxStatus> {
        self.ensure_pending(OutboxStatus::Failed)?;
        self.retry_count += 1;
        self.last_error = Some(error.into());
        if self.retry_count >= max_retry_count {
            self.status = OutboxStatus::Failed;
        }
        self.updated_at = Utc::now();
        Ok(self.status)
    }

    fn ensure_pending(&self, to: OutboxStatus) -> Result<()> {
        if self.status != OutboxStatus::Pending {
            return Err(OutboxError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
