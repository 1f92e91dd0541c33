//! Per-attempt records handed to an external usage/latency collaborator
//!
//! The orchestrator produces one [`AttemptRecord`] per provider invocation
//! and passes it to an [`AttemptSink`]. Nothing is retained here.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, ProviderError};
use crate::providers::ProviderIdentity;

/// Result of one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure { kind: ErrorKind, message: String },
}

impl AttemptOutcome {
    pub fn failure(err: &ProviderError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Shared by every attempt of one orchestrated generation
    pub request_id: Uuid,
    pub identity: ProviderIdentity,
    /// 1-based, per provider/model
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
}

/// Receiver for attempt records
pub trait AttemptSink: Send + Sync {
    fn record(&self, record: AttemptRecord);
}

/// Default sink: emits each record as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AttemptSink for TracingSink {
    fn record(&self, record: AttemptRecord) {
        match &record.outcome {
            AttemptOutcome::Success => debug!(
                request_id = %record.request_id,
                provider = %record.identity,
                attempt = record.attempt,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "attempt succeeded"
            ),
            AttemptOutcome::Failure { kind, message } => warn!(
                request_id = %record.request_id,
                provider = %record.identity,
                attempt = record.attempt,
                elapsed_ms = record.elapsed.as_millis() as u64,
                kind = %kind,
                "attempt failed: {}",
                message
            ),
        }
    }
}

/// Sink that buffers records in memory, for callers that inspect them afterwards
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AttemptRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<AttemptRecord> {
        match self.records.lock() {
            Ok(mut records) => std::mem::take(&mut *records),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AttemptSink for MemorySink {
    fn record(&self, record: AttemptRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            request_id: Uuid::new_v4(),
            identity: ProviderIdentity::new("openai", "gpt-4o"),
            attempt: 1,
            outcome,
            elapsed: Duration::from_millis(42),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome = AttemptOutcome::failure(&ProviderError::transient("429 rate limit"));
        assert_eq!(
            outcome,
            AttemptOutcome::Failure {
                kind: ErrorKind::Transient,
                message: "429 rate limit".to_string()
            }
        );
        assert!(!outcome.is_success());
        assert!(AttemptOutcome::Success.is_success());
    }

    #[test]
    fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.record(record(AttemptOutcome::Success));
        sink.record(record(AttemptOutcome::failure(&ProviderError::terminal("401"))));

        let records = sink.take();
        assert_eq!(records.len(), 2);
        assert!(records[0].outcome.is_success());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_record_serializes_outcome_tag() {
        let json = serde_json::to_value(record(AttemptOutcome::failure(
            &ProviderError::terminal("bad key"),
        )))
        .unwrap();
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["outcome"]["kind"], "terminal");
        assert_eq!(json["identity"]["vendor"], "openai");
    }

    #[test]
    fn test_tracing_sink_accepts_records() {
        TracingSink.record(record(AttemptOutcome::Success));
        TracingSink.record(record(AttemptOutcome::failure(&ProviderError::transient("timeout"))));
    }
}
