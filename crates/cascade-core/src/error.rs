//! Error types shared by providers and the fallback orchestrator
//!
//! Every vendor failure is flattened into a [`ProviderError`] tagged with an
//! [`ErrorKind`], so retry and fallback decisions are made on data rather than
//! on vendor-specific error hierarchies.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a provider failure might succeed if attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, rate limits, 5xx, dropped connections
    Transient,
    /// Invalid credentials, malformed requests, exhausted quota, unusable responses
    Terminal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// A single failed generation attempt against one provider
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    kind: ErrorKind,
    status: Option<u16>,
    message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Terminal,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response from a vendor API
    ///
    /// An exhausted quota is terminal even when reported as a 429.
    pub fn from_status(vendor: &str, status: u16, body: &str) -> Self {
        let kind = if is_retryable_status(status) && !is_quota_exhausted(body) {
            ErrorKind::Transient
        } else {
            ErrorKind::Terminal
        };
        Self {
            kind,
            status: Some(status),
            message: format!("{} API request failed with status {}: {}", vendor, status, body),
        }
    }

    /// Classify a transport-level failure from the HTTP client
    pub fn from_reqwest(vendor: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            ErrorKind::Transient
        } else {
            ErrorKind::Terminal
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            message: format!("{} request failed: {}", vendor, err),
        }
    }

    /// An attempt cut short by the orchestrator's overall deadline
    pub fn deadline(limit: Duration) -> Self {
        Self::transient(format!("attempt aborted: deadline of {:?} exceeded", limit))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || (500..600).contains(&status)
}

/// Billing-level exhaustion markers: OpenAI-style error codes and Gemini's
/// `RESOURCE_EXHAUSTED` status when it names a quota
fn is_quota_exhausted(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("insufficient_quota")
        || body.contains("billing_hard_limit_reached")
        || (body.contains("resource_exhausted") && body.contains("quota"))
}

/// Failure of a whole orchestrated generation in strategy mode
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Nothing to walk: no providers registered, or an empty strategy
    #[error("inference is unconfigured: {0}")]
    Unconfigured(String),

    /// Every entry was tried and failed; only the most recent cause is kept
    #[error("all models in strategy '{strategy}' failed after {attempts} attempts: {last}")]
    Exhausted {
        strategy: String,
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    /// The overall budget ran out before any entry succeeded
    #[error("inference deadline exceeded after {elapsed:?}")]
    DeadlineExceeded {
        elapsed: Duration,
        #[source]
        last: Option<ProviderError>,
    },
}

impl CascadeError {
    /// The last underlying provider failure, if one was captured
    pub fn last_provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Unconfigured(_) => None,
            Self::Exhausted { last, .. } => Some(last),
            Self::DeadlineExceeded { last, .. } => last.as_ref(),
        }
    }

    pub fn is_unconfigured(&self) -> bool {
        matches!(self, Self::Unconfigured(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::from_status("openai", 429, "slow down").is_transient());
        assert!(ProviderError::from_status("openai", 500, "oops").is_transient());
        assert!(ProviderError::from_status("openai", 503, "overloaded").is_transient());
        assert!(ProviderError::from_status("openai", 408, "timeout").is_transient());
        assert!(!ProviderError::from_status("openai", 401, "bad key").is_transient());
        assert!(!ProviderError::from_status("openai", 400, "bad request").is_transient());
        assert!(!ProviderError::from_status("openai", 404, "no model").is_transient());
    }

    #[test]
    fn test_exhausted_quota_is_terminal() {
        let openai = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","param":null,"code":"insufficient_quota"}}"#;
        let err = ProviderError::from_status("openai", 429, openai);
        assert_eq!(err.kind(), ErrorKind::Terminal);
        assert_eq!(err.status(), Some(429));

        let gemini = r#"{"error":{"code":429,"message":"Quota exceeded for quota metric 'Generate Content API requests per day'","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            ProviderError::from_status("google", 429, gemini).kind(),
            ErrorKind::Terminal
        );

        let rate_limited = r#"{"error":{"message":"Rate limit reached for gpt-4o","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert!(ProviderError::from_status("openai", 429, rate_limited).is_transient());
    }

    #[test]
    fn test_status_error_message() {
        let err = ProviderError::from_status("anthropic", 529, "overloaded");
        assert_eq!(err.status(), Some(529));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("anthropic"));
        assert!(err.to_string().contains("529"));
    }

    #[test]
    fn test_exhausted_carries_last_error() {
        let err = CascadeError::Exhausted {
            strategy: "quality".to_string(),
            attempts: 4,
            last: ProviderError::terminal("model-y is down"),
        };
        assert!(err.to_string().contains("model-y is down"));
        assert_eq!(
            err.last_provider_error().map(|e| e.message()),
            Some("model-y is down")
        );
        assert!(!err.is_unconfigured());
    }

    #[test]
    fn test_deadline_exposes_last_cause() {
        use std::error::Error as _;

        let err = CascadeError::DeadlineExceeded {
            elapsed: Duration::from_secs(120),
            last: Some(ProviderError::deadline(Duration::from_secs(120))),
        };
        let source = err.source().map(|s| s.to_string());
        assert!(source.is_some_and(|s| s.contains("deadline of 120s")));

        let bare = CascadeError::DeadlineExceeded {
            elapsed: Duration::from_secs(1),
            last: None,
        };
        assert!(bare.source().is_none());
    }

    #[test]
    fn test_unconfigured_is_distinct() {
        let err = CascadeError::Unconfigured("no providers registered".to_string());
        assert!(err.is_unconfigured());
        assert!(err.last_provider_error().is_none());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Transient.to_string(), "transient");
        assert_eq!(ErrorKind::Terminal.to_string(), "terminal");
    }
}
