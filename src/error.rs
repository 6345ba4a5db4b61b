//! Closed error taxonomy for the teaching loop.
//!
//! Every fatal condition carries the data that triggered it (offending URL,
//! raw response, violated boundary) so the CLI can surface it verbatim.
//! Budget exhaustion is deliberately *not* here — a run that spends its
//! attempt budget completed normally and reports
//! [`RunOutcome::Exhausted`](crate::models::RunOutcome::Exhausted).
//!
//! Propagation policy:
//! - [`Config`](HarnessError::Config), [`Protocol`](HarnessError::Protocol),
//!   and [`Security`](HarnessError::Security) terminate the run immediately.
//! - [`Discovery`](HarnessError::Discovery) is fatal during initial discovery
//!   (there is no corpus to start from).
//! - [`Fetch`](HarnessError::Fetch) is absorbed per page by the corpus store;
//!   a partial corpus is valid.
//! - [`Provider`](HarnessError::Provider) during gap resolution is absorbed
//!   once per attempt by the teacher loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Missing credentials or invalid settings. Raised before any network
    /// call, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A search/map provider failed at the transport or auth level.
    #[error("{op} provider failed: {message}")]
    Provider { op: &'static str, message: String },

    /// Initial discovery failed; carries the provider's raw error.
    #[error("source discovery failed: {message}")]
    Discovery { message: String },

    /// A single page could not be fetched. Recorded per source; does not
    /// abort corpus building.
    #[error("fetch failed for {url}: {cause}")]
    Fetch { url: String, cause: String },

    /// The agent response did not match the two-outcome grammar after the
    /// single allowed re-prompt. Carries the raw offending response.
    #[error("agent protocol violation after re-prompt; raw response:\n{raw}")]
    Protocol { raw: String },

    /// The agent or validation step attempted an operation outside its
    /// sandbox boundary. Never retried or downgraded.
    #[error("security violation: {detail}")]
    Security { detail: String },
}

impl HarnessError {
    /// Stable kind name, used in log lines and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "configuration",
            HarnessError::Provider { .. } => "provider",
            HarnessError::Discovery { .. } => "discovery",
            HarnessError::Fetch { .. } => "fetch",
            HarnessError::Protocol { .. } => "protocol-violation",
            HarnessError::Security { .. } => "security-violation",
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            HarnessError::Config("x".into()),
            HarnessError::Provider {
                op: "search",
                message: "x".into(),
            },
            HarnessError::Discovery { message: "x".into() },
            HarnessError::Fetch {
                url: "https://e.com".into(),
                cause: "x".into(),
            },
            HarnessError::Protocol { raw: "x".into() },
            HarnessError::Security { detail: "x".into() },
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_fatal_errors_carry_trigger_data() {
        let err = HarnessError::Protocol {
            raw: "I think I did it?".into(),
        };
        assert!(err.to_string().contains("I think I did it?"));

        let err = HarnessError::Fetch {
            url: "https://docs.rs/missing".into(),
            cause: "404".into(),
        };
        assert!(err.to_string().contains("https://docs.rs/missing"));
    }
}
