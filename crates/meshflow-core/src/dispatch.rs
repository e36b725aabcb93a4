//! Call dispatcher port.
//!
//! The scheduler hands every attempt to a `CallDispatcher`; the infra layer
//! supplies an HTTP implementation and tests supply scripted ones. The trait
//! returns a boxed future so it stays object-safe and can be shared as
//! `Arc<dyn CallDispatcher>` across node tasks.

use std::time::Duration;

use futures_util::future::BoxFuture;
use meshflow_types::run::{AttemptErrorKind, AttemptOutcome};
use serde_json::Value;

/// Errors a single call attempt can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    #[error("call timed out")]
    Timeout,
}

impl DispatchError {
    /// Map to the outcome recorded in the execution trace.
    pub fn to_outcome(&self) -> AttemptOutcome {
        let kind = match self {
            DispatchError::Timeout => return AttemptOutcome::Timeout,
            DispatchError::Transport(_) => AttemptErrorKind::Transport,
            DispatchError::Status { .. } => AttemptErrorKind::Status,
            DispatchError::InvalidResponse(_) => AttemptErrorKind::InvalidResponse,
        };
        AttemptOutcome::Error {
            kind,
            message: self.to_string(),
        }
    }
}

/// Performs one request/response exchange with a service endpoint.
pub trait CallDispatcher: Send + Sync {
    /// POST `payload` to `endpoint` and return the decoded response body.
    ///
    /// `timeout` is the per-attempt bound; the scheduler enforces it as well,
    /// so implementations may treat it as a transport hint.
    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        payload: &'a Value,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Value, DispatchError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "endpoint returned status 503: unavailable");
        assert_eq!(DispatchError::Timeout.to_string(), "call timed out");
    }

    #[test]
    fn test_dispatch_error_outcome_mapping() {
        assert_eq!(DispatchError::Timeout.to_outcome(), AttemptOutcome::Timeout);

        match DispatchError::Transport("refused".into()).to_outcome() {
            AttemptOutcome::Error { kind, message } => {
                assert_eq!(kind, AttemptErrorKind::Transport);
                assert!(message.contains("refused"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        match DispatchError::InvalidResponse("eof".into()).to_outcome() {
            AttemptOutcome::Error { kind, .. } => {
                assert_eq!(kind, AttemptErrorKind::InvalidResponse)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
