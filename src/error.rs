//! Request-level error types.
//!
//! Only failures that abort the whole request live here. Executor failures
//! are carried per query as data (see [`crate::executor::ExecutorError`]).

use thiserror::Error;

/// Request rejected during partitioning, before anything was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query {ref_id} depends on unknown query {missing}")]
    UnknownDependency { ref_id: String, missing: String },

    #[error("duplicate refId: {0}")]
    DuplicateRefId(String),

    #[error("query at position {0} has an empty refId")]
    EmptyRefId(usize),
}

/// Errors that fail a request as a whole.
#[derive(Debug, Error)]
pub enum TsdbError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Dependency cycle between queries: {}", ref_ids.join(", "))]
    Cycle { ref_ids: Vec<String> },

    #[error("No executor registered for data source type: {0}")]
    ExecutorNotFound(String),

    #[error("Result for {0} was produced twice")]
    DuplicateResult(String),

    #[error("Queries could not be scheduled: {}", ref_ids.join(", "))]
    Unschedulable { ref_ids: Vec<String> },

    #[error("Request cancelled with {pending} pending and {in_flight} running batches")]
    Cancelled { pending: usize, in_flight: usize },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Completion channel closed with {in_flight} batches outstanding")]
    CompletionChannelClosed { in_flight: usize },
}

impl TsdbError {
    /// True if the request was rejected before any batch ran.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Cycle { .. } | Self::ExecutorNotFound(_)
        )
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Timeout { .. })
    }
}

pub type Result<T, E = TsdbError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_ref_ids() {
        let err = TsdbError::Cycle {
            ref_ids: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle between queries: A, B");
        assert!(err.is_validation());
    }

    #[test]
    fn validation_converts_into_request_error() {
        let err: TsdbError = ValidationError::DuplicateRefId("A".into()).into();
        assert!(err.is_validation());
        assert!(!err.is_warning());
        assert_eq!(err.to_string(), "Invalid request: duplicate refId: A");
    }

    #[test]
    fn timeouts_are_warnings() {
        assert!(TsdbError::Timeout { timeout_ms: 10 }.is_warning());
        assert!(!TsdbError::DuplicateResult("A".into()).is_warning());
    }
}
