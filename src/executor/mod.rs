//! Query executors: the per-data-source-type capability the scheduler calls.
//!
//! An executor receives one batch (all queries for one data source) and a
//! read-only [`QueryContext`], and answers with one [`QueryResult`] per member
//! query. Executors are resolved by data-source type tag through the
//! [`ExecutorRegistry`].

pub mod math;
mod registry;
pub mod testdata;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{Query, QueryResult, TimeRange};
use crate::scheduler::Batch;

pub use math::MathExecutor;
pub use registry::ExecutorRegistry;
pub use testdata::TestDataExecutor;

/// Fallback when neither the request nor the configuration sets a limit.
pub const DEFAULT_MAX_DATA_POINTS: u32 = 100;

/// Upper bound on points per series, whatever the request asks for.
pub const MAX_DATA_POINTS_CEILING: u32 = 100_000;

/// Executor-side failures. Never abort a request; they end up in
/// [`QueryResult::error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("result for {0} is not available")]
    MissingDependency(String),

    #[error("dependency {ref_id} failed: {reason}")]
    DependencyFailed { ref_id: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("executor cancelled")]
    Cancelled,

    #[error("executor panicked: {0}")]
    Panicked(String),

    #[error("executor returned no result for {0}")]
    NoResult(String),
}

/// Executes all queries of one batch against one data source.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run the batch. Returning `Err` fails every query of the batch; use
    /// per-query [`QueryResult::failed`] entries for partial failure.
    ///
    /// May be called concurrently for different batches. Results of the
    /// batch's dependencies are present in `context`.
    async fn execute(
        &self,
        batch: &Batch,
        context: &QueryContext,
    ) -> Result<Vec<QueryResult>, ExecutorError>;
}

/// Read-only view of a request handed to executors.
///
/// `results` is a snapshot taken when the batch was dispatched: it holds every
/// result merged so far, which includes all of the batch's dependencies.
#[derive(Debug, Clone)]
pub struct QueryContext {
    request_id: Uuid,
    time_range: TimeRange,
    max_data_points: u32,
    queries: Arc<[Query]>,
    results: Arc<HashMap<String, Arc<QueryResult>>>,
    cancellation: CancellationToken,
}

impl QueryContext {
    pub fn new(
        request_id: Uuid,
        time_range: TimeRange,
        max_data_points: u32,
        queries: Arc<[Query]>,
        results: Arc<HashMap<String, Arc<QueryResult>>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request_id,
            time_range,
            max_data_points: max_data_points.clamp(1, MAX_DATA_POINTS_CEILING),
            queries,
            results,
            cancellation,
        }
    }

    /// Context over plain results, for driving an executor directly.
    pub fn with_results(queries: Vec<Query>, results: Vec<QueryResult>) -> Self {
        let results = results
            .into_iter()
            .map(|r| (r.ref_id.clone(), Arc::new(r)))
            .collect();
        Self::new(
            Uuid::new_v4(),
            TimeRange::default(),
            DEFAULT_MAX_DATA_POINTS,
            queries.into(),
            Arc::new(results),
            CancellationToken::new(),
        )
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn time_range(&self) -> &TimeRange {
        &self.time_range
    }

    pub fn max_data_points(&self) -> u32 {
        self.max_data_points
    }

    /// Every query of the request, not just this batch's.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Completed result for `ref_id`, if merged before dispatch.
    pub fn result(&self, ref_id: &str) -> Option<&QueryResult> {
        self.results.get(ref_id).map(Arc::as_ref)
    }

    /// Like [`Self::result`], but a missing or failed result is an error.
    pub fn dependency(&self, ref_id: &str) -> Result<&QueryResult, ExecutorError> {
        let result = self
            .result(ref_id)
            .ok_or_else(|| ExecutorError::MissingDependency(ref_id.to_string()))?;
        match &result.error {
            Some(reason) => Err(ExecutorError::DependencyFailed {
                ref_id: ref_id.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(result),
        }
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSeries;

    #[test]
    fn dependency_distinguishes_missing_and_failed() {
        let ctx = QueryContext::with_results(
            Vec::new(),
            vec![
                QueryResult::ok("A", vec![TimeSeries::new("a")]),
                QueryResult::failed("B", "timeout"),
            ],
        );
        assert_eq!(ctx.dependency("A").unwrap().series[0].name, "a");
        assert_eq!(
            ctx.dependency("B").unwrap_err(),
            ExecutorError::DependencyFailed {
                ref_id: "B".into(),
                reason: "timeout".into()
            }
        );
        assert_eq!(
            ctx.dependency("C").unwrap_err(),
            ExecutorError::MissingDependency("C".into())
        );
        assert_eq!(ctx.result_count(), 2);
    }

    #[test]
    fn max_data_points_is_clamped() {
        let ctx = QueryContext::new(
            Uuid::new_v4(),
            TimeRange::default(),
            0,
            Vec::new().into(),
            Arc::default(),
            CancellationToken::new(),
        );
        assert_eq!(ctx.max_data_points(), 1);
        assert!(!ctx.is_cancelled());

        let ctx = QueryContext::new(
            Uuid::new_v4(),
            TimeRange::default(),
            u32::MAX,
            Vec::new().into(),
            Arc::default(),
            CancellationToken::new(),
        );
        assert_eq!(ctx.max_data_points(), MAX_DATA_POINTS_CEILING);
    }
}
