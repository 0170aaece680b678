//! Span utilities and extension traits for request tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

use crate::scheduler::Batch;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the span wrapping one request.
pub struct RequestSpan;

impl RequestSpan {
    /// Fields included:
    /// - `request_id`: Unique identifier for the request
    /// - `queries`: Number of queries in the request
    /// - `batches`: Filled in after partitioning
    /// - `status` / `error.message`: Filled in by `SpanExt::record_result`
    /// - `latency_ms`: Filled in after completion
    pub fn new(request_id: &str, queries: usize) -> Span {
        info_span!(
            "tsdb_request",
            request_id = %request_id,
            queries = queries,
            batches = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

/// Factory for the span wrapping one batch execution.
pub struct BatchSpan;

impl BatchSpan {
    pub fn new(batch: &Batch) -> Span {
        info_span!(
            "tsdb_batch",
            batch = batch.index,
            data_source_id = batch.data_source.id,
            ds_type = %batch.ds_type(),
            queries = batch.len(),
        )
    }
}
