//! Metrics recorded through the `metrics` facade.
//!
//! No exporter is installed here; the embedding application picks one.
//! Without a recorder every call is a no-op.

use std::time::Duration;

use metrics::{counter, histogram};

/// Outcome of one request: `ok`, `rejected` (failed before dispatch) or `error`.
pub fn record_request(status: &'static str, latency: Duration) {
    counter!("tsdb_requests_total", "status" => status).increment(1);
    histogram!("tsdb_request_duration_ms", "status" => status).record(latency.as_secs_f64() * 1000.0);
}

/// One executed batch and how many of its queries failed.
pub fn record_batch(ds_type: &str, elapsed: Duration, failed_queries: usize) {
    let ds_type = ds_type.to_string();
    counter!("tsdb_batches_total", "ds_type" => ds_type.clone()).increment(1);
    histogram!("tsdb_batch_duration_ms", "ds_type" => ds_type.clone())
        .record(elapsed.as_secs_f64() * 1000.0);
    if failed_queries > 0 {
        counter!("tsdb_query_errors_total", "ds_type" => ds_type).increment(failed_queries as u64);
    }
}
