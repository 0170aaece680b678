//! Telemetry for the request scheduler.
//!
//! Structured logging via `tracing`, request/batch spans, and counters and
//! histograms through the `metrics` facade.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_batch, record_request};
pub use spans::{BatchSpan, RequestSpan, SpanExt};
