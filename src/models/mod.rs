//! Request and response data model.
//!
//! Everything here is plain data: immutable once built, serializable for the
//! CLI, and free of scheduling state.

mod query;
mod result;

pub use query::{DataSourceInfo, Query, Request, TimeRange};
pub use result::{BatchResult, BatchTiming, DataPoint, QueryResult, Response, TimeSeries};
