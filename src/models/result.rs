//! Outbound result types.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single sample. `None` marks a gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub value: Option<f64>,
}

impl DataPoint {
    pub fn new(timestamp_ms: i64, value: Option<f64>) -> Self {
        Self { timestamp_ms, value }
    }
}

/// A named, time-ordered sequence of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    #[serde(default)]
    pub points: Vec<DataPoint>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    pub fn with_points(name: impl Into<String>, points: Vec<DataPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Outcome of one query. Produced exactly once, by exactly one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ref_id: String,
    #[serde(default)]
    pub series: Vec<TimeSeries>,
    /// Executor failure for this query. The request itself still succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn ok(ref_id: impl Into<String>, series: Vec<TimeSeries>) -> Self {
        Self {
            ref_id: ref_id.into(),
            series,
            error: None,
        }
    }

    pub fn failed(ref_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            ref_id: ref_id.into(),
            series: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Timing of one executed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTiming {
    pub data_source_id: i64,
    pub query_count: usize,
    pub elapsed_ms: u64,
}

impl BatchTiming {
    pub fn new(data_source_id: i64, query_count: usize, elapsed: Duration) -> Self {
        Self {
            data_source_id,
            query_count,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// One batch's outcome as delivered on the completion channel.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Position of the originating batch in partition order.
    pub batch_index: usize,
    pub timing: BatchTiming,
    pub query_results: HashMap<String, QueryResult>,
    /// Batch-level failure. Every member query carries it as well.
    pub error: Option<String>,
}

/// Merged answer to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// One entry per executed batch, in completion order.
    pub batch_timings: Vec<BatchTiming>,
    pub results: HashMap<String, QueryResult>,
}

impl Response {
    /// Results that carry an executor error.
    pub fn errors(&self) -> impl Iterator<Item = &QueryResult> {
        self.results.values().filter(|r| r.is_error())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
