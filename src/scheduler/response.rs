//! Folds batch timings and merged results into the final response.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{BatchTiming, QueryResult, Response};

/// Accumulates timings in receipt order. Consumed once by [`Self::finish`].
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    timings: Vec<BatchTiming>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_timing(&mut self, timing: BatchTiming) {
        self.timings.push(timing);
    }

    /// Build the response. Results still shared with a lingering executor
    /// snapshot are cloned; the rest are moved out.
    pub fn finish(self, results: HashMap<String, Arc<QueryResult>>) -> Response {
        let results = results
            .into_iter()
            .map(|(ref_id, result)| {
                let result = Arc::try_unwrap(result).unwrap_or_else(|shared| (*shared).clone());
                (ref_id, result)
            })
            .collect();
        Response {
            batch_timings: self.timings,
            results,
        }
    }
}
