//! Synthetic data source for demos and tests.
//!
//! The query text selects a scenario:
//!
//! | Query | Result |
//! |---|---|
//! | `random_walk` (or empty) | deterministic random walk seeded by the RefId |
//! | `constant <v>` | every point equals `v` |
//! | `sleep <ms>` | waits `ms` milliseconds, then a random walk |
//! | `error <message>` | the query fails with `message` |
//!
//! Points are one second apart and end at the current time.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ExecutorError, QueryContext, QueryExecutor};
use crate::models::{DataPoint, Query, QueryResult, TimeSeries};
use crate::scheduler::Batch;

const STEP_MS: i64 = 1000;

#[derive(Debug, Clone, PartialEq)]
enum Scenario {
    RandomWalk,
    Constant(f64),
    Sleep(u64),
    Error(String),
}

impl Scenario {
    fn parse(text: &str) -> Result<Self, ExecutorError> {
        let text = text.trim();
        let (name, arg) = match text.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (text, ""),
        };
        match name {
            "" | "random_walk" => Ok(Self::RandomWalk),
            "constant" => arg
                .parse::<f64>()
                .map(Self::Constant)
                .map_err(|_| ExecutorError::InvalidQuery(format!("constant needs a number, got '{arg}'"))),
            "sleep" => arg
                .parse::<u64>()
                .map(Self::Sleep)
                .map_err(|_| ExecutorError::InvalidQuery(format!("sleep needs milliseconds, got '{arg}'"))),
            "error" => Ok(Self::Error(if arg.is_empty() { "scenario error".to_string() } else { arg.to_string() })),
            other => Err(ExecutorError::InvalidQuery(format!("unknown scenario '{other}'"))),
        }
    }
}

/// Executor for the `testdata` data-source type.
#[derive(Debug, Default)]
pub struct TestDataExecutor;

impl TestDataExecutor {
    pub const DS_TYPE: &'static str = "testdata";

    pub fn new() -> Self {
        Self
    }

    async fn run_query(&self, query: &Query, context: &QueryContext) -> Result<QueryResult, ExecutorError> {
        let scenario = Scenario::parse(&query.query)?;
        let timestamps = timestamps(context.max_data_points());
        let name = format!("{}-series", query.ref_id);

        let values: Vec<f64> = match scenario {
            Scenario::RandomWalk => random_walk(&query.ref_id, timestamps.len()),
            Scenario::Constant(v) => vec![v; timestamps.len()],
            Scenario::Sleep(ms) => {
                tokio::select! {
                    () = context.cancellation().cancelled() => return Err(ExecutorError::Cancelled),
                    () = tokio::time::sleep(Duration::from_millis(ms)) => {}
                }
                random_walk(&query.ref_id, timestamps.len())
            }
            Scenario::Error(message) => return Err(ExecutorError::Backend(message)),
        };

        let points = timestamps
            .into_iter()
            .zip(values)
            .map(|(ts, v)| DataPoint::new(ts, Some(v)))
            .collect();
        Ok(QueryResult::ok(&query.ref_id, vec![TimeSeries::with_points(name, points)]))
    }
}

#[async_trait::async_trait]
impl QueryExecutor for TestDataExecutor {
    async fn execute(&self, batch: &Batch, context: &QueryContext) -> Result<Vec<QueryResult>, ExecutorError> {
        if context.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        tracing::debug!(
            request_id = %context.request_id(),
            from = %context.time_range().from,
            to = %context.time_range().to,
            queries = batch.len(),
            "generating test data"
        );

        let mut results = Vec::with_capacity(batch.len());
        for query in &batch.queries {
            let result = match self.run_query(query, context).await {
                Ok(result) => result,
                Err(ExecutorError::Cancelled) => return Err(ExecutorError::Cancelled),
                Err(e) => QueryResult::failed(&query.ref_id, e),
            };
            results.push(result);
        }
        Ok(results)
    }
}

fn timestamps(count: u32) -> Vec<i64> {
    let end = chrono::Utc::now().timestamp_millis();
    let count = i64::from(count);
    (0..count).map(|i| end - (count - 1 - i) * STEP_MS).collect()
}

fn random_walk(ref_id: &str, len: usize) -> Vec<f64> {
    // FNV-1a, stable across runs.
    let seed = ref_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut value = rng.gen_range(0.0..100.0);
    (0..len)
        .map(|_| {
            value += rng.gen_range(-1.0..1.0);
            value
        })
        .collect()
}
