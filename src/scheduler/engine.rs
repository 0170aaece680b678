//! Request execution loop.
//!
//! Partitions a request, dispatches every ready batch as its own tokio task
//! and drains a single completion channel. The coordinating task is the only
//! writer of results, timings and batch states; worker tasks report back
//! exclusively through the channel, so the merge needs no lock.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::batch::{partition, Batch, BatchState};
use super::graph::{check_acyclic, DependencyTracker};
use super::response::ResponseAssembler;
use crate::error::{Result, TsdbError};
use crate::executor::{
    ExecutorError, ExecutorRegistry, QueryContext, QueryExecutor, DEFAULT_MAX_DATA_POINTS,
};
use crate::models::{BatchResult, BatchTiming, Query, QueryResult, Request, Response, TimeRange};
use crate::telemetry::{self, BatchSpan, RequestSpan, SpanExt};

/// Configuration for request execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Abandon the request after this long. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Used when the request carries no `max_data_points`.
    pub default_max_data_points: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            default_max_data_points: DEFAULT_MAX_DATA_POINTS,
        }
    }
}

/// Entry point: answers requests using executors from a shared registry.
pub struct RequestHandler {
    registry: Arc<ExecutorRegistry>,
    config: SchedulerConfig,
}

impl RequestHandler {
    pub fn new(registry: Arc<ExecutorRegistry>, config: SchedulerConfig) -> Self {
        Self { registry, config }
    }

    /// Execute a request to completion.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        self.handle_with_cancel(request, CancellationToken::new()).await
    }

    /// Execute a request, giving up when `cancel` fires.
    ///
    /// Cancellation stops further dispatch and returns immediately. Batches
    /// already running are not interrupted; they observe the cancellation
    /// through [`QueryContext::cancellation`] and their late results are
    /// dropped.
    pub async fn handle_with_cancel(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response> {
        let request_id = Uuid::new_v4();
        let span = RequestSpan::new(&request_id.to_string(), request.queries.len());
        let start = Instant::now();

        let result = self
            .execute(request_id, request, cancel)
            .instrument(span.clone())
            .await;

        let latency = start.elapsed();
        span.record_result(&result);
        span.record("latency_ms", latency.as_millis() as u64);
        let status = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_validation() => "rejected",
            Err(_) => "error",
        };
        telemetry::record_request(status, latency);
        result
    }

    async fn execute(
        &self,
        request_id: Uuid,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response> {
        let batches = partition(&request.queries)?;
        check_acyclic(&batches)?;
        let executors = self.resolve_executors(&batches)?;
        tracing::Span::current().record("batches", batches.len());
        tracing::debug!(batches = batches.len(), "request partitioned");

        let deadline = self.config.request_timeout.map(|t| tokio::time::Instant::now() + t);
        let max_data_points = request
            .max_data_points
            .unwrap_or(self.config.default_max_data_points);

        let execution = Execution::new(request_id, request, batches, executors, max_data_points, &cancel);
        execution.run(&cancel, deadline, self.config.request_timeout).await
    }

    /// Look up every batch's executor up front so a missing type fails the
    /// request before anything is dispatched.
    fn resolve_executors(&self, batches: &[Batch]) -> Result<Vec<Arc<dyn QueryExecutor>>> {
        batches
            .iter()
            .map(|batch| {
                self.registry
                    .get(batch.ds_type())
                    .ok_or_else(|| TsdbError::ExecutorNotFound(batch.ds_type().to_string()))
            })
            .collect()
    }
}

type Results = HashMap<String, Arc<QueryResult>>;

enum Event {
    Completed(Option<BatchResult>),
    Cancelled,
    TimedOut,
}

/// Per-request state, owned by the coordinating task for one request.
struct Execution {
    request_id: Uuid,
    time_range: TimeRange,
    max_data_points: u32,
    queries: Arc<[Query]>,
    batches: Vec<Arc<Batch>>,
    executors: Vec<Arc<dyn QueryExecutor>>,
    states: Vec<BatchState>,
    tracker: DependencyTracker,
    results: Results,
    /// Cached executor view of `results`; reset on every merge.
    snapshot: Option<Arc<Results>>,
    assembler: ResponseAssembler,
    in_flight: usize,
    tx: mpsc::UnboundedSender<BatchResult>,
    rx: mpsc::UnboundedReceiver<BatchResult>,
    /// Handed to executors. Cancelled when the request ends, however it ends.
    cancellation: CancellationToken,
}

impl Execution {
    fn new(
        request_id: Uuid,
        request: Request,
        batches: Vec<Batch>,
        executors: Vec<Arc<dyn QueryExecutor>>,
        max_data_points: u32,
        cancel: &CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = DependencyTracker::new(&batches);
        Self {
            request_id,
            time_range: request.time_range,
            max_data_points,
            queries: request.queries.into(),
            states: vec![BatchState::Pending; batches.len()],
            batches: batches.into_iter().map(Arc::new).collect(),
            executors,
            tracker,
            results: HashMap::new(),
            snapshot: None,
            assembler: ResponseAssembler::new(),
            in_flight: 0,
            tx,
            rx,
            cancellation: cancel.child_token(),
        }
    }

    async fn run(
        mut self,
        cancel: &CancellationToken,
        deadline: Option<tokio::time::Instant>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let _stop_executors = self.cancellation.clone().drop_guard();

        for index in self.tracker.initially_ready() {
            self.dispatch(index);
        }

        while self.in_flight > 0 {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => Event::Cancelled,
                () = expire(deadline) => Event::TimedOut,
                received = self.rx.recv() => Event::Completed(received),
            };

            match event {
                Event::Completed(Some(result)) => self.complete(result)?,
                Event::Completed(None) => {
                    return Err(TsdbError::CompletionChannelClosed { in_flight: self.in_flight });
                }
                Event::Cancelled => {
                    tracing::warn!(in_flight = self.in_flight, "request cancelled");
                    return Err(TsdbError::Cancelled {
                        pending: self.count(BatchState::Pending),
                        in_flight: self.in_flight,
                    });
                }
                Event::TimedOut => {
                    let timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
                    tracing::warn!(in_flight = self.in_flight, timeout_ms, "request timed out");
                    return Err(TsdbError::Timeout { timeout_ms });
                }
            }
        }

        let stranded: Vec<String> = self
            .batches
            .iter()
            .filter(|b| self.states[b.index] == BatchState::Pending)
            .flat_map(|b| b.ref_ids().map(str::to_string))
            .collect();
        if !stranded.is_empty() {
            return Err(TsdbError::Unschedulable { ref_ids: stranded });
        }

        tracing::debug!(results = self.results.len(), "request complete");
        Ok(self.assembler.finish(self.results))
    }

    fn count(&self, state: BatchState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    fn context(&mut self) -> QueryContext {
        let results = Arc::clone(
            self.snapshot
                .get_or_insert_with(|| Arc::new(self.results.clone())),
        );
        QueryContext::new(
            self.request_id,
            self.time_range.clone(),
            self.max_data_points,
            Arc::clone(&self.queries),
            results,
            self.cancellation.clone(),
        )
    }

    fn dispatch(&mut self, index: usize) {
        debug_assert_eq!(self.states[index], BatchState::Pending);
        self.states[index] = BatchState::Running;
        self.in_flight += 1;

        let batch = Arc::clone(&self.batches[index]);
        let executor = Arc::clone(&self.executors[index]);
        let context = self.context();
        let tx = self.tx.clone();
        let span = BatchSpan::new(&batch);

        tracing::debug!(batch = index, ds_type = %batch.ds_type(), "dispatching batch");
        tokio::spawn(
            async move {
                let result = run_batch(executor.as_ref(), &batch, &context).await;
                // Receiver is gone once the request was abandoned.
                let _ = tx.send(result);
            }
            .instrument(span),
        );
    }

    fn complete(&mut self, result: BatchResult) -> Result<()> {
        let index = result.batch_index;
        self.in_flight -= 1;
        self.states[index] = BatchState::Done;
        self.assembler.record_timing(result.timing);
        if let Some(error) = &result.error {
            tracing::warn!(batch = index, error = %error, "batch failed");
        }

        let mut ready = BTreeSet::new();
        for (ref_id, query_result) in result.query_results {
            if self.results.contains_key(&ref_id) {
                return Err(TsdbError::DuplicateResult(ref_id));
            }
            ready.extend(self.tracker.resolve(&ref_id));
            self.results.insert(ref_id, Arc::new(query_result));
        }
        self.snapshot = None;

        for index in ready {
            if self.states[index] == BatchState::Pending {
                self.dispatch(index);
            }
        }
        Ok(())
    }
}

async fn expire(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run one batch and shape whatever happens into exactly one [`BatchResult`].
async fn run_batch(executor: &dyn QueryExecutor, batch: &Batch, context: &QueryContext) -> BatchResult {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(executor.execute(batch, context))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ExecutorError::Panicked(panic_message(panic.as_ref()))));
    let elapsed = start.elapsed();

    let error = outcome.as_ref().err().map(ToString::to_string);
    let query_results = collect_results(batch, outcome);
    let failed = query_results.values().filter(|r| r.is_error()).count();
    telemetry::record_batch(batch.ds_type(), elapsed, failed);
    tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, failed, "batch finished");

    BatchResult {
        batch_index: batch.index,
        timing: BatchTiming::new(batch.data_source.id, batch.len(), elapsed),
        query_results,
        error,
    }
}

/// One result per member query, no more, no less.
fn collect_results(
    batch: &Batch,
    outcome: std::result::Result<Vec<QueryResult>, ExecutorError>,
) -> HashMap<String, QueryResult> {
    let mut collected = HashMap::with_capacity(batch.len());
    match outcome {
        Err(e) => {
            for ref_id in batch.ref_ids() {
                collected.insert(ref_id.to_string(), QueryResult::failed(ref_id, &e));
            }
        }
        Ok(results) => {
            for result in results {
                if !batch.produces(&result.ref_id) {
                    tracing::warn!(ref_id = %result.ref_id, "discarding result for query outside the batch");
                    continue;
                }
                if collected.contains_key(&result.ref_id) {
                    tracing::warn!(ref_id = %result.ref_id, "discarding repeated result");
                    continue;
                }
                collected.insert(result.ref_id.clone(), result);
            }
            for ref_id in batch.ref_ids() {
                collected.entry(ref_id.to_string()).or_insert_with(|| {
                    QueryResult::failed(ref_id, ExecutorError::NoResult(ref_id.to_string()))
                });
            }
        }
    }
    collected
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
