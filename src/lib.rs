//! TSDB CORE
//!
//! Batched, dependency-aware fan-out of time-series queries across data
//! sources.
//!
//! A [`Request`] carries queries identified by RefId, each bound to a data
//! source and optionally depending on other queries' results. The
//! [`RequestHandler`] groups queries by data source into batches, executes
//! independent batches concurrently, and dispatches a dependent batch only
//! once every result it depends on has been merged.
//!
//! # Flow
//!
//! - Partition: one batch per data source id, in first-appearance order
//! - Validate: unknown dependencies, duplicate RefIds and cycles fail before
//!   anything runs
//! - Execute: one tokio task per ready batch, results fanned in over a single
//!   channel
//! - Assemble: per-batch timings plus one result per RefId

pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;

pub use error::{Result, TsdbError, ValidationError};
pub use executor::{ExecutorError, ExecutorRegistry, QueryContext, QueryExecutor};
pub use models::{
    BatchResult, BatchTiming, DataPoint, DataSourceInfo, Query, QueryResult, Request, Response,
    TimeRange, TimeSeries,
};
pub use scheduler::{Batch, RequestHandler, SchedulerConfig};

/// Handler over the built-in executors with the given configuration.
pub fn builtin_handler(config: SchedulerConfig) -> RequestHandler {
    RequestHandler::new(Arc::new(ExecutorRegistry::with_builtin()), config)
}
