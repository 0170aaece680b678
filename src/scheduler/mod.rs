//! Request scheduling module.
//!
//! Partitions queries into per-data-source batches, derives the dependency
//! graph between batches, and drives concurrent execution until every batch
//! has reported back.

mod batch;
mod engine;
mod graph;
mod response;

pub use batch::{partition, Batch, BatchState};
pub use engine::{RequestHandler, SchedulerConfig};
pub use graph::{check_acyclic, DependencyTracker};
pub use response::ResponseAssembler;
