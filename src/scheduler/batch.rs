//! Batch partitioning: one batch per distinct data source.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::ValidationError;
use crate::models::{DataSourceInfo, Query};

/// Lifecycle of a batch within one request. Transitions only forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Done,
}

/// Queries sharing a data source, executed together as one unit.
///
/// Membership is fixed at partition time. Scheduling state is tracked by the
/// scheduler next to the batch, never inside it, so executors can hold a
/// shared reference while the scheduler moves it through [`BatchState`].
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position in partition order.
    pub index: usize,
    pub data_source: DataSourceInfo,
    /// Member queries in first-seen order.
    pub queries: Vec<Query>,
    /// RefIds produced by other batches that must be merged before dispatch.
    pub depends: BTreeSet<String>,
}

impl Batch {
    fn new(index: usize, data_source: DataSourceInfo) -> Self {
        Self {
            index,
            data_source,
            queries: Vec::new(),
            depends: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Type tag of the data source, used for executor lookup.
    pub fn ds_type(&self) -> &str {
        &self.data_source.ds_type
    }

    /// RefIds produced by this batch.
    pub fn ref_ids(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(|q| q.ref_id.as_str())
    }

    /// Whether a query with this RefId is a member.
    pub fn produces(&self, ref_id: &str) -> bool {
        self.queries.iter().any(|q| q.ref_id == ref_id)
    }

    pub fn is_ready(&self) -> bool {
        self.depends.is_empty()
    }
}

/// Group queries into batches keyed by data source id.
///
/// Batches come out in the order their data source was first seen. Fails if a
/// RefId is empty or repeated, or if a query depends on a RefId that no query
/// in the request produces.
pub fn partition(queries: &[Query]) -> Result<Vec<Batch>, ValidationError> {
    validate(queries)?;

    let mut batches: Vec<Batch> = Vec::new();
    let mut by_source: HashMap<i64, usize> = HashMap::new();

    for query in queries {
        let index = *by_source.entry(query.data_source.id).or_insert_with(|| {
            batches.push(Batch::new(batches.len(), query.data_source.clone()));
            batches.len() - 1
        });
        batches[index].queries.push(query.clone());
    }

    for batch in &mut batches {
        batch.depends = external_depends(batch);
    }

    Ok(batches)
}

fn validate(queries: &[Query]) -> Result<(), ValidationError> {
    let mut known: HashSet<&str> = HashSet::with_capacity(queries.len());
    for (position, query) in queries.iter().enumerate() {
        if query.ref_id.is_empty() {
            return Err(ValidationError::EmptyRefId(position));
        }
        if !known.insert(query.ref_id.as_str()) {
            return Err(ValidationError::DuplicateRefId(query.ref_id.clone()));
        }
    }

    for query in queries {
        if let Some(missing) = query.depends.iter().find(|d| !known.contains(d.as_str())) {
            return Err(ValidationError::UnknownDependency {
                ref_id: query.ref_id.clone(),
                missing: missing.clone(),
            });
        }
    }
    Ok(())
}

/// Union of member depends, minus RefIds the batch produces itself.
fn external_depends(batch: &Batch) -> BTreeSet<String> {
    let mut depends = BTreeSet::new();
    for query in &batch.queries {
        for dep in &query.depends {
            if batch.produces(dep) {
                // Same data source: executed in the same call, no ordering enforced.
                tracing::debug!(
                    ref_id = %query.ref_id,
                    depends_on = %dep,
                    data_source_id = batch.data_source.id,
                    "ignoring dependency inside one batch"
                );
                continue;
            }
            depends.insert(dep.clone());
        }
    }
    depends
}
