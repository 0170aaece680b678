//! Dependency graph between batches.
//!
//! Edges are implicit: batch `B` depends on batch `P` when `P` produces a
//! RefId listed in `B.depends`. Two views are derived from that:
//! a pre-dispatch cycle check and a readiness tracker that counts each
//! batch's outstanding RefIds.

use std::collections::{BTreeSet, HashMap, VecDeque};

use super::batch::Batch;
use crate::error::TsdbError;

/// Producer index: RefId → index of the batch that produces it.
fn producers(batches: &[Batch]) -> HashMap<&str, usize> {
    batches
        .iter()
        .flat_map(|b| b.ref_ids().map(move |r| (r, b.index)))
        .collect()
}

/// Fail with [`TsdbError::Cycle`] if the batch graph is not a DAG.
///
/// Kahn's algorithm over batches. Whatever cannot be sorted is then pruned of
/// batches that merely sit downstream of a cycle, so the error names only the
/// RefIds of batches on (or between) cycles.
pub fn check_acyclic(batches: &[Batch]) -> Result<(), TsdbError> {
    let producer = producers(batches);

    // upstream[i]: distinct batches `i` waits on; downstream is the reverse.
    let mut upstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); batches.len()];
    let mut downstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); batches.len()];
    for batch in batches {
        for dep in &batch.depends {
            if let Some(&p) = producer.get(dep.as_str()) {
                upstream[batch.index].insert(p);
                downstream[p].insert(batch.index);
            }
        }
    }

    let mut in_degree: Vec<usize> = upstream.iter().map(BTreeSet::len).collect();
    let mut queue: VecDeque<usize> = (0..batches.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = vec![false; batches.len()];

    while let Some(i) = queue.pop_front() {
        sorted[i] = true;
        for &child in &downstream[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if sorted.iter().all(|&s| s) {
        return Ok(());
    }

    // Peel off unsorted batches that nothing unsorted depends on.
    let mut remaining: BTreeSet<usize> = (0..batches.len()).filter(|&i| !sorted[i]).collect();
    loop {
        let leaves: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| downstream[i].iter().all(|c| !remaining.contains(c)))
            .collect();
        if leaves.is_empty() {
            break;
        }
        for leaf in leaves {
            remaining.remove(&leaf);
        }
    }

    let mut ref_ids: Vec<String> = remaining
        .iter()
        .flat_map(|&i| batches[i].ref_ids().map(str::to_string))
        .collect();
    ref_ids.sort();
    Err(TsdbError::Cycle { ref_ids })
}

/// Tracks, per batch, how many of its dependency RefIds are still missing.
///
/// Resolving a RefId touches only the batches waiting on it. A batch becomes
/// ready the moment its last outstanding RefId is resolved.
#[derive(Debug)]
pub struct DependencyTracker {
    waiting: HashMap<String, Vec<usize>>,
    outstanding: Vec<usize>,
}

impl DependencyTracker {
    pub fn new(batches: &[Batch]) -> Self {
        let mut waiting: HashMap<String, Vec<usize>> = HashMap::new();
        let mut outstanding = Vec::with_capacity(batches.len());
        for batch in batches {
            for dep in &batch.depends {
                waiting.entry(dep.clone()).or_default().push(batch.index);
            }
            outstanding.push(batch.depends.len());
        }
        Self { waiting, outstanding }
    }

    /// Batches with nothing to wait for, in partition order.
    pub fn initially_ready(&self) -> Vec<usize> {
        (0..self.outstanding.len())
            .filter(|&i| self.outstanding[i] == 0)
            .collect()
    }

    /// Mark a RefId as merged. Returns the batches it made ready.
    ///
    /// Resolving the same RefId twice is a no-op the second time.
    pub fn resolve(&mut self, ref_id: &str) -> Vec<usize> {
        let Some(waiters) = self.waiting.remove(ref_id) else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        for index in waiters {
            self.outstanding[index] -= 1;
            if self.outstanding[index] == 0 {
                ready.push(index);
            }
        }
        ready
    }

    /// Number of RefIds batch `index` is still waiting on.
    pub fn outstanding(&self, index: usize) -> usize {
        self.outstanding[index]
    }
}
