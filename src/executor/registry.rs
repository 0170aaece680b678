//! Data-source type → executor lookup table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{MathExecutor, QueryExecutor, TestDataExecutor};

/// Thread-safe table of executors keyed by data-source type tag.
///
/// Shared across requests; each request resolves every type it needs once,
/// before anything is dispatched.
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn QueryExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the built-in `testdata` and `math` executors.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(TestDataExecutor::DS_TYPE, Arc::new(TestDataExecutor::new()));
        registry.register(MathExecutor::DS_TYPE, Arc::new(MathExecutor::new()));
        registry
    }

    /// Register an executor. Returns the one it replaced, if any.
    pub fn register(
        &self,
        ds_type: &str,
        executor: Arc<dyn QueryExecutor>,
    ) -> Option<Arc<dyn QueryExecutor>> {
        self.executors.write().insert(ds_type.to_string(), executor)
    }

    pub fn unregister(&self, ds_type: &str) -> Option<Arc<dyn QueryExecutor>> {
        self.executors.write().remove(ds_type)
    }

    pub fn get(&self, ds_type: &str) -> Option<Arc<dyn QueryExecutor>> {
        self.executors.read().get(ds_type).cloned()
    }

    pub fn contains(&self, ds_type: &str) -> bool {
        self.executors.read().contains_key(ds_type)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.types())
            .finish()
    }
}
