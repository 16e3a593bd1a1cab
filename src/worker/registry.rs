use std::collections::BTreeMap;
use std::sync::Arc;

use super::Worker;

/// Name → worker lookup table.
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own name, replacing any previous entry.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> &mut Self {
        self.workers.insert(worker.name().to_string(), worker);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvocationError;
    use crate::worker::{InvocationRequest, WorkerResult};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Worker for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _: &InvocationRequest) -> Result<WorkerResult, InvocationError> {
            Ok(WorkerResult::new(self.0, "ok"))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(Named("coder"))).register(Arc::new(Named("tester")));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("coder"));
        assert!(registry.get("ghost").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["coder", "tester"]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(Named("coder")));
        registry.register(Arc::new(Named("coder")));
        assert_eq!(registry.len(), 1);
    }
}
