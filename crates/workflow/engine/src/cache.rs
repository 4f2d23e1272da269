//! Explicit read cache for workflow instances.
//!
//! Replaces ambient module-level caching with a component that owns its
//! lifecycle: bounded capacity, TTL expiry, and invalidation on every
//! committed write. Injected into the engine, used only on read paths —
//! `execute_action` always reads the store directly.

use moka::future::Cache;
use order_workflow_types::{WorkflowInstance, WorkflowInstanceId};
use std::time::Duration;

#[derive(Clone)]
pub struct InstanceCache {
    inner: Cache<WorkflowInstanceId, WorkflowInstance>,
}

impl InstanceCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: &WorkflowInstanceId) -> Option<WorkflowInstance> {
        self.inner.get(id).await
    }

    pub async fn insert(&self, instance: WorkflowInstance) {
        self.inner.insert(instance.id.clone(), instance).await;
    }

    pub async fn invalidate(&self, id: &WorkflowInstanceId) {
        self.inner.invalidate(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_workflow_types::{OrderId, TransitionTable};

    fn make_instance() -> WorkflowInstance {
        WorkflowInstance::new(OrderId::new("order-1"), &TransitionTable::commerce())
    }

    #[tokio::test]
    async fn insert_get_invalidate() {
        let cache = InstanceCache::new(8, Duration::from_secs(60));
        let instance = make_instance();
        let id = instance.id.clone();

        assert!(cache.get(&id).await.is_none());
        cache.insert(instance).await;
        assert!(cache.get(&id).await.is_some());

        cache.invalidate(&id).await;
        assert!(cache.get(&id).await.is_none());
    }
}
