//! In-memory reference implementation of the workflow store.
//!
//! Deterministic and test-friendly. Production deployments should use a
//! transactional backend (the `postgres` feature) for source-of-truth data.

use crate::traits::WorkflowStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_workflow_types::{
    OrderId, WorkflowError, WorkflowInstance, WorkflowInstanceId, WorkflowResult,
    WorkflowTransition,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    by_order: HashMap<OrderId, WorkflowInstanceId>,
    // Append order is commit order; history reads preserve it as the
    // tiebreaker for equal timestamps.
    history: Vec<WorkflowTransition>,
}

/// In-memory workflow store.
///
/// A single lock over all collections keeps the instance mutation and the
/// history append of `commit_transition` atomic.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    inner: RwLock<Inner>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> WorkflowError {
    WorkflowError::StoreUnavailable("workflow store lock poisoned".to_string())
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()> {
        let mut guard = self.inner.write().map_err(|_| lock_poisoned())?;

        if guard.by_order.contains_key(&instance.order_id) {
            return Err(WorkflowError::Conflict(format!(
                "order {} already has a workflow",
                instance.order_id
            )));
        }
        if guard.instances.contains_key(&instance.id) {
            return Err(WorkflowError::Conflict(format!(
                "workflow {} already exists",
                instance.id
            )));
        }

        guard
            .by_order
            .insert(instance.order_id.clone(), instance.id.clone());
        guard.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn get_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> WorkflowResult<Option<WorkflowInstance>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(guard.instances.get(id).cloned())
    }

    async fn get_by_order(&self, order_id: &OrderId) -> WorkflowResult<Option<WorkflowInstance>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(guard
            .by_order
            .get(order_id)
            .and_then(|id| guard.instances.get(id))
            .cloned())
    }

    async fn commit_transition(
        &self,
        instance: WorkflowInstance,
        transition: WorkflowTransition,
        expected_version: u64,
    ) -> WorkflowResult<()> {
        let mut guard = self.inner.write().map_err(|_| lock_poisoned())?;

        let stored = guard
            .instances
            .get(&instance.id)
            .ok_or_else(|| WorkflowError::NotFound(instance.id.to_string()))?;
        if stored.version != expected_version {
            return Err(WorkflowError::Conflict(format!(
                "workflow {} was modified concurrently (expected version {}, found {})",
                instance.id, expected_version, stored.version
            )));
        }

        guard.instances.insert(instance.id.clone(), instance);
        guard.history.push(transition);
        Ok(())
    }

    async fn append_transition(&self, transition: WorkflowTransition) -> WorkflowResult<()> {
        let mut guard = self.inner.write().map_err(|_| lock_poisoned())?;
        guard.history.push(transition);
        Ok(())
    }

    async fn history(&self, id: &WorkflowInstanceId) -> WorkflowResult<Vec<WorkflowTransition>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        if !guard.instances.contains_key(id) {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(guard
            .history
            .iter()
            .filter(|t| &t.workflow_id == id)
            .cloned()
            .collect())
    }

    async fn transitions_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkflowResult<Vec<WorkflowTransition>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        let mut records = guard
            .history
            .iter()
            .filter(|t| t.transitioned_at >= start && t.transitioned_at < end)
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by_key(|t| t.transitioned_at);
        Ok(records)
    }

    async fn snapshot_instances(&self) -> WorkflowResult<Vec<WorkflowInstance>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(guard.instances.values().cloned().collect())
    }

    async fn overdue_instances(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowInstance>> {
        let guard = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(guard
            .instances
            .values()
            .filter(|i| i.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn update_priority(&self, id: &WorkflowInstanceId, priority: u8) -> WorkflowResult<()> {
        let mut guard = self.inner.write().map_err(|_| lock_poisoned())?;
        let instance = guard
            .instances
            .get_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        instance.priority = priority;
        instance.version += 1;
        instance.updated_at = Utc::now();
        Ok(())
    }
}
