use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_workflow_types::{
    OrderId, WorkflowInstance, WorkflowInstanceId, WorkflowResult, WorkflowTransition,
};

/// Storage interface for workflow instances and their transition history.
///
/// Implementations must keep `commit_transition` atomic: the instance
/// mutation and the history append land together or not at all, and only
/// when the stored version still matches the caller's expectation.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a newly created instance.
    ///
    /// `Conflict` if the order already has a workflow or the id is taken.
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()>;

    /// Get one instance by workflow id.
    async fn get_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> WorkflowResult<Option<WorkflowInstance>>;

    /// Get the instance governing an order.
    async fn get_by_order(&self, order_id: &OrderId) -> WorkflowResult<Option<WorkflowInstance>>;

    /// Atomically persist a mutated instance together with its transition
    /// record, iff the stored version equals `expected_version`.
    ///
    /// A mismatch is a `Conflict` and writes nothing; the caller lost a
    /// concurrent-mutation race and may safely retry from a fresh read.
    async fn commit_transition(
        &self,
        instance: WorkflowInstance,
        transition: WorkflowTransition,
        expected_version: u64,
    ) -> WorkflowResult<()>;

    /// Append an audit-only record that carries no instance mutation
    /// (rejected attempts).
    async fn append_transition(&self, transition: WorkflowTransition) -> WorkflowResult<()>;

    /// Full history for one workflow, oldest first.
    ///
    /// `NotFound` for an unknown workflow id.
    async fn history(&self, id: &WorkflowInstanceId) -> WorkflowResult<Vec<WorkflowTransition>>;

    /// All transition records with `transitioned_at` in `[start, end)`,
    /// oldest first.
    async fn transitions_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkflowResult<Vec<WorkflowTransition>>;

    /// Snapshot of every instance, terminal ones included.
    async fn snapshot_instances(&self) -> WorkflowResult<Vec<WorkflowInstance>>;

    /// Non-terminal instances whose SLA deadline has passed.
    async fn overdue_instances(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowInstance>>;

    /// Persist a priority change outside the transition path.
    ///
    /// Bumps the instance version so in-flight transitions observe the
    /// change as a `Conflict` rather than silently overwriting it.
    async fn update_priority(&self, id: &WorkflowInstanceId, priority: u8) -> WorkflowResult<()>;
}
