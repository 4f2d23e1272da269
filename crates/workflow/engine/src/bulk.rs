//! Bulk action execution with per-item isolation.
//!
//! One action applied to many instances. Oversized batches are rejected
//! before any instance is touched; once running, each item succeeds or
//! fails on its own and the batch never aborts partway.

use crate::engine::TransitionEngine;
use futures::future::join_all;
use order_workflow_types::{
    Action, ActionContext, OrderState, Trigger, WorkflowError, WorkflowInstanceId, WorkflowResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Outcome of one item in a bulk batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub workflow_id: WorkflowInstanceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<OrderState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of a bulk batch, items in request order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl TransitionEngine {
    /// Execute one action against many instances.
    ///
    /// Fan-out is bounded by [`crate::EngineConfig::bulk_fan_out`]; each
    /// item still commits through the serialized per-instance path.
    pub async fn execute_bulk(
        &self,
        ids: &[WorkflowInstanceId],
        action: Action,
        trigger: Trigger,
        actor: Option<&str>,
        ctx: ActionContext,
    ) -> WorkflowResult<BulkResult> {
        if ids.is_empty() {
            return Err(WorkflowError::InvalidRequest("empty batch".to_string()));
        }
        if ids.len() > self.config().max_bulk_size {
            return Err(WorkflowError::InvalidRequest(format!(
                "batch of {} exceeds the cap of {}",
                ids.len(),
                self.config().max_bulk_size
            )));
        }

        let semaphore = Arc::new(Semaphore::new(self.config().bulk_fan_out));
        let items = ids.iter().map(|id| {
            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            async move {
                // Semaphore is never closed, acquire cannot fail.
                let _permit = semaphore.acquire().await;
                match self.execute_action(id, action, trigger, actor, ctx).await {
                    Ok(result) => BulkItemResult {
                        workflow_id: id.clone(),
                        new_state: Some(result.new_state),
                        error: None,
                    },
                    Err(err) => {
                        tracing::warn!(
                            workflow_id = %id,
                            action = %action,
                            error = %err,
                            "bulk item failed"
                        );
                        BulkItemResult {
                            workflow_id: id.clone(),
                            new_state: None,
                            error: Some(err.to_string()),
                        }
                    }
                }
            }
        });

        let results = join_all(items).await;
        let successful = results.iter().filter(|r| r.error.is_none()).count();
        let report = BulkResult {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        };
        tracing::info!(
            action = %action,
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "bulk execution finished"
        );
        Ok(report)
    }
}
