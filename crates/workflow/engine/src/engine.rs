//! The transition engine: the single write path for workflow instances.
//!
//! Every mutation — API-triggered, bulk, or scheduled sweep — funnels
//! through [`TransitionEngine::execute_action`] and the store's versioned
//! commit, so mutations to one instance serialize and history never
//! diverges from current state.

use crate::cache::InstanceCache;
use crate::collaborators::{AuditSink, OrderDirectory, WorkflowEvent};
use crate::config::EngineConfig;
use chrono::Utc;
use order_workflow_store::WorkflowStore;
use order_workflow_types::{
    Action, ActionContext, OrderId, OrderState, TransitionTable, Trigger, WorkflowError,
    WorkflowInstance, WorkflowInstanceId, WorkflowResult, WorkflowTransition, MAX_PRIORITY,
    MIN_PRIORITY,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one executed action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionResult {
    pub workflow_id: WorkflowInstanceId,
    pub previous_state: OrderState,
    pub new_state: OrderState,
    pub execution_time_ms: u64,
}

/// Which kind of flagged instances to surface for operator triage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionKind {
    /// `escalation_required` is set
    Escalated,
    /// Non-terminal and past the SLA deadline
    SlaBreached,
    /// Latest history record is a rejected attempt
    Errored,
}

/// The order workflow transition engine.
pub struct TransitionEngine {
    store: Arc<dyn WorkflowStore>,
    orders: Arc<dyn OrderDirectory>,
    audit: Arc<dyn AuditSink>,
    table: TransitionTable,
    config: EngineConfig,
    cache: InstanceCache,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        orders: Arc<dyn OrderDirectory>,
        audit: Arc<dyn AuditSink>,
        table: TransitionTable,
        config: EngineConfig,
    ) -> Self {
        let cache = InstanceCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            store,
            orders,
            audit,
            table,
            config,
            cache,
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub(crate) fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    /// Bound an external call; an elapsed timeout is a failed attempt,
    /// never assumed successful.
    pub(crate) async fn bounded<T>(
        &self,
        fut: impl Future<Output = WorkflowResult<T>>,
    ) -> WorkflowResult<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::StoreUnavailable(format!(
                "operation exceeded {:?}",
                self.config.store_timeout
            ))),
        }
    }

    // ── Instance Lifecycle ───────────────────────────────────────────

    /// Enter an order into the workflow.
    ///
    /// Verifies the order exists via the order directory, creates the
    /// instance in `Created` with its SLA deadline derived from the table.
    pub async fn create_workflow(
        &self,
        order_id: OrderId,
        actor: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let summary = self
            .bounded(self.orders.get_order(&order_id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("order {order_id}")))?;

        let instance = WorkflowInstance::new(summary.order_id, &self.table);
        self.bounded(self.store.create_instance(instance.clone()))
            .await?;

        self.publish(WorkflowEvent {
            workflow_id: instance.id.clone(),
            order_id: instance.order_id.clone(),
            from_state: None,
            to_state: instance.current_state,
            action: None,
            trigger: Trigger::System,
            occurred_at: instance.created_at,
        })
        .await;

        tracing::info!(
            workflow_id = %instance.id,
            order_id = %instance.order_id,
            actor,
            "workflow created"
        );
        Ok(instance)
    }

    /// Get the workflow instance governing an order.
    pub async fn get_workflow(&self, order_id: &OrderId) -> WorkflowResult<WorkflowInstance> {
        let instance = self
            .bounded(self.store.get_by_order(order_id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("order {order_id}")))?;
        self.cache.insert(instance.clone()).await;
        Ok(instance)
    }

    /// Get one instance by workflow id, through the read cache.
    pub async fn get_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> WorkflowResult<WorkflowInstance> {
        if let Some(hit) = self.cache.get(id).await {
            return Ok(hit);
        }
        let instance = self
            .bounded(self.store.get_instance(id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        self.cache.insert(instance.clone()).await;
        Ok(instance)
    }

    /// Ordered transition history for one workflow.
    pub async fn get_history(
        &self,
        id: &WorkflowInstanceId,
    ) -> WorkflowResult<Vec<WorkflowTransition>> {
        self.bounded(self.store.history(id)).await
    }

    // ── Action Execution ─────────────────────────────────────────────

    /// Validate and execute one action against one instance.
    ///
    /// The mutation commits through the store's optimistic version check;
    /// losing a concurrent race is a `Conflict` the caller may retry — a
    /// retry after an unacknowledged success simply finds the new state
    /// and reports `InvalidTransition` rather than corrupting anything.
    pub async fn execute_action(
        &self,
        id: &WorkflowInstanceId,
        action: Action,
        trigger: Trigger,
        actor: Option<&str>,
        ctx: ActionContext,
    ) -> WorkflowResult<TransitionResult> {
        let started = Instant::now();

        let mut instance = self
            .bounded(self.store.get_instance(id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        let from = instance.current_state;

        let Some(to) = self.table.next_state(from, action) else {
            let err = WorkflowError::InvalidTransition {
                state: from,
                action,
            };
            if self.config.record_failed_attempts {
                let mut record = WorkflowTransition::new(id.clone(), from, from, action, trigger)
                    .failed(err.to_string())
                    .with_execution_time(started.elapsed().as_millis() as u64);
                if let Some(actor) = actor {
                    record = record.with_actor(actor);
                }
                if let Err(audit_err) = self.bounded(self.store.append_transition(record)).await {
                    tracing::warn!(
                        workflow_id = %id,
                        error = %audit_err,
                        "failed to record rejected attempt"
                    );
                }
            }
            return Err(err);
        };

        let expected_version = instance.version;
        let now = Utc::now();
        let was_overdue = instance.is_overdue(now);

        instance.apply_transition(to, &self.table, now);
        if was_overdue {
            instance.sla_breaches += 1;
        }

        let raising_escalation = action == Action::Escalate && !ctx.resolves_escalation;
        if self.table.is_risk_flagged(to) {
            let reason = ctx
                .reason
                .clone()
                .unwrap_or_else(|| format!("entered risk-flagged state {to}"));
            instance.flag_escalation(reason);
        } else if raising_escalation {
            let reason = ctx
                .reason
                .clone()
                .unwrap_or_else(|| "escalation requested".to_string());
            instance.flag_escalation(reason);
        } else {
            instance.clear_escalation();
        }

        let execution_time_ms = started.elapsed().as_millis() as u64;
        let mut record = WorkflowTransition::new(id.clone(), from, to, action, trigger)
            .with_execution_time(execution_time_ms);
        if let Some(actor) = actor {
            record = record.with_actor(actor);
        }
        if let Some(reason) = &ctx.reason {
            record = record.with_reason(reason.clone());
        }
        for (key, value) in &ctx.data {
            record = record.with_extra(key.clone(), value.clone());
        }
        if was_overdue {
            record = record.with_extra("sla_breached", serde_json::json!(true));
        }

        self.bounded(
            self.store
                .commit_transition(instance.clone(), record, expected_version),
        )
        .await?;
        self.cache.invalidate(id).await;

        self.publish(WorkflowEvent {
            workflow_id: id.clone(),
            order_id: instance.order_id.clone(),
            from_state: Some(from),
            to_state: to,
            action: Some(action),
            trigger,
            occurred_at: now,
        })
        .await;

        tracing::info!(
            workflow_id = %id,
            from = %from,
            to = %to,
            action = %action,
            trigger = %trigger,
            "workflow transition executed"
        );

        Ok(TransitionResult {
            workflow_id: id.clone(),
            previous_state: from,
            new_state: to,
            execution_time_ms,
        })
    }

    // ── Priority ─────────────────────────────────────────────────────

    /// Persist a priority computed by an external rule.
    ///
    /// The engine does not compute priority; it validates the range and
    /// stores the value.
    pub async fn set_priority(
        &self,
        id: &WorkflowInstanceId,
        priority: u8,
        actor: &str,
    ) -> WorkflowResult<()> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(WorkflowError::InvalidRequest(format!(
                "priority {priority} out of range {MIN_PRIORITY}..={MAX_PRIORITY}"
            )));
        }
        self.bounded(self.store.update_priority(id, priority))
            .await?;
        self.cache.invalidate(id).await;
        tracing::info!(workflow_id = %id, priority, actor, "priority updated");
        Ok(())
    }

    // ── Operator Triage ──────────────────────────────────────────────

    /// Flagged instances needing operator attention, highest priority first.
    pub async fn list_attention_required(
        &self,
        kind: AttentionKind,
        min_priority: Option<u8>,
        limit: Option<usize>,
    ) -> WorkflowResult<Vec<WorkflowInstance>> {
        let now = Utc::now();
        let mut flagged = match kind {
            AttentionKind::Escalated => self
                .bounded(self.store.snapshot_instances())
                .await?
                .into_iter()
                .filter(|i| i.escalation_required)
                .collect::<Vec<_>>(),
            AttentionKind::SlaBreached => self.bounded(self.store.overdue_instances(now)).await?,
            AttentionKind::Errored => {
                let records = self
                    .bounded(
                        self.store
                            .transitions_in_window(chrono::DateTime::<Utc>::MIN_UTC, now),
                    )
                    .await?;
                // Last record per workflow decides; records are oldest-first.
                let mut last_failed = std::collections::HashMap::new();
                for record in &records {
                    last_failed.insert(record.workflow_id.clone(), !record.data.success);
                }
                self.bounded(self.store.snapshot_instances())
                    .await?
                    .into_iter()
                    .filter(|i| last_failed.get(&i.id).copied().unwrap_or(false))
                    .collect()
            }
        };

        if let Some(min) = min_priority {
            flagged.retain(|i| i.priority >= min);
        }
        flagged.sort_by(|a, b| b.priority.cmp(&a.priority));
        if let Some(limit) = limit {
            flagged.truncate(limit);
        }
        Ok(flagged)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Fire-and-forget audit notification.
    async fn publish(&self, event: WorkflowEvent) {
        if let Err(err) = self.audit.publish(event).await {
            tracing::warn!(error = %err, "audit sink publish failed");
        }
    }
}
