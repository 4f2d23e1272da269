//! Append-only transition history records and the caller-supplied
//! action context.
//!
//! A `WorkflowTransition` is written exactly once per successful (and,
//! for audit completeness, per attempted-but-failed) transition and is
//! never updated or deleted. Within one workflow the records are strictly
//! ordered by `transitioned_at`, tiebroken by the store's append order.

use crate::{Action, OrderState, Trigger, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a transition record
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

impl TransitionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Action Context ───────────────────────────────────────────────────

/// Caller-supplied context for an action, persisted verbatim into the
/// transition record.
///
/// `data` keys follow the documented per-action schema rather than being
/// an untyped blob, so downstream analytics can rely on field presence.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Marks an `Escalate` action as resolving the outstanding escalation
    /// rather than raising one.
    #[serde(default)]
    pub resolves_escalation: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl ActionContext {
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn resolving(mut self) -> Self {
        self.resolves_escalation = true;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

// ── Transition Record ────────────────────────────────────────────────

/// Outcome payload carried by a transition record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub success: bool,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One append-only history record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub id: TransitionId,
    pub workflow_id: WorkflowInstanceId,
    pub from_state: OrderState,
    pub to_state: OrderState,
    pub action: Action,
    pub trigger: Trigger,
    /// Actor identity; None for system-originated transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub data: TransitionData,
    pub transitioned_at: DateTime<Utc>,
}

impl WorkflowTransition {
    /// A successful transition record; refine with the `with_*` builders.
    pub fn new(
        workflow_id: WorkflowInstanceId,
        from_state: OrderState,
        to_state: OrderState,
        action: Action,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: TransitionId::generate(),
            workflow_id,
            from_state,
            to_state,
            action,
            trigger,
            triggered_by: None,
            data: TransitionData {
                reason: None,
                success: true,
                execution_time_ms: 0,
                extra: HashMap::new(),
            },
            transitioned_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.triggered_by = Some(actor.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.data.reason = Some(reason.into());
        self
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.data.execution_time_ms = millis;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.extra.insert(key.into(), value);
        self
    }

    /// Mark this record as a rejected attempt; the state did not change.
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.data.success = false;
        self.data.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> WorkflowTransition {
        WorkflowTransition::new(
            WorkflowInstanceId::new("wf-1"),
            OrderState::Created,
            OrderState::PaymentConfirmed,
            Action::Confirm,
            Trigger::Automatic,
        )
    }

    #[test]
    fn new_record_defaults_to_success() {
        let record = make_record();
        assert!(record.data.success);
        assert!(record.triggered_by.is_none());
        assert_eq!(record.from_state, OrderState::Created);
        assert_eq!(record.to_state, OrderState::PaymentConfirmed);
    }

    #[test]
    fn failed_record_keeps_the_reason() {
        let record = make_record().failed("action Cancel is not valid in state Completed");
        assert!(!record.data.success);
        assert!(record.data.reason.as_deref().unwrap().contains("Completed"));
    }

    #[test]
    fn builders_compose() {
        let record = make_record()
            .with_actor("ops-7")
            .with_reason("customer request")
            .with_execution_time(12)
            .with_extra("sla_breached", serde_json::json!(true));
        assert_eq!(record.triggered_by.as_deref(), Some("ops-7"));
        assert_eq!(record.data.execution_time_ms, 12);
        assert_eq!(record.data.extra["sla_breached"], serde_json::json!(true));
    }

    #[test]
    fn context_serializes_verbatim() {
        let ctx = ActionContext::default()
            .with_reason("refund approved")
            .with_data("refund_id", serde_json::json!("rf-9"));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["reason"], "refund approved");
        assert_eq!(json["data"]["refund_id"], "rf-9");
    }

    #[test]
    fn resolving_context() {
        let ctx = ActionContext::default().resolving();
        assert!(ctx.resolves_escalation);
        assert!(!ActionContext::default().resolves_escalation);
    }
}
