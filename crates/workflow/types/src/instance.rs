//! Workflow instances: one per order, mutated only through the engine.
//!
//! An instance tracks where an order currently sits in the state machine,
//! when it got there, when it is expected to leave (the SLA deadline),
//! and the escalation/priority bookkeeping an operator cares about.

use crate::{OrderState, TransitionTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest service priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest service priority.
pub const MAX_PRIORITY: u8 = 15;
/// Priority assigned to new instances until an external rule updates it.
pub const DEFAULT_PRIORITY: u8 = 5;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the external order entity (foreign, not owned)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Instance ────────────────────────────────────────────────

/// The per-order state-machine record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier, stable for the instance's lifetime
    pub id: WorkflowInstanceId,
    /// The order this workflow governs
    pub order_id: OrderId,
    /// Current state; always a member of the valid state set
    pub current_state: OrderState,
    /// State before the last transition; None before the first transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<OrderState>,
    /// When the last successful transition happened
    pub state_entered_at: DateTime<Utc>,
    /// When the instance is expected to leave `current_state`.
    ///
    /// Always derived from the current state's configured dwell, never
    /// mutated independently. None in terminal states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_deadline: Option<DateTime<Utc>>,
    /// Service priority, 1–15; higher is more urgent. Supplied by an
    /// external rule and merely persisted here.
    pub priority: u8,
    /// Set on deadline breach or explicit escalation
    pub escalation_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// Times the deadline was exceeded before a transition
    pub sla_breaches: u32,
    /// Successful transitions so far
    pub state_transition_count: u32,
    /// Optimistic concurrency token; bumped on every committed mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Create a new instance in `Created`, with its SLA deadline derived
    /// from the table.
    pub fn new(order_id: OrderId, table: &TransitionTable) -> Self {
        let now = Utc::now();
        let state = OrderState::Created;
        Self {
            id: WorkflowInstanceId::generate(),
            order_id,
            current_state: state,
            previous_state: None,
            state_entered_at: now,
            sla_deadline: table.sla_deadline(state, now),
            priority: DEFAULT_PRIORITY,
            escalation_required: false,
            escalation_reason: None,
            sla_breaches: 0,
            state_transition_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Whether the SLA deadline has passed (never true in terminal states).
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.sla_deadline {
            Some(deadline) => !self.is_terminal() && now > deadline,
            None => false,
        }
    }

    /// Derived performance metrics; nothing here is stored redundantly.
    pub fn performance_metrics(&self, now: DateTime<Utc>) -> PerformanceMetrics {
        PerformanceMetrics {
            time_in_state_secs: now.signed_duration_since(self.state_entered_at).num_seconds(),
            total_processing_time_secs: now.signed_duration_since(self.created_at).num_seconds(),
            state_transition_count: self.state_transition_count,
            sla_breaches: self.sla_breaches,
        }
    }

    // ── Mutation (engine-internal) ───────────────────────────────────

    /// Move to `to`, resetting dwell tracking and deriving the new deadline.
    ///
    /// Callers persist the result through the store's versioned commit;
    /// this only mutates the in-memory copy.
    pub fn apply_transition(&mut self, to: OrderState, table: &TransitionTable, now: DateTime<Utc>) {
        self.previous_state = Some(self.current_state);
        self.current_state = to;
        self.state_entered_at = now;
        self.sla_deadline = table.sla_deadline(to, now);
        self.state_transition_count += 1;
        self.version += 1;
        self.updated_at = now;
    }

    pub fn flag_escalation(&mut self, reason: impl Into<String>) {
        self.escalation_required = true;
        self.escalation_reason = Some(reason.into());
    }

    pub fn clear_escalation(&mut self) {
        self.escalation_required = false;
        self.escalation_reason = None;
    }
}

/// Derived per-instance performance metrics
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub time_in_state_secs: i64,
    pub total_processing_time_secs: i64,
    pub state_transition_count: u32,
    pub sla_breaches: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_instance() -> WorkflowInstance {
        WorkflowInstance::new(OrderId::new("order-1"), &TransitionTable::commerce())
    }

    #[test]
    fn new_instance_starts_in_created() {
        let inst = make_instance();
        assert_eq!(inst.current_state, OrderState::Created);
        assert!(inst.previous_state.is_none());
        assert_eq!(inst.state_transition_count, 0);
        assert_eq!(inst.version, 0);
        assert_eq!(inst.priority, DEFAULT_PRIORITY);
        assert!(inst.sla_deadline.is_some());
        assert!(!inst.is_terminal());
    }

    #[test]
    fn apply_transition_tracks_previous_state() {
        let table = TransitionTable::commerce();
        let mut inst = make_instance();
        let now = Utc::now();

        inst.apply_transition(OrderState::PaymentConfirmed, &table, now);

        assert_eq!(inst.previous_state, Some(OrderState::Created));
        assert_eq!(inst.current_state, OrderState::PaymentConfirmed);
        assert_eq!(inst.state_entered_at, now);
        assert_eq!(inst.sla_deadline, Some(now + Duration::hours(1)));
        assert_eq!(inst.state_transition_count, 1);
        assert_eq!(inst.version, 1);
    }

    #[test]
    fn terminal_entry_clears_deadline() {
        let table = TransitionTable::commerce();
        let mut inst = make_instance();
        inst.apply_transition(OrderState::Cancelled, &table, Utc::now());
        assert!(inst.sla_deadline.is_none());
        assert!(inst.is_terminal());
        assert!(!inst.is_overdue(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn overdue_detection() {
        let inst = make_instance();
        let deadline = inst.sla_deadline.unwrap();
        assert!(!inst.is_overdue(deadline - Duration::seconds(1)));
        assert!(inst.is_overdue(deadline + Duration::seconds(1)));
    }

    #[test]
    fn metrics_are_derived() {
        let mut inst = make_instance();
        inst.sla_breaches = 2;
        let now = inst.created_at + Duration::seconds(90);
        let metrics = inst.performance_metrics(now);
        assert_eq!(metrics.time_in_state_secs, 90);
        assert_eq!(metrics.total_processing_time_secs, 90);
        assert_eq!(metrics.sla_breaches, 2);
    }

    #[test]
    fn priority_builder_clamps() {
        let inst = make_instance().with_priority(99);
        assert_eq!(inst.priority, MAX_PRIORITY);
        let inst = make_instance().with_priority(0);
        assert_eq!(inst.priority, MIN_PRIORITY);
    }

    #[test]
    fn escalation_flagging() {
        let mut inst = make_instance();
        inst.flag_escalation("SLA breach");
        assert!(inst.escalation_required);
        assert_eq!(inst.escalation_reason.as_deref(), Some("SLA breach"));
        inst.clear_escalation();
        assert!(!inst.escalation_required);
        assert!(inst.escalation_reason.is_none());
    }

    #[test]
    fn instance_id_display() {
        let id = WorkflowInstanceId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);
        let named = WorkflowInstanceId::new("wf-1");
        assert_eq!(format!("{named}"), "wf-1");
    }
}
