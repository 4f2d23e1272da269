//! The static transition table and per-state dwell configuration.
//!
//! A `(current_state, action)` pair absent from the table is an invalid
//! transition. Each non-terminal state also carries a maximum dwell
//! duration, used to derive an instance's SLA deadline on entry.

use crate::{Action, OrderState, WorkflowError, WorkflowResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-state configuration
#[derive(Clone, Debug)]
pub struct StateConfig {
    /// Maximum time an instance is expected to dwell in this state
    pub max_dwell: Duration,
    /// Risk-flagged states keep `escalation_required` set on entry
    pub risk_flagged: bool,
}

impl StateConfig {
    pub fn new(max_dwell: Duration) -> Self {
        Self {
            max_dwell,
            risk_flagged: false,
        }
    }

    pub fn risk_flagged(mut self) -> Self {
        self.risk_flagged = true;
        self
    }
}

/// Maps `(current_state, action)` to the next state.
#[derive(Clone, Debug, Default)]
pub struct TransitionTable {
    rows: HashMap<(OrderState, Action), OrderState>,
    states: HashMap<OrderState, StateConfig>,
}

impl TransitionTable {
    /// Create an empty table; rows are added with [`allow`](Self::allow).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The default commerce order flow.
    ///
    /// Escalation is an orthogonal flag, not a state: every non-terminal
    /// state permits an `Escalate` self-loop so the scheduled sweep can
    /// record breaches through the normal transition path. The one
    /// state-changing escalation is `Delivered → Disputed`.
    pub fn commerce() -> Self {
        let mut table = Self::empty();

        table.set_config(
            OrderState::Created,
            StateConfig::new(Duration::minutes(30)),
        );
        table.set_config(
            OrderState::PaymentConfirmed,
            StateConfig::new(Duration::hours(1)),
        );
        table.set_config(
            OrderState::InventoryReserved,
            StateConfig::new(Duration::hours(2)),
        );
        table.set_config(
            OrderState::AwaitingVendorApproval,
            StateConfig::new(Duration::hours(24)),
        );
        table.set_config(
            OrderState::Preparing,
            StateConfig::new(Duration::hours(48)),
        );
        table.set_config(OrderState::Shipped, StateConfig::new(Duration::days(7)));
        table.set_config(OrderState::Delivered, StateConfig::new(Duration::hours(72)));
        table.set_config(
            OrderState::Disputed,
            StateConfig::new(Duration::hours(72)).risk_flagged(),
        );

        let rows = [
            (OrderState::Created, Action::Confirm, OrderState::PaymentConfirmed),
            (
                OrderState::PaymentConfirmed,
                Action::ReserveInventory,
                OrderState::InventoryReserved,
            ),
            (
                OrderState::InventoryReserved,
                Action::RequestVendorApproval,
                OrderState::AwaitingVendorApproval,
            ),
            (
                OrderState::InventoryReserved,
                Action::StartPreparing,
                OrderState::Preparing,
            ),
            (
                OrderState::AwaitingVendorApproval,
                Action::ApproveVendor,
                OrderState::Preparing,
            ),
            (
                OrderState::AwaitingVendorApproval,
                Action::RejectVendor,
                OrderState::Cancelled,
            ),
            (
                OrderState::AwaitingVendorApproval,
                Action::Retry,
                OrderState::AwaitingVendorApproval,
            ),
            (OrderState::Preparing, Action::Ship, OrderState::Shipped),
            (OrderState::Preparing, Action::Retry, OrderState::Preparing),
            (OrderState::Shipped, Action::Deliver, OrderState::Delivered),
            (OrderState::Delivered, Action::Complete, OrderState::Completed),
            (OrderState::Delivered, Action::Refund, OrderState::Refunded),
            (OrderState::Delivered, Action::Escalate, OrderState::Disputed),
            (OrderState::Disputed, Action::Complete, OrderState::Completed),
            (OrderState::Disputed, Action::Refund, OrderState::Refunded),
        ];
        for (from, action, to) in rows {
            table
                .allow(from, action, to)
                .unwrap_or_else(|_| unreachable!("default rows only leave non-terminal states"));
        }

        // Cancellation is permitted up to (but not after) delivery,
        // and while a dispute is open.
        for from in [
            OrderState::Created,
            OrderState::PaymentConfirmed,
            OrderState::InventoryReserved,
            OrderState::AwaitingVendorApproval,
            OrderState::Preparing,
            OrderState::Shipped,
            OrderState::Disputed,
        ] {
            table
                .allow(from, Action::Cancel, OrderState::Cancelled)
                .unwrap_or_else(|_| unreachable!("cancel rows only leave non-terminal states"));
        }

        // Escalate self-loops everywhere except Delivered (which disputes).
        for from in OrderState::ALL {
            if from.is_terminal() || from == OrderState::Delivered {
                continue;
            }
            table
                .allow(from, Action::Escalate, from)
                .unwrap_or_else(|_| unreachable!("escalate rows only leave non-terminal states"));
        }

        table
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Add a transition row. Terminal states accept no outgoing rows.
    pub fn allow(&mut self, from: OrderState, action: Action, to: OrderState) -> WorkflowResult<()> {
        if from.is_terminal() {
            return Err(WorkflowError::InvalidRequest(format!(
                "terminal state {from} cannot have outgoing transitions"
            )));
        }
        self.rows.insert((from, action), to);
        Ok(())
    }

    /// Set (or replace) a state's dwell configuration.
    pub fn set_config(&mut self, state: OrderState, config: StateConfig) {
        self.states.insert(state, config);
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// The next state for `(state, action)`, if the pair is in the table.
    pub fn next_state(&self, state: OrderState, action: Action) -> Option<OrderState> {
        self.rows.get(&(state, action)).copied()
    }

    /// Whether `(state, action)` is a valid pair.
    pub fn permits(&self, state: OrderState, action: Action) -> bool {
        self.rows.contains_key(&(state, action))
    }

    /// The configured maximum dwell for a state. Terminal states have none.
    pub fn max_dwell(&self, state: OrderState) -> Option<Duration> {
        self.states.get(&state).map(|c| c.max_dwell)
    }

    /// Whether entering `state` keeps the escalation flag set.
    pub fn is_risk_flagged(&self, state: OrderState) -> bool {
        self.states
            .get(&state)
            .map(|c| c.risk_flagged)
            .unwrap_or(false)
    }

    /// The SLA deadline for an instance entering `state` at `entered_at`.
    pub fn sla_deadline(&self, state: OrderState, entered_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_dwell(state).map(|dwell| entered_at + dwell)
    }

    /// Number of transition rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commerce_happy_path() {
        let table = TransitionTable::commerce();
        assert_eq!(
            table.next_state(OrderState::Created, Action::Confirm),
            Some(OrderState::PaymentConfirmed)
        );
        assert_eq!(
            table.next_state(OrderState::Shipped, Action::Deliver),
            Some(OrderState::Delivered)
        );
        assert_eq!(
            table.next_state(OrderState::Delivered, Action::Complete),
            Some(OrderState::Completed)
        );
    }

    #[test]
    fn terminal_states_have_no_rows() {
        let table = TransitionTable::commerce();
        for state in [
            OrderState::Completed,
            OrderState::Cancelled,
            OrderState::Refunded,
        ] {
            for action in Action::ALL {
                assert!(
                    !table.permits(state, action),
                    "{state} must not permit {action}"
                );
            }
        }
    }

    #[test]
    fn absent_pairs_are_invalid() {
        let table = TransitionTable::commerce();
        assert!(!table.permits(OrderState::Created, Action::Ship));
        assert!(!table.permits(OrderState::Completed, Action::Cancel));
        assert!(!table.permits(OrderState::Delivered, Action::Cancel));
    }

    #[test]
    fn escalate_self_loops_on_non_terminal_states() {
        let table = TransitionTable::commerce();
        for state in OrderState::ALL {
            if state.is_terminal() {
                continue;
            }
            let next = table.next_state(state, Action::Escalate);
            if state == OrderState::Delivered {
                assert_eq!(next, Some(OrderState::Disputed));
            } else {
                assert_eq!(next, Some(state));
            }
        }
    }

    #[test]
    fn allow_rejects_terminal_source() {
        let mut table = TransitionTable::empty();
        let err = table
            .allow(OrderState::Completed, Action::Refund, OrderState::Refunded)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[test]
    fn dwell_is_configured_for_non_terminal_states() {
        let table = TransitionTable::commerce();
        for state in OrderState::ALL {
            if state.is_terminal() {
                assert!(table.max_dwell(state).is_none());
            } else {
                assert!(table.max_dwell(state).is_some(), "{state} needs a dwell");
            }
        }
    }

    #[test]
    fn deadline_derives_from_entry_time() {
        let table = TransitionTable::commerce();
        let entered = Utc::now();
        let deadline = table.sla_deadline(OrderState::Created, entered).unwrap();
        assert_eq!(deadline, entered + Duration::minutes(30));
        assert!(table.sla_deadline(OrderState::Completed, entered).is_none());
    }

    #[test]
    fn disputed_is_risk_flagged() {
        let table = TransitionTable::commerce();
        assert!(table.is_risk_flagged(OrderState::Disputed));
        assert!(!table.is_risk_flagged(OrderState::Created));
    }
}
