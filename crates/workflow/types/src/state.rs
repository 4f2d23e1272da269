//! The finite state, action, and trigger sets of the order workflow.

use crate::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

// ── Order State ──────────────────────────────────────────────────────

/// The lifecycle state of an order workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Order entered the workflow, payment not yet confirmed
    #[default]
    Created,
    /// Payment confirmed by the external payment collaborator
    PaymentConfirmed,
    /// Inventory reserved for the order
    InventoryReserved,
    /// Waiting on vendor approval
    AwaitingVendorApproval,
    /// Vendor is preparing the order
    Preparing,
    /// Handed to the carrier
    Shipped,
    /// Carrier reported delivery
    Delivered,
    /// Successfully closed (terminal)
    Completed,
    /// Cancelled before completion (terminal)
    Cancelled,
    /// Refunded after delivery or dispute (terminal)
    Refunded,
    /// Under dispute; risk-flagged until resolved
    Disputed,
}

impl OrderState {
    /// Every member of the state set, in lifecycle order.
    pub const ALL: [OrderState; 11] = [
        OrderState::Created,
        OrderState::PaymentConfirmed,
        OrderState::InventoryReserved,
        OrderState::AwaitingVendorApproval,
        OrderState::Preparing,
        OrderState::Shipped,
        OrderState::Delivered,
        OrderState::Completed,
        OrderState::Cancelled,
        OrderState::Refunded,
        OrderState::Disputed,
    ];

    /// Check if this is a terminal state (no outgoing transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::PaymentConfirmed => "PaymentConfirmed",
            Self::InventoryReserved => "InventoryReserved",
            Self::AwaitingVendorApproval => "AwaitingVendorApproval",
            Self::Preparing => "Preparing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
            Self::Disputed => "Disputed",
        }
    }

    /// Parse a state name as stored by a persistence backend.
    pub fn parse(name: &str) -> WorkflowResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| WorkflowError::InvalidRequest(format!("unknown state name: {name}")))
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Action ───────────────────────────────────────────────────────────

/// An action requested against a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Confirm,
    ReserveInventory,
    RequestVendorApproval,
    ApproveVendor,
    RejectVendor,
    StartPreparing,
    Ship,
    Deliver,
    Complete,
    Cancel,
    Refund,
    Escalate,
    Retry,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Confirm,
        Action::ReserveInventory,
        Action::RequestVendorApproval,
        Action::ApproveVendor,
        Action::RejectVendor,
        Action::StartPreparing,
        Action::Ship,
        Action::Deliver,
        Action::Complete,
        Action::Cancel,
        Action::Refund,
        Action::Escalate,
        Action::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "Confirm",
            Self::ReserveInventory => "ReserveInventory",
            Self::RequestVendorApproval => "RequestVendorApproval",
            Self::ApproveVendor => "ApproveVendor",
            Self::RejectVendor => "RejectVendor",
            Self::StartPreparing => "StartPreparing",
            Self::Ship => "Ship",
            Self::Deliver => "Deliver",
            Self::Complete => "Complete",
            Self::Cancel => "Cancel",
            Self::Refund => "Refund",
            Self::Escalate => "Escalate",
            Self::Retry => "Retry",
        }
    }

    /// Parse an action name supplied by an external caller.
    ///
    /// Unknown names are an [`WorkflowError::InvalidRequest`], not a panic —
    /// action names cross the API boundary as plain strings.
    pub fn parse(name: &str) -> WorkflowResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| WorkflowError::InvalidRequest(format!("unknown action name: {name}")))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Trigger ──────────────────────────────────────────────────────────

/// The origin of a transition request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// Human-initiated (operator or customer)
    Manual,
    /// Business-rule-initiated
    Automatic,
    /// Internal housekeeping
    System,
    /// SLA-driven scheduled sweep
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Automatic => "Automatic",
            Self::System => "System",
            Self::Scheduled => "Scheduled",
        }
    }

    pub fn parse(name: &str) -> WorkflowResult<Self> {
        match name {
            "Manual" => Ok(Self::Manual),
            "Automatic" => Ok(Self::Automatic),
            "System" => Ok(Self::System),
            "Scheduled" => Ok(Self::Scheduled),
            other => Err(WorkflowError::InvalidRequest(format!(
                "unknown trigger name: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(OrderState::Completed.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(OrderState::Refunded.is_terminal());
        assert!(!OrderState::Created.is_terminal());
        assert!(!OrderState::Disputed.is_terminal());
    }

    #[test]
    fn action_parse_roundtrip() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()).unwrap(), action);
        }
        // Case-insensitive for external callers
        assert_eq!(Action::parse("cancel").unwrap(), Action::Cancel);
    }

    #[test]
    fn unknown_action_is_invalid_request() {
        let err = Action::parse("Teleport").unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[test]
    fn state_parse_roundtrip() {
        for state in OrderState::ALL {
            assert_eq!(OrderState::parse(state.as_str()).unwrap(), state);
        }
        assert!(OrderState::parse("Limbo").is_err());
    }

    #[test]
    fn trigger_parse() {
        assert_eq!(Trigger::parse("Scheduled").unwrap(), Trigger::Scheduled);
        assert!(Trigger::parse("Cosmic").is_err());
    }
}
