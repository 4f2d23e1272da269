//! Domain types for the order workflow engine
//!
//! An order workflow is a per-order finite-state machine. This crate holds
//! the pieces every other workflow crate builds on:
//!
//! - [`OrderState`], [`Action`], [`Trigger`] — the finite sets the machine
//!   is defined over
//! - [`TransitionTable`] — the static `(state, action) → state` map plus
//!   per-state dwell configuration used to derive SLA deadlines
//! - [`WorkflowInstance`] — the per-order record, mutated exclusively
//!   through the transition engine
//! - [`WorkflowTransition`] — the append-only history record
//! - [`WorkflowError`] — the shared error taxonomy
//!
//! Instances are never deleted; terminal instances are retained for audit.

#![deny(unsafe_code)]

pub mod error;
pub mod instance;
pub mod state;
pub mod table;
pub mod transition;

pub use error::{WorkflowError, WorkflowResult};
pub use instance::{
    OrderId, PerformanceMetrics, WorkflowInstance, WorkflowInstanceId, DEFAULT_PRIORITY,
    MAX_PRIORITY, MIN_PRIORITY,
};
pub use state::{Action, OrderState, Trigger};
pub use table::{StateConfig, TransitionTable};
pub use transition::{ActionContext, TransitionData, TransitionId, WorkflowTransition};
