//! Order Workflow Engine
//!
//! The engine governs one finite-state machine per commerce order. It
//! validates requested actions against a static transition table, tracks
//! per-state SLA deadlines, computes escalation, and records an immutable
//! transition history for audit and analytics.
//!
//! # Key principle
//!
//! **The engine coordinates state, it never executes side effects.**
//!
//! Payment, inventory, and notification work happen in external
//! collaborators; the engine only records that such effects were requested
//! via workflow actions and what their outcomes were.
//!
//! # Architecture
//!
//! - [`TransitionEngine`] — validates and executes actions, one instance
//!   mutation at a time, through the store's versioned commit
//! - bulk execution ([`TransitionEngine::execute_bulk`]) — one action over
//!   many instances with per-item isolation and bounded fan-out
//! - [`SweepReport`]-producing SLA sweep ([`TransitionEngine::run_sla_sweep`])
//!   — flags overdue instances through the same serialized path
//! - [`AnalyticsAggregator`] — off-hot-path reporting over the history
//! - [`InstanceCache`] — explicit bounded/TTL read cache, invalidated on
//!   every committed write
//! - [`OrderDirectory`] / [`AuditSink`] — the two external collaborators
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use order_workflow_engine::{
//!     EngineConfig, NoopAuditSink, OrderSummary, StaticOrderDirectory, TransitionEngine,
//! };
//! use order_workflow_store::InMemoryWorkflowStore;
//! use order_workflow_types::{Action, ActionContext, OrderId, TransitionTable, Trigger};
//!
//! # async fn demo() -> order_workflow_types::WorkflowResult<()> {
//! let directory = StaticOrderDirectory::new();
//! directory.insert(OrderSummary::new(OrderId::new("order-1"), "customer-9", 4_999, "USD"));
//!
//! let engine = TransitionEngine::new(
//!     Arc::new(InMemoryWorkflowStore::new()),
//!     Arc::new(directory),
//!     Arc::new(NoopAuditSink),
//!     TransitionTable::commerce(),
//!     EngineConfig::default(),
//! );
//!
//! let workflow = engine.create_workflow(OrderId::new("order-1"), "checkout").await?;
//! let result = engine
//!     .execute_action(
//!         &workflow.id,
//!         Action::Confirm,
//!         Trigger::Automatic,
//!         Some("payment-service"),
//!         ActionContext::default(),
//!     )
//!     .await?;
//! assert_eq!(result.previous_state, order_workflow_types::OrderState::Created);
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod analytics;
pub mod bulk;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod sweep;

pub use analytics::{
    AnalyticsAggregator, AnalyticsReport, Bottleneck, StateCount, StateDwell, TrendPoint,
};
pub use bulk::{BulkItemResult, BulkResult};
pub use cache::InstanceCache;
pub use collaborators::{
    AuditSink, NoopAuditSink, OrderDirectory, OrderSummary, StaticOrderDirectory, WorkflowEvent,
};
pub use config::EngineConfig;
pub use engine::{AttentionKind, TransitionEngine, TransitionResult};
pub use sweep::SweepReport;
