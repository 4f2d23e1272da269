//! The engine's two external collaborators.
//!
//! Order line-items, pricing, and inventory live outside this crate. The
//! engine needs exactly two capabilities from the outside world: look up
//! that an order exists (with a minimal summary), and notify an audit/event
//! sink that something happened. Both are injected as trait objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_workflow_types::{
    Action, OrderId, OrderState, Trigger, WorkflowInstanceId, WorkflowResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

// ── Order Directory ──────────────────────────────────────────────────

/// Minimal view of an order as seen by the workflow engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_minor_units: i64,
    pub currency: String,
}

impl OrderSummary {
    pub fn new(
        order_id: OrderId,
        customer_id: impl Into<String>,
        total_minor_units: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            customer_id: customer_id.into(),
            total_minor_units,
            currency: currency.into(),
        }
    }
}

/// Order lookup capability, owned by the external order subsystem.
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    async fn get_order(&self, order_id: &OrderId) -> WorkflowResult<Option<OrderSummary>>;
}

/// Fixed in-memory directory for tests and local runs.
#[derive(Default)]
pub struct StaticOrderDirectory {
    orders: RwLock<HashMap<OrderId, OrderSummary>>,
}

impl StaticOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, summary: OrderSummary) {
        if let Ok(mut guard) = self.orders.write() {
            guard.insert(summary.order_id.clone(), summary);
        }
    }
}

#[async_trait]
impl OrderDirectory for StaticOrderDirectory {
    async fn get_order(&self, order_id: &OrderId) -> WorkflowResult<Option<OrderSummary>> {
        let guard = self.orders.read().map_err(|_| {
            order_workflow_types::WorkflowError::StoreUnavailable(
                "order directory lock poisoned".to_string(),
            )
        })?;
        Ok(guard.get(order_id).cloned())
    }
}

// ── Audit Sink ───────────────────────────────────────────────────────

/// A state-change notification published to the external audit sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub workflow_id: WorkflowInstanceId,
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<OrderState>,
    pub to_state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub trigger: Trigger,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget event sink. The engine logs publish failures and never
/// propagates them; delivery is the sink's concern.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn publish(&self, event: WorkflowEvent) -> WorkflowResult<()>;
}

/// Sink that drops every event; useful for tests and local runs.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn publish(&self, _event: WorkflowEvent) -> WorkflowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_lookup() {
        let directory = StaticOrderDirectory::new();
        directory.insert(OrderSummary::new(OrderId::new("order-1"), "cust-1", 1000, "USD"));

        let hit = directory.get_order(&OrderId::new("order-1")).await.unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().customer_id, "cust-1");

        let miss = directory.get_order(&OrderId::new("order-2")).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn noop_sink_accepts_everything() {
        let sink = NoopAuditSink;
        let event = WorkflowEvent {
            workflow_id: WorkflowInstanceId::new("wf-1"),
            order_id: OrderId::new("order-1"),
            from_state: Some(OrderState::Created),
            to_state: OrderState::PaymentConfirmed,
            action: Some(Action::Confirm),
            trigger: Trigger::Automatic,
            occurred_at: Utc::now(),
        };
        assert!(sink.publish(event).await.is_ok());
    }
}
