//! PostgreSQL adapter for the workflow store.
//!
//! The transactional source-of-truth backend. `commit_transition` runs the
//! instance update and the history insert in one transaction, with the
//! optimistic version check expressed as `WHERE version = $expected`.

use crate::traits::WorkflowStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_workflow_types::{
    Action, OrderId, OrderState, TransitionData, TransitionId, Trigger, WorkflowError,
    WorkflowInstance, WorkflowInstanceId, WorkflowResult, WorkflowTransition,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

/// PostgreSQL-backed workflow store.
#[derive(Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    /// Connect to PostgreSQL and initialize the required schema.
    pub async fn connect(database_url: &str) -> WorkflowResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> WorkflowResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> WorkflowResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> WorkflowResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS order_workflows (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL UNIQUE,
                current_state TEXT NOT NULL,
                previous_state TEXT,
                state_entered_at TIMESTAMPTZ NOT NULL,
                sla_deadline TIMESTAMPTZ,
                priority SMALLINT NOT NULL,
                escalation_required BOOLEAN NOT NULL,
                escalation_reason TEXT,
                sla_breaches BIGINT NOT NULL,
                state_transition_count BIGINT NOT NULL,
                version BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS order_workflow_transitions (
                id TEXT PRIMARY KEY,
                seq BIGSERIAL,
                workflow_id TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                action TEXT NOT NULL,
                trigger TEXT NOT NULL,
                triggered_by TEXT,
                data JSONB NOT NULL,
                transitioned_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_owt_workflow
                ON order_workflow_transitions (workflow_id, transitioned_at, seq)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_ow_deadline
                ON order_workflows (sla_deadline)
                WHERE current_state NOT IN ('Completed', 'Cancelled', 'Refunded')
            "#,
        ];
        for statement in ddl {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| backend(format!("failed to initialize schema: {e}")))?;
        }
        Ok(())
    }
}

fn backend(message: String) -> WorkflowError {
    WorkflowError::StoreUnavailable(message)
}

fn instance_from_row(row: &PgRow) -> WorkflowResult<WorkflowInstance> {
    let current_state: String = row.try_get("current_state").map_err(row_error)?;
    let previous_state: Option<String> = row.try_get("previous_state").map_err(row_error)?;
    Ok(WorkflowInstance {
        id: WorkflowInstanceId::new(row.try_get::<String, _>("id").map_err(row_error)?),
        order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(row_error)?),
        current_state: OrderState::parse(&current_state)?,
        previous_state: previous_state.as_deref().map(OrderState::parse).transpose()?,
        state_entered_at: row.try_get("state_entered_at").map_err(row_error)?,
        sla_deadline: row.try_get("sla_deadline").map_err(row_error)?,
        priority: row.try_get::<i16, _>("priority").map_err(row_error)? as u8,
        escalation_required: row.try_get("escalation_required").map_err(row_error)?,
        escalation_reason: row.try_get("escalation_reason").map_err(row_error)?,
        sla_breaches: row.try_get::<i64, _>("sla_breaches").map_err(row_error)? as u32,
        state_transition_count: row
            .try_get::<i64, _>("state_transition_count")
            .map_err(row_error)? as u32,
        version: row.try_get::<i64, _>("version").map_err(row_error)? as u64,
        created_at: row.try_get("created_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
    })
}

fn transition_from_row(row: &PgRow) -> WorkflowResult<WorkflowTransition> {
    let action: String = row.try_get("action").map_err(row_error)?;
    let trigger: String = row.try_get("trigger").map_err(row_error)?;
    let from_state: String = row.try_get("from_state").map_err(row_error)?;
    let to_state: String = row.try_get("to_state").map_err(row_error)?;
    let data: serde_json::Value = row.try_get("data").map_err(row_error)?;
    let data: TransitionData = serde_json::from_value(data)
        .map_err(|e| backend(format!("corrupt transition data: {e}")))?;
    Ok(WorkflowTransition {
        id: TransitionId::new(row.try_get::<String, _>("id").map_err(row_error)?),
        workflow_id: WorkflowInstanceId::new(
            row.try_get::<String, _>("workflow_id").map_err(row_error)?,
        ),
        from_state: OrderState::parse(&from_state)?,
        to_state: OrderState::parse(&to_state)?,
        action: Action::parse(&action)?,
        trigger: Trigger::parse(&trigger)?,
        triggered_by: row.try_get("triggered_by").map_err(row_error)?,
        data,
        transitioned_at: row.try_get("transitioned_at").map_err(row_error)?,
    })
}

fn row_error(e: sqlx::Error) -> WorkflowError {
    backend(format!("row decode failed: {e}"))
}

async fn insert_transition<'e, E>(executor: E, transition: &WorkflowTransition) -> WorkflowResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let data = serde_json::to_value(&transition.data)
        .map_err(|e| backend(format!("failed to serialize transition data: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO order_workflow_transitions
            (id, workflow_id, from_state, to_state, action, trigger,
             triggered_by, data, transitioned_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(transition.id.0.as_str())
    .bind(transition.workflow_id.0.as_str())
    .bind(transition.from_state.as_str())
    .bind(transition.to_state.as_str())
    .bind(transition.action.as_str())
    .bind(transition.trigger.as_str())
    .bind(transition.triggered_by.as_deref())
    .bind(data)
    .bind(transition.transitioned_at)
    .execute(executor)
    .await
    .map_err(|e| backend(format!("failed to insert transition: {e}")))?;
    Ok(())
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_workflows
                (id, order_id, current_state, previous_state, state_entered_at,
                 sla_deadline, priority, escalation_required, escalation_reason,
                 sla_breaches, state_transition_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(instance.id.0.as_str())
        .bind(instance.order_id.0.as_str())
        .bind(instance.current_state.as_str())
        .bind(instance.previous_state.map(|s| s.as_str()))
        .bind(instance.state_entered_at)
        .bind(instance.sla_deadline)
        .bind(instance.priority as i16)
        .bind(instance.escalation_required)
        .bind(instance.escalation_reason.as_deref())
        .bind(instance.sla_breaches as i64)
        .bind(instance.state_transition_count as i64)
        .bind(instance.version as i64)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| backend(format!("failed to insert workflow: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::Conflict(format!(
                "order {} already has a workflow",
                instance.order_id
            )));
        }
        Ok(())
    }

    async fn get_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> WorkflowResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT * FROM order_workflows WHERE id = $1")
            .bind(id.0.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(format!("failed to fetch workflow: {e}")))?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn get_by_order(&self, order_id: &OrderId) -> WorkflowResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT * FROM order_workflows WHERE order_id = $1")
            .bind(order_id.0.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(format!("failed to fetch workflow: {e}")))?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn commit_transition(
        &self,
        instance: WorkflowInstance,
        transition: WorkflowTransition,
        expected_version: u64,
    ) -> WorkflowResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend(format!("failed to begin transaction: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE order_workflows SET
                current_state = $1, previous_state = $2, state_entered_at = $3,
                sla_deadline = $4, priority = $5, escalation_required = $6,
                escalation_reason = $7, sla_breaches = $8,
                state_transition_count = $9, version = $10, updated_at = $11
            WHERE id = $12 AND version = $13
            "#,
        )
        .bind(instance.current_state.as_str())
        .bind(instance.previous_state.map(|s| s.as_str()))
        .bind(instance.state_entered_at)
        .bind(instance.sla_deadline)
        .bind(instance.priority as i16)
        .bind(instance.escalation_required)
        .bind(instance.escalation_reason.as_deref())
        .bind(instance.sla_breaches as i64)
        .bind(instance.state_transition_count as i64)
        .bind(instance.version as i64)
        .bind(instance.updated_at)
        .bind(instance.id.0.as_str())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend(format!("failed to update workflow: {e}")))?;

        if result.rows_affected() == 0 {
            // Distinguish a lost race from a missing instance.
            let exists = sqlx::query("SELECT 1 FROM order_workflows WHERE id = $1")
                .bind(instance.id.0.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| backend(format!("failed to check workflow: {e}")))?;
            return Err(match exists {
                Some(_) => WorkflowError::Conflict(format!(
                    "workflow {} was modified concurrently",
                    instance.id
                )),
                None => WorkflowError::NotFound(instance.id.to_string()),
            });
        }

        insert_transition(&mut *tx, &transition).await?;

        tx.commit()
            .await
            .map_err(|e| backend(format!("failed to commit transaction: {e}")))?;
        Ok(())
    }

    async fn append_transition(&self, transition: WorkflowTransition) -> WorkflowResult<()> {
        insert_transition(&self.pool, &transition).await
    }

    async fn history(&self, id: &WorkflowInstanceId) -> WorkflowResult<Vec<WorkflowTransition>> {
        let exists = sqlx::query("SELECT 1 FROM order_workflows WHERE id = $1")
            .bind(id.0.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(format!("failed to check workflow: {e}")))?;
        if exists.is_none() {
            return Err(WorkflowError::NotFound(id.to_string()));
        }

        let rows = sqlx::query(
            r#"
            SELECT * FROM order_workflow_transitions
            WHERE workflow_id = $1
            ORDER BY transitioned_at, seq
            "#,
        )
        .bind(id.0.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(format!("failed to fetch history: {e}")))?;
        rows.iter().map(transition_from_row).collect()
    }

    async fn transitions_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkflowResult<Vec<WorkflowTransition>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM order_workflow_transitions
            WHERE transitioned_at >= $1 AND transitioned_at < $2
            ORDER BY transitioned_at, seq
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(format!("failed to fetch transitions: {e}")))?;
        rows.iter().map(transition_from_row).collect()
    }

    async fn snapshot_instances(&self) -> WorkflowResult<Vec<WorkflowInstance>> {
        let rows = sqlx::query("SELECT * FROM order_workflows")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend(format!("failed to fetch workflows: {e}")))?;
        rows.iter().map(instance_from_row).collect()
    }

    async fn overdue_instances(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<WorkflowInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM order_workflows
            WHERE sla_deadline IS NOT NULL
              AND sla_deadline < $1
              AND current_state NOT IN ('Completed', 'Cancelled', 'Refunded')
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(format!("failed to fetch overdue workflows: {e}")))?;
        rows.iter().map(instance_from_row).collect()
    }

    async fn update_priority(&self, id: &WorkflowInstanceId, priority: u8) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_workflows
            SET priority = $1, version = version + 1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(priority as i16)
        .bind(Utc::now())
        .bind(id.0.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| backend(format!("failed to update priority: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
