//! Scheduled SLA sweep.
//!
//! Scans for non-terminal instances past their deadline and escalates
//! them. Where the table permits `Escalate` the sweep goes through the
//! normal action path; where it does not, the breach is still flagged and
//! recorded through the same versioned commit, without a state change.

use crate::engine::TransitionEngine;
use chrono::{DateTime, Utc};
use order_workflow_types::{Action, ActionContext, Trigger, WorkflowResult, WorkflowTransition};
use serde::{Deserialize, Serialize};

/// What one sweep pass did.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue instances found
    pub scanned: usize,
    /// Escalated through the `Escalate` action
    pub escalated: usize,
    /// Flagged without a state change (no `Escalate` row for the state)
    pub breach_recorded: usize,
    /// Instances the sweep could not update; retried next pass
    pub failures: usize,
}

impl TransitionEngine {
    /// Run one sweep pass over everything overdue at `now`.
    ///
    /// Per-instance failures are logged and counted, never fatal to the
    /// pass; a lost commit race just means someone else moved the
    /// instance first.
    pub async fn run_sla_sweep(&self, now: DateTime<Utc>) -> WorkflowResult<SweepReport> {
        let overdue = self.bounded(self.store().overdue_instances(now)).await?;
        let mut report = SweepReport {
            scanned: overdue.len(),
            ..SweepReport::default()
        };

        for instance in overdue {
            if self.table().permits(instance.current_state, Action::Escalate) {
                let outcome = self
                    .execute_action(
                        &instance.id,
                        Action::Escalate,
                        Trigger::Scheduled,
                        None,
                        ActionContext::default().with_reason("SLA breach"),
                    )
                    .await;
                match outcome {
                    Ok(_) => report.escalated += 1,
                    Err(err) => {
                        tracing::warn!(
                            workflow_id = %instance.id,
                            error = %err,
                            "sweep escalation failed"
                        );
                        report.failures += 1;
                    }
                }
                continue;
            }

            // No Escalate row for this state: flag in place, bumping the
            // version through the same commit path so concurrent writers
            // still conflict.
            let expected_version = instance.version;
            let mut updated = instance.clone();
            updated.flag_escalation("SLA breach");
            updated.sla_breaches += 1;
            updated.version += 1;
            updated.updated_at = now;
            let record = WorkflowTransition::new(
                instance.id.clone(),
                instance.current_state,
                instance.current_state,
                Action::Escalate,
                Trigger::Scheduled,
            )
            .with_reason("SLA breach")
            .with_extra("state_changed", serde_json::json!(false));

            let commit = self
                .bounded(
                    self.store()
                        .commit_transition(updated, record, expected_version),
                )
                .await;
            match commit {
                Ok(()) => {
                    self.cache().invalidate(&instance.id).await;
                    report.breach_recorded += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %instance.id,
                        error = %err,
                        "sweep breach record failed"
                    );
                    report.failures += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            escalated = report.escalated,
            breach_recorded = report.breach_recorded,
            failures = report.failures,
            "SLA sweep finished"
        );
        Ok(report)
    }
}
