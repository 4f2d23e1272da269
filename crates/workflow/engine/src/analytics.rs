//! Read-only analytics over the transition history.
//!
//! Aggregation runs off the transition hot path: it reads the history and
//! an instance snapshot, computes everything in memory, and writes
//! nothing. Dwell times are reconstructed from consecutive successful
//! records per workflow; a workflow still sitting in its last recorded
//! state contributes an open dwell segment closed at the window end.

use chrono::{DateTime, NaiveDate, Utc};
use order_workflow_store::WorkflowStore;
use order_workflow_types::{
    OrderState, TransitionTable, WorkflowError, WorkflowInstanceId, WorkflowResult,
    WorkflowTransition,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ── Report Types ─────────────────────────────────────────────────────

/// How many instances currently sit in one state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateCount {
    pub state: OrderState,
    pub count: usize,
    pub percentage: f64,
}

/// Average observed dwell in one state over the window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDwell {
    pub state: OrderState,
    pub average_secs: f64,
    pub samples: usize,
}

/// A state whose average dwell exceeds its configured maximum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bottleneck {
    pub state: OrderState,
    pub average_secs: f64,
    pub allowed_secs: i64,
    pub excess_secs: f64,
}

/// Successful transitions on one calendar day.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub transitions: usize,
}

/// One aggregation pass over a date window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Instances matching the state filter (all instances when unfiltered)
    pub total_instances: usize,
    /// Current-state distribution, largest first
    pub state_distribution: Vec<StateCount>,
    /// Observed average dwell per state, slowest first
    pub average_time_in_state: Vec<StateDwell>,
    /// Closed dwell segments within their configured maximum, as a rate
    /// in `[0, 1]`; `1.0` when the window has no closed segments
    pub sla_compliance_rate: f64,
    /// States whose average dwell exceeds the configured maximum,
    /// worst first
    pub bottlenecks: Vec<Bottleneck>,
    /// Successful transitions per day
    pub trend: Vec<TrendPoint>,
}

// ── Aggregator ───────────────────────────────────────────────────────

/// Aggregates workflow analytics from the store.
pub struct AnalyticsAggregator {
    store: Arc<dyn WorkflowStore>,
    table: TransitionTable,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn WorkflowStore>, table: TransitionTable) -> Self {
        Self { store, table }
    }

    /// Aggregate over `[start, end)`, optionally restricted to a state set.
    pub async fn aggregate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter_states: Option<&[OrderState]>,
    ) -> WorkflowResult<AnalyticsReport> {
        if start >= end {
            return Err(WorkflowError::InvalidRequest(format!(
                "window start {start} must precede end {end}"
            )));
        }

        let admits =
            |state: OrderState| filter_states.map_or(true, |states| states.contains(&state));

        let records = self.store.transitions_in_window(start, end).await?;
        let instances = self.store.snapshot_instances().await?;

        // Current-state distribution.
        let mut counts: HashMap<OrderState, usize> = HashMap::new();
        let mut total_instances = 0usize;
        for instance in &instances {
            if admits(instance.current_state) {
                *counts.entry(instance.current_state).or_default() += 1;
                total_instances += 1;
            }
        }
        let mut state_distribution: Vec<StateCount> = counts
            .into_iter()
            .map(|(state, count)| StateCount {
                state,
                count,
                percentage: if total_instances == 0 {
                    0.0
                } else {
                    100.0 * count as f64 / total_instances as f64
                },
            })
            .collect();
        state_distribution.sort_by(|a, b| b.count.cmp(&a.count).then(a.state.as_str().cmp(b.state.as_str())));

        // Dwell reconstruction from per-workflow successful records.
        // Flag-only breach records restart no dwell clock and are skipped.
        let mut per_workflow: HashMap<&WorkflowInstanceId, Vec<&WorkflowTransition>> =
            HashMap::new();
        for record in records.iter().filter(|r| Self::restarts_dwell(r)) {
            per_workflow.entry(&record.workflow_id).or_default().push(record);
        }

        let mut dwell_sums: HashMap<OrderState, (f64, usize)> = HashMap::new();
        let mut departures = 0usize;
        let mut compliant = 0usize;
        for list in per_workflow.values() {
            for pair in list.windows(2) {
                let state = pair[0].to_state;
                if state.is_terminal() || !admits(state) {
                    continue;
                }
                let secs = (pair[1].transitioned_at - pair[0].transitioned_at).num_seconds() as f64;
                let entry = dwell_sums.entry(state).or_default();
                entry.0 += secs;
                entry.1 += 1;

                departures += 1;
                let within = self
                    .table
                    .max_dwell(state)
                    .map_or(true, |allowed| secs <= allowed.num_seconds() as f64);
                if within {
                    compliant += 1;
                }
            }
            if let Some(last) = list.last() {
                let state = last.to_state;
                if !state.is_terminal() && admits(state) {
                    let secs = (end - last.transitioned_at).num_seconds().max(0) as f64;
                    let entry = dwell_sums.entry(state).or_default();
                    entry.0 += secs;
                    entry.1 += 1;
                }
            }
        }

        let mut average_time_in_state: Vec<StateDwell> = dwell_sums
            .into_iter()
            .map(|(state, (total, samples))| StateDwell {
                state,
                average_secs: total / samples as f64,
                samples,
            })
            .collect();
        average_time_in_state
            .sort_by(|a, b| b.average_secs.total_cmp(&a.average_secs));

        let sla_compliance_rate = if departures == 0 {
            1.0
        } else {
            compliant as f64 / departures as f64
        };

        let mut bottlenecks: Vec<Bottleneck> = average_time_in_state
            .iter()
            .filter_map(|dwell| {
                let allowed = self.table.max_dwell(dwell.state)?.num_seconds();
                (dwell.average_secs > allowed as f64).then(|| Bottleneck {
                    state: dwell.state,
                    average_secs: dwell.average_secs,
                    allowed_secs: allowed,
                    excess_secs: dwell.average_secs - allowed as f64,
                })
            })
            .collect();
        bottlenecks.sort_by(|a, b| b.excess_secs.total_cmp(&a.excess_secs));

        // Daily trend over successful transitions.
        let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for record in records.iter().filter(|r| r.data.success) {
            *by_day.entry(record.transitioned_at.date_naive()).or_default() += 1;
        }
        let trend = by_day
            .into_iter()
            .map(|(date, transitions)| TrendPoint { date, transitions })
            .collect();

        Ok(AnalyticsReport {
            window_start: start,
            window_end: end,
            total_instances,
            state_distribution,
            average_time_in_state,
            sla_compliance_rate,
            bottlenecks,
            trend,
        })
    }

    /// Whether a record marks entry into its `to_state` (restarting the
    /// dwell clock): successful state changes and escalation self-loops,
    /// but not flag-only breach records.
    fn restarts_dwell(record: &WorkflowTransition) -> bool {
        record.data.success
            && record
                .data
                .extra
                .get("state_changed")
                .and_then(|v| v.as_bool())
                != Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use order_workflow_store::InMemoryWorkflowStore;
    use order_workflow_types::{Action, OrderId, Trigger, WorkflowInstance};

    fn make_record(
        workflow: &WorkflowInstanceId,
        from: OrderState,
        to: OrderState,
        at: DateTime<Utc>,
    ) -> WorkflowTransition {
        let mut record =
            WorkflowTransition::new(workflow.clone(), from, to, Action::Confirm, Trigger::Automatic);
        record.transitioned_at = at;
        record
    }

    fn seed_instance(state: OrderState) -> WorkflowInstance {
        let mut instance = WorkflowInstance::new(
            OrderId::new(format!("order-{}", uuid_like())),
            &TransitionTable::commerce(),
        );
        instance.current_state = state;
        instance
    }

    fn uuid_like() -> String {
        WorkflowInstanceId::generate().0
    }

    fn make_aggregator(store: Arc<InMemoryWorkflowStore>) -> AnalyticsAggregator {
        AnalyticsAggregator::new(store, TransitionTable::commerce())
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let aggregator = make_aggregator(Arc::new(InMemoryWorkflowStore::new()));
        let now = Utc::now();
        let err = aggregator
            .aggregate(now, now - Duration::hours(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
        let err = aggregator.aggregate(now, now, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn empty_window_yields_neutral_report() {
        let aggregator = make_aggregator(Arc::new(InMemoryWorkflowStore::new()));
        let now = Utc::now();
        let report = aggregator
            .aggregate(now - Duration::days(1), now, None)
            .await
            .unwrap();
        assert_eq!(report.total_instances, 0);
        assert!(report.state_distribution.is_empty());
        assert!(report.average_time_in_state.is_empty());
        assert!(report.bottlenecks.is_empty());
        assert!(report.trend.is_empty());
        assert_eq!(report.sla_compliance_rate, 1.0);
    }

    #[tokio::test]
    async fn distribution_counts_and_filters() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        for state in [
            OrderState::Created,
            OrderState::Created,
            OrderState::Preparing,
            OrderState::Completed,
        ] {
            store.create_instance(seed_instance(state)).await.unwrap();
        }
        let aggregator = make_aggregator(store);
        let now = Utc::now();

        let report = aggregator
            .aggregate(now - Duration::days(1), now, None)
            .await
            .unwrap();
        assert_eq!(report.total_instances, 4);
        assert_eq!(report.state_distribution[0].state, OrderState::Created);
        assert_eq!(report.state_distribution[0].count, 2);
        assert_eq!(report.state_distribution[0].percentage, 50.0);

        let filtered = aggregator
            .aggregate(
                now - Duration::days(1),
                now,
                Some(&[OrderState::Preparing]),
            )
            .await
            .unwrap();
        assert_eq!(filtered.total_instances, 1);
        assert_eq!(filtered.state_distribution.len(), 1);
        assert_eq!(filtered.state_distribution[0].percentage, 100.0);
    }

    #[tokio::test]
    async fn dwell_compliance_and_bottlenecks() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let t0 = Utc::now() - Duration::hours(3);
        let end = t0 + Duration::hours(3);

        // Workflow A dwells 2h in PaymentConfirmed (allowed 1h).
        let a = WorkflowInstanceId::generate();
        store
            .append_transition(make_record(&a, OrderState::Created, OrderState::PaymentConfirmed, t0))
            .await
            .unwrap();
        store
            .append_transition(make_record(
                &a,
                OrderState::PaymentConfirmed,
                OrderState::InventoryReserved,
                t0 + Duration::hours(2),
            ))
            .await
            .unwrap();

        // Workflow B dwells 30m there, within the allowance.
        let b = WorkflowInstanceId::generate();
        store
            .append_transition(make_record(&b, OrderState::Created, OrderState::PaymentConfirmed, t0))
            .await
            .unwrap();
        store
            .append_transition(make_record(
                &b,
                OrderState::PaymentConfirmed,
                OrderState::InventoryReserved,
                t0 + Duration::minutes(30),
            ))
            .await
            .unwrap();

        let aggregator = make_aggregator(store);
        let report = aggregator.aggregate(t0 - Duration::hours(1), end, None).await.unwrap();

        // Two closed PaymentConfirmed segments, one over the allowance.
        assert_eq!(report.sla_compliance_rate, 0.5);

        let payment = report
            .average_time_in_state
            .iter()
            .find(|d| d.state == OrderState::PaymentConfirmed)
            .unwrap();
        assert_eq!(payment.samples, 2);
        assert_eq!(payment.average_secs, 4_500.0);

        // Open InventoryReserved segments close at the window end:
        // A sits 1h, B sits 2.5h; the 2h allowance holds on average.
        let reserved = report
            .average_time_in_state
            .iter()
            .find(|d| d.state == OrderState::InventoryReserved)
            .unwrap();
        assert_eq!(reserved.samples, 2);
        assert_eq!(reserved.average_secs, 6_300.0);

        assert_eq!(report.bottlenecks.len(), 1);
        assert_eq!(report.bottlenecks[0].state, OrderState::PaymentConfirmed);
        assert_eq!(report.bottlenecks[0].allowed_secs, 3_600);
        assert_eq!(report.bottlenecks[0].excess_secs, 900.0);
    }

    #[tokio::test]
    async fn failed_and_flag_only_records_do_not_skew_dwell() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let t0 = Utc::now() - Duration::hours(3);
        let end = t0 + Duration::hours(3);

        let a = WorkflowInstanceId::generate();
        store
            .append_transition(make_record(&a, OrderState::Created, OrderState::PaymentConfirmed, t0))
            .await
            .unwrap();
        // A rejected attempt and a flag-only breach record in between.
        store
            .append_transition(
                make_record(&a, OrderState::PaymentConfirmed, OrderState::PaymentConfirmed, t0 + Duration::minutes(40))
                    .failed("action Ship is not valid in state PaymentConfirmed"),
            )
            .await
            .unwrap();
        store
            .append_transition(
                make_record(&a, OrderState::PaymentConfirmed, OrderState::PaymentConfirmed, t0 + Duration::minutes(50))
                    .with_extra("state_changed", serde_json::json!(false)),
            )
            .await
            .unwrap();
        store
            .append_transition(make_record(
                &a,
                OrderState::PaymentConfirmed,
                OrderState::InventoryReserved,
                t0 + Duration::hours(2),
            ))
            .await
            .unwrap();

        let aggregator = make_aggregator(store);
        let report = aggregator.aggregate(t0 - Duration::hours(1), end, None).await.unwrap();

        // Still one 2h PaymentConfirmed segment, still non-compliant.
        let payment = report
            .average_time_in_state
            .iter()
            .find(|d| d.state == OrderState::PaymentConfirmed)
            .unwrap();
        assert_eq!(payment.samples, 1);
        assert_eq!(payment.average_secs, 7_200.0);
        assert_eq!(report.sla_compliance_rate, 0.0);
    }

    #[tokio::test]
    async fn trend_counts_successful_transitions_per_day() {
        use chrono::TimeZone;

        let store = Arc::new(InMemoryWorkflowStore::new());
        let day_one = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let day_two = day_one + Duration::days(1);

        let a = WorkflowInstanceId::generate();
        store
            .append_transition(make_record(&a, OrderState::Created, OrderState::PaymentConfirmed, day_one))
            .await
            .unwrap();
        store
            .append_transition(make_record(
                &a,
                OrderState::PaymentConfirmed,
                OrderState::InventoryReserved,
                day_one + Duration::hours(1),
            ))
            .await
            .unwrap();
        store
            .append_transition(make_record(
                &a,
                OrderState::InventoryReserved,
                OrderState::Preparing,
                day_two,
            ))
            .await
            .unwrap();
        // Failed attempts are not progress.
        store
            .append_transition(
                make_record(&a, OrderState::Preparing, OrderState::Preparing, day_two)
                    .failed("action Complete is not valid in state Preparing"),
            )
            .await
            .unwrap();

        let aggregator = make_aggregator(store);
        let report = aggregator
            .aggregate(day_one - Duration::hours(1), day_two + Duration::hours(2), None)
            .await
            .unwrap();

        assert_eq!(report.trend.len(), 2);
        assert_eq!(report.trend[0].date, day_one.date_naive());
        assert_eq!(report.trend[0].transitions, 2);
        assert_eq!(report.trend[1].transitions, 1);
    }
}
