//! Report assembly — current metrics merged with resolved history.
//!
//! A missing historic value is reported as unavailable (None), which a
//! renderer must keep distinguishable from a genuine zero.

use crate::checkset::FunnelPlan;
use crate::funnel::MetricRow;
use crate::history::{HistoryRun, MetricKey};
use crate::types::{Count, GroupKey, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric with its historical overlay. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub metric: MetricRow,
    pub historic: Option<Count>,
    /// current − historic.
    pub delta: Option<i64>,
    /// delta / historic; undefined when historic is 0 or missing.
    pub pct_change: Option<f64>,
}

/// Descriptive metadata for one check, for the renderer's
/// Criteria/Description columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInfo {
    pub channel: String,
    pub segment: String,
    pub name: String,
    pub sql: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: GroupKey,
    pub starting_population: Count,
    /// Metric rows in report order, with comparison overlay.
    pub rows: Vec<ComparisonRow>,
    /// Identity of the resolved comparison run, when one matched.
    pub historic_run_id: Option<RunId>,
    pub historic_timestamp: Option<DateTime<Utc>>,
}

/// The consolidated cross-group structure, groups in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallReport {
    pub run_id: RunId,
    pub offer_code: String,
    pub campaign_planner: Option<String>,
    pub lead: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub checks: Vec<CheckInfo>,
    pub groups: Vec<GroupReport>,
}

/// Check metadata for the whole plan, in report order.
pub fn plan_check_info(plan: &FunnelPlan) -> Vec<CheckInfo> {
    plan.units()
        .into_iter()
        .flat_map(|unit| {
            unit.checks.iter().map(|c| CheckInfo {
                channel: unit.channel.clone(),
                segment: unit.segment.clone(),
                name: c.name.clone(),
                sql: c.sql.clone(),
                description: c.description.clone(),
            })
        })
        .collect()
}

/// Merge one group's metric rows with its resolved history run.
pub fn assemble_group(
    group: GroupKey,
    starting_population: Count,
    rows: Vec<MetricRow>,
    historic: Option<&HistoryRun>,
) -> GroupReport {
    let rows = rows
        .into_iter()
        .map(|metric| {
            let historic_value = historic.and_then(|run| run.metric(&MetricKey::of(&metric)));
            let delta = historic_value.map(|h| metric.value as i64 - h as i64);
            let pct_change = match (delta, historic_value) {
                (Some(d), Some(h)) if h != 0 => Some(d as f64 / h as f64),
                _ => None,
            };
            ComparisonRow {
                metric,
                historic: historic_value,
                delta,
                pct_change,
            }
        })
        .collect();

    GroupReport {
        group,
        starting_population,
        rows,
        historic_run_id: historic.map(|r| r.run_id.clone()),
        historic_timestamp: historic.map(|r| r.started_at),
    }
}
