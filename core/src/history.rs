//! History run types and comparison-run selection.
//!
//! Selection is a pure function over an in-memory run list so the policy is
//! testable without a database; `store.rs` owns persistence and feeds this.

use crate::funnel::{MetricRow, StatName};
use crate::types::{CheckName, Count, GroupKey, RunId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which prior run to compare against. Offset takes precedence over Window
/// when both are configured (see `HistoryConfig::selector`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Run whose timestamp is nearest to `now − days`, ties broken by the
    /// more recent timestamp.
    Offset { days: i64 },
    /// Most recent run within the last `days` days.
    Window { days: i64 },
    /// Tracking disabled or no selector configured.
    None,
}

/// Identity of one metric value inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub channel: String,
    pub segment: String,
    pub stat: StatName,
    pub check: Option<CheckName>,
}

impl MetricKey {
    pub fn of(row: &MetricRow) -> Self {
        Self {
            channel: row.channel.clone(),
            segment: row.segment.clone(),
            stat: row.stat,
            check: row.check.clone(),
        }
    }
}

/// A persisted snapshot of one prior execution's metrics for one group.
/// Immutable once written; the store is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub offer_code: String,
    pub group_key: GroupKey,
    pub starting_population: Count,
    pub metrics: HashMap<MetricKey, Count>,
}

impl HistoryRun {
    pub fn metric(&self, key: &MetricKey) -> Option<Count> {
        self.metrics.get(key).copied()
    }
}

/// Apply the selector to `runs` (any order) and return the best match.
///
/// Returns `None` when nothing matches — callers degrade to an
/// unavailable comparison, never an error.
pub fn select_run<'a>(
    runs: &'a [HistoryRun],
    selector: Selector,
    now: DateTime<Utc>,
) -> Option<&'a HistoryRun> {
    match selector {
        Selector::None => None,
        Selector::Offset { days } => {
            let target = now - Duration::days(days);
            runs.iter().min_by(|a, b| {
                let da = distance(a.started_at, target);
                let db = distance(b.started_at, target);
                // Smaller distance wins; on a tie the more recent run wins.
                da.cmp(&db)
                    .then_with(|| b.started_at.cmp(&a.started_at))
            })
        }
        Selector::Window { days } => runs
            .iter()
            .filter(|r| {
                let age = now.signed_duration_since(r.started_at);
                age >= Duration::zero() && age <= Duration::days(days)
            })
            .max_by_key(|r| r.started_at),
    }
}

fn distance(ts: DateTime<Utc>, target: DateTime<Utc>) -> Duration {
    let d = ts.signed_duration_since(target);
    if d < Duration::zero() {
        -d
    } else {
        d
    }
}
