//! Funnel calculator — the five statistics per check.
//!
//! All statistics are counts over the unit's claimed population:
//!   unique_drops       fails this check, regardless of the others
//!   incremental_drops  survived every prior check in the chain, fails here
//!   remaining          passes the full chain up to and including this check
//!   cumulative_drops   claimed − remaining (derived, monotonic)
//!   regain             fails only this check, net of later-segment claims
//!
//! `remaining` carries a chained AND across the entire preceding check
//! chain, not just the immediately prior check. Counting is batched through
//! `FlagSource::count_many` so a SQL backend answers one unit per query.

use crate::checkset::BA_SEGMENT;
use crate::config::Group;
use crate::error::{WaterfallError, WfResult};
use crate::expr::FlagExpr;
use crate::segmentation::UnitPopulation;
use crate::source::FlagSource;
use crate::types::{CheckName, Count, GroupKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatName {
    RecordsClaimed,
    UniqueDrops,
    IncrementalDrops,
    Remaining,
    CumulativeDrops,
    Regain,
}

impl StatName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatName::RecordsClaimed => "records_claimed",
            StatName::UniqueDrops => "unique_drops",
            StatName::IncrementalDrops => "incremental_drops",
            StatName::Remaining => "remaining",
            StatName::CumulativeDrops => "cumulative_drops",
            StatName::Regain => "regain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "records_claimed" => Some(StatName::RecordsClaimed),
            "unique_drops" => Some(StatName::UniqueDrops),
            "incremental_drops" => Some(StatName::IncrementalDrops),
            "remaining" => Some(StatName::Remaining),
            "cumulative_drops" => Some(StatName::CumulativeDrops),
            "regain" => Some(StatName::Regain),
            _ => None,
        }
    }
}

/// One computed statistic. Produced fresh each run, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow {
    pub group: GroupKey,
    pub channel: String,
    pub segment: String,
    pub stat: StatName,
    /// None for the unit-level `records_claimed` row.
    pub check: Option<CheckName>,
    pub value: Count,
}

/// Compute all metric rows for one funnel unit.
///
/// Emits `records_claimed` first (check = None), then per check in declared
/// order: unique, incremental, remaining, cumulative, regain.
pub fn unit_metrics(
    source: &dyn FlagSource,
    group: &Group,
    pop: &UnitPopulation<'_>,
) -> WfResult<Vec<MetricRow>> {
    let unit = pop.unit;
    if unit.checks.is_empty() && unit.segment != BA_SEGMENT {
        // The resolver guarantees this never happens; treat it as fatal
        // rather than silently emitting an empty funnel.
        return Err(WaterfallError::EmptyCheckSet {
            channel: unit.channel.clone(),
            segment: unit.segment.clone(),
        });
    }

    let names = unit.check_names();
    let checks: Vec<FlagExpr> = names.iter().cloned().map(FlagExpr::Check).collect();

    // Records not claimed by any lower-priority segment.
    let no_later_claim: Vec<FlagExpr> = pop
        .later_segment_claims
        .iter()
        .cloned()
        .map(FlagExpr::not)
        .collect();

    // Batch layout: claimed, then [unique, incremental, remaining, regain]
    // per check. cumulative is derived afterwards.
    let mut exprs: Vec<FlagExpr> = vec![pop.claimed.clone()];
    for (k, check) in checks.iter().enumerate() {
        let fails = FlagExpr::not(check.clone());

        // unique_drops
        exprs.push(pop.claimed.clone().and(fails.clone()));

        // incremental_drops: survived the full prior chain, fails here.
        let mut prior: Vec<FlagExpr> = vec![pop.claimed.clone()];
        prior.extend(checks[..k].iter().cloned());
        prior.push(fails.clone());
        exprs.push(FlagExpr::all(prior));

        // remaining: passes the chain through this check.
        let mut chain: Vec<FlagExpr> = vec![pop.claimed.clone()];
        chain.extend(checks[..=k].iter().cloned());
        exprs.push(FlagExpr::all(chain));

        // regain: fails exactly this check, and no later segment claims it.
        let mut only_this: Vec<FlagExpr> = vec![pop.claimed.clone(), fails];
        only_this.extend(
            checks
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != k)
                .map(|(_, c)| c.clone()),
        );
        only_this.extend(no_later_claim.iter().cloned());
        exprs.push(FlagExpr::all(only_this));
    }

    let counts = source.count_many(group, &exprs)?;
    let claimed = counts[0];

    let mut rows = Vec::with_capacity(1 + names.len() * 5);
    rows.push(MetricRow {
        group: group.name.clone(),
        channel: unit.channel.clone(),
        segment: unit.segment.clone(),
        stat: StatName::RecordsClaimed,
        check: None,
        value: claimed,
    });

    for (k, name) in names.iter().enumerate() {
        let base = 1 + k * 4;
        let unique = counts[base];
        let incremental = counts[base + 1];
        let remaining = counts[base + 2];
        let regain = counts[base + 3];
        let cumulative = claimed - remaining;

        let mut push = |stat: StatName, value: Count| {
            rows.push(MetricRow {
                group: group.name.clone(),
                channel: unit.channel.clone(),
                segment: unit.segment.clone(),
                stat,
                check: Some(name.clone()),
                value,
            });
        };
        push(StatName::UniqueDrops, unique);
        push(StatName::IncrementalDrops, incremental);
        push(StatName::Remaining, remaining);
        push(StatName::CumulativeDrops, cumulative);
        push(StatName::Regain, regain);
    }

    log::debug!(
        "group={} channel={} segment={} claimed={} checks={}",
        group.name,
        unit.channel,
        unit.segment,
        claimed,
        names.len(),
    );

    Ok(rows)
}
