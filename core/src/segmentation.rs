//! Segmentation engine — ordered, mutually-exclusive claimed populations.
//!
//! Segments within a channel are processed in declared order. Each named
//! segment excludes every record already claimed by an earlier named segment
//! ("claim by any": a record is claimed when ANY of that segment's check
//! flags is set). A non-last segment claims the any-flagged records inside
//! its residual base; the last segment claims the entire residual, so the
//! claimed sets partition the BA-passing population and their counts never
//! sum past it. BA units form the base and never claim; a channel with a
//! single segment therefore has an empty exclusion set and claims the base
//! unchanged.

use crate::checkset::{ChannelPlan, FunnelPlan, FunnelUnit};
use crate::expr::FlagExpr;

/// One funnel unit with its claimed-population predicate resolved.
#[derive(Debug, Clone)]
pub struct UnitPopulation<'a> {
    pub unit: &'a FunnelUnit,
    /// Predicate selecting the unit's claimed population.
    pub claimed: FlagExpr,
    /// Claim predicates of lower-priority (later) segments in the same
    /// channel, used by the regain statistic.
    pub later_segment_claims: Vec<FlagExpr>,
}

/// Predicate for "passes every check in this unit", chained in order.
pub fn pass_all(unit: &FunnelUnit) -> FlagExpr {
    FlagExpr::all(unit.check_names().into_iter().map(FlagExpr::Check).collect())
}

/// Predicate for "claimed by this segment" under the claim-by-any policy.
pub fn claim_any(unit: &FunnelUnit) -> FlagExpr {
    FlagExpr::any_check(&unit.check_names())
}

/// Resolve claimed populations for every unit in the plan, in report order.
pub fn plan_populations(plan: &FunnelPlan) -> Vec<UnitPopulation<'_>> {
    let mut out = Vec::new();

    // Main BA funnels over the entire record population.
    out.push(UnitPopulation {
        unit: &plan.main_ba,
        claimed: FlagExpr::True,
        later_segment_claims: Vec::new(),
    });

    let main_pass = pass_all(&plan.main_ba);
    for channel in &plan.channels {
        out.extend(channel_populations(&main_pass, channel));
    }
    out
}

/// Claimed populations for one channel: BA first, then segments with the
/// accumulated exclusion threaded through the declared order.
pub fn channel_populations<'a>(
    main_pass: &FlagExpr,
    channel: &'a ChannelPlan,
) -> Vec<UnitPopulation<'a>> {
    let mut out = Vec::new();

    // Channel BA: base is the main-BA-passing population.
    out.push(UnitPopulation {
        unit: &channel.ba,
        claimed: main_pass.clone(),
        later_segment_claims: Vec::new(),
    });

    // Base for every named segment: main BA and channel BA both pass.
    let base = main_pass.clone().and(pass_all(&channel.ba));

    let claims: Vec<FlagExpr> = channel.segments.iter().map(claim_any).collect();

    let last_rank = channel.segments.len().saturating_sub(1);
    let mut exclusion: Vec<FlagExpr> = Vec::new();
    for (rank, segment) in channel.segments.iter().enumerate() {
        let mut parts = vec![base.clone()];
        parts.extend(exclusion.iter().cloned());
        // Non-last segments claim only the records any of their own checks
        // flag; the last segment claims the entire residual base.
        if rank < last_rank {
            parts.push(claims[rank].clone());
        }
        let claimed = FlagExpr::all(parts);

        out.push(UnitPopulation {
            unit: segment,
            claimed,
            later_segment_claims: claims[rank + 1..].to_vec(),
        });

        exclusion.push(FlagExpr::not(claims[rank].clone()));
    }
    out
}
