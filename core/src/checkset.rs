//! CheckSet resolution — configuration tree to ordered funnel plan.
//!
//! Pure function of configuration, no side effects. All configuration
//! errors (empty segment check lists, name collisions) surface here,
//! before any population query runs.

use crate::config::{ConditionCheck, ConditionsConfig};
use crate::error::{WaterfallError, WfResult};
use crate::types::CheckName;

/// Reserved segment name for baseline-eligibility check lists.
pub const BA_SEGMENT: &str = "BA";
/// Reserved channel name for the main (pre-channel) funnel.
pub const MAIN_CHANNEL: &str = "main";

/// A resolved check: named, ordered, carrying its display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: CheckName,
    pub sql: String,
    pub description: Option<String>,
}

/// One funnel unit: a (channel, segment) pair with its ordered check list.
/// BA units use the reserved segment name `BA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelUnit {
    pub channel: String,
    pub segment: String,
    pub checks: Vec<Check>,
}

impl FunnelUnit {
    pub fn check_names(&self) -> Vec<CheckName> {
        self.checks.iter().map(|c| c.name.clone()).collect()
    }
}

/// A channel's resolved funnel: BA first, then segments in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    pub name: String,
    pub ba: FunnelUnit,
    pub segments: Vec<FunnelUnit>,
}

/// The full resolved plan: main BA, then each channel in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelPlan {
    pub main_ba: FunnelUnit,
    pub channels: Vec<ChannelPlan>,
}

impl FunnelPlan {
    /// Every funnel unit in report order: main BA, then per channel BA
    /// followed by that channel's segments.
    pub fn units(&self) -> Vec<&FunnelUnit> {
        let mut out = vec![&self.main_ba];
        for ch in &self.channels {
            out.push(&ch.ba);
            out.extend(ch.segments.iter());
        }
        out
    }
}

/// Resolve the conditions tree into a `FunnelPlan`.
///
/// Unnamed checks get `{channel}_{segment}_{n}` with a running declaration
/// index across the whole plan, matching the flag-column naming the
/// eligibility collaborator generates.
pub fn resolve(conditions: &ConditionsConfig) -> WfResult<FunnelPlan> {
    let mut counter: usize = 0;

    let main_ba = resolve_unit(MAIN_CHANNEL, BA_SEGMENT, &conditions.main_ba, &mut counter)?;

    let mut channels = Vec::with_capacity(conditions.channels.len());
    for channel in &conditions.channels {
        if channels
            .iter()
            .any(|c: &ChannelPlan| c.name == channel.name)
        {
            return Err(WaterfallError::Config {
                message: format!("duplicate channel '{}'", channel.name),
            });
        }

        let ba = resolve_unit(&channel.name, BA_SEGMENT, &channel.ba, &mut counter)?;

        let mut segments = Vec::with_capacity(channel.segments.len());
        for segment in &channel.segments {
            if segment.name == BA_SEGMENT {
                return Err(WaterfallError::Config {
                    message: format!(
                        "channel '{}' declares a segment named '{BA_SEGMENT}', which is reserved",
                        channel.name
                    ),
                });
            }
            if segments
                .iter()
                .any(|s: &FunnelUnit| s.segment == segment.name)
            {
                return Err(WaterfallError::Config {
                    message: format!(
                        "duplicate segment '{}' in channel '{}'",
                        segment.name, channel.name
                    ),
                });
            }
            if segment.checks.is_empty() {
                return Err(WaterfallError::EmptyCheckSet {
                    channel: channel.name.clone(),
                    segment: segment.name.clone(),
                });
            }
            segments.push(resolve_unit(
                &channel.name,
                &segment.name,
                &segment.checks,
                &mut counter,
            )?);
        }

        channels.push(ChannelPlan {
            name: channel.name.clone(),
            ba,
            segments,
        });
    }

    Ok(FunnelPlan { main_ba, channels })
}

fn resolve_unit(
    channel: &str,
    segment: &str,
    checks: &[ConditionCheck],
    counter: &mut usize,
) -> WfResult<FunnelUnit> {
    let mut resolved: Vec<Check> = Vec::with_capacity(checks.len());
    for check in checks {
        *counter += 1;
        let name = match &check.name {
            Some(n) => n.clone(),
            None => format!("{channel}_{segment}_{counter}"),
        };
        if resolved.iter().any(|c| c.name == name) {
            return Err(WaterfallError::DuplicateCheck {
                channel: channel.to_string(),
                segment: segment.to_string(),
                check: name,
            });
        }
        resolved.push(Check {
            name,
            sql: check.sql.clone(),
            description: check.description.clone(),
        });
    }
    Ok(FunnelUnit {
        channel: channel.to_string(),
        segment: segment.to_string(),
        checks: resolved,
    })
}
