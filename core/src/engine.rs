//! The waterfall engine — orchestration across groups.
//!
//! RULES:
//!   - Configuration errors surface before any population query runs.
//!   - Groups compute sequentially, in declaration order, over one shared
//!     flag source. The engine never assumes the source is thread-safe.
//!   - Any data-access failure aborts the whole run; a partial waterfall
//!     report is worse than no report.
//!   - History resolution never aborts: no match degrades to unavailable
//!     comparison fields.
//!   - The current run is recorded to history only after its own metrics
//!     complete, and always after resolution, so a run never compares
//!     against itself.

use crate::checkset::{self, FunnelPlan};
use crate::config::AppConfig;
use crate::error::{WaterfallError, WfResult};
use crate::funnel::{self, MetricRow};
use crate::history::{HistoryRun, MetricKey};
use crate::report::{self, WaterfallReport};
use crate::segmentation;
use crate::source::FlagSource;
use crate::store::HistoryStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub struct WaterfallEngine<'a> {
    config: &'a AppConfig,
    source: &'a dyn FlagSource,
    history: Option<&'a HistoryStore>,
}

impl<'a> WaterfallEngine<'a> {
    pub fn new(
        config: &'a AppConfig,
        source: &'a dyn FlagSource,
        history: Option<&'a HistoryStore>,
    ) -> Self {
        Self {
            config,
            source,
            history,
        }
    }

    /// Resolve the plan only — configuration validation without touching
    /// the flag source.
    pub fn plan(&self) -> WfResult<FunnelPlan> {
        self.config.validate()?;
        checkset::resolve(&self.config.eligibility.conditions)
    }

    /// Execute the full waterfall run at `now`.
    pub fn run(&self, now: DateTime<Utc>) -> WfResult<WaterfallReport> {
        let plan = self.plan()?;
        let tracking = self.config.history.enabled;
        if tracking && self.history.is_none() {
            return Err(WaterfallError::Config {
                message: "history tracking is enabled but no history store was provided".into(),
            });
        }

        let populations = segmentation::plan_populations(&plan);
        let selector = self.config.history.selector();
        let run_id = uuid::Uuid::new_v4().to_string();
        let offer = &self.config.offer_code;

        let mut groups = Vec::new();
        for group in self.config.waterfall.groups() {
            let starting_population = self.source.population(&group)?;
            log::info!(
                "group={} starting_population={starting_population}",
                group.name
            );
            if starting_population == 0 {
                log::warn!("group={} has an empty base population", group.name);
            }

            let mut rows: Vec<MetricRow> = Vec::new();
            for pop in &populations {
                rows.extend(funnel::unit_metrics(self.source, &group, pop)?);
            }

            let historic = match self.history {
                Some(store) if tracking => {
                    let resolved = store.resolve(offer, &group.name, selector, now)?;
                    if resolved.is_none() {
                        log::warn!(
                            "group={} no history run matched selector {selector:?}",
                            group.name
                        );
                    }
                    resolved
                }
                _ => None,
            };

            if tracking {
                let metrics: HashMap<MetricKey, u64> = rows
                    .iter()
                    .map(|r| (MetricKey::of(r), r.value))
                    .collect();
                // expect checked above; tracking implies a store.
                if let Some(store) = self.history {
                    store.record_run(&HistoryRun {
                        run_id: run_id.clone(),
                        started_at: now,
                        offer_code: offer.clone(),
                        group_key: group.name.clone(),
                        starting_population,
                        metrics,
                    })?;
                }
            }

            groups.push(report::assemble_group(
                group.name.clone(),
                starting_population,
                rows,
                historic.as_ref(),
            ));
        }

        Ok(WaterfallReport {
            run_id,
            offer_code: offer.clone(),
            campaign_planner: self.config.campaign_planner.clone(),
            lead: self.config.lead.clone(),
            generated_at: now,
            checks: report::plan_check_info(&plan),
            groups,
        })
    }
}
