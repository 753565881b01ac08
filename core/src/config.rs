//! Campaign configuration models and loading.
//!
//! Configuration is JSON on disk. Declaration order is significant
//! everywhere: channels, segments and checks are Vecs, never maps, because
//! the funnel math is order-sensitive.

use crate::error::{WaterfallError, WfResult};
use crate::history::Selector;
use serde::{Deserialize, Serialize};

/// One named boolean test. `sql` is the raw predicate text the eligibility
/// collaborator used to compute the flag; the engine only carries it through
/// to the report for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionCheck {
    /// Flag-column name. When omitted the resolver auto-names the check
    /// `{channel}_{segment}_{index}`.
    #[serde(default)]
    pub name: Option<String>,
    pub sql: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named segment's ordered check list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConditions {
    pub name: String,
    pub checks: Vec<ConditionCheck>,
}

/// One channel: its BA checks plus zero or more segments in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConditions {
    pub name: String,
    pub ba: Vec<ConditionCheck>,
    #[serde(default)]
    pub segments: Vec<SegmentConditions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionsConfig {
    /// Main BA checks, applied before any channel.
    pub main_ba: Vec<ConditionCheck>,
    pub channels: Vec<ChannelConditions>,
}

/// One count-columns entry: a single identifier column or a composite tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Single(String),
    Composite(Vec<String>),
}

impl ColumnSpec {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            ColumnSpec::Single(c) => vec![c.as_str()],
            ColumnSpec::Composite(cols) => cols.iter().map(String::as_str).collect(),
        }
    }
}

/// An independent unit of computation: one grouping of identifier columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Display name, alias-stripped columns joined with `_`.
    pub name: String,
    /// Alias-stripped column names, in declared order.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Name of the flag-matrix table the eligibility collaborator produced.
    pub eligibility_table: String,
    pub conditions: ConditionsConfig,
    /// All identifier columns present on the eligibility table
    /// (optionally alias-qualified, e.g. `t.party_id`).
    pub unique_identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallConfig {
    pub output_directory: String,
    pub count_columns: Vec<ColumnSpec>,
}

impl WaterfallConfig {
    /// Grouping definitions in declared order.
    pub fn groups(&self) -> Vec<Group> {
        self.count_columns
            .iter()
            .map(|spec| {
                let columns: Vec<String> =
                    spec.columns().iter().map(|c| strip_alias(c)).collect();
                Group {
                    name: columns.join("_"),
                    columns,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Path to the history SQLite database.
    #[serde(default)]
    pub store_path: Option<String>,
    /// "Compare at offset N days": nearest run to now − N days.
    #[serde(default)]
    pub compare_offset_days: Option<i64>,
    /// "Recent window N days": most recent run within the last N days.
    #[serde(default)]
    pub recent_window_days: Option<i64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            store_path: None,
            compare_offset_days: None,
            recent_window_days: None,
        }
    }
}

impl HistoryConfig {
    /// Selector with the documented precedence: offset wins over window.
    pub fn selector(&self) -> Selector {
        match (self.compare_offset_days, self.recent_window_days) {
            (Some(days), _) => Selector::Offset { days },
            (None, Some(days)) => Selector::Window { days },
            (None, None) => Selector::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub offer_code: String,
    #[serde(default)]
    pub campaign_planner: Option<String>,
    #[serde(default)]
    pub lead: Option<String>,
    pub eligibility: EligibilityConfig,
    pub waterfall: WaterfallConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-section validation, raised before any computation.
    pub fn validate(&self) -> WfResult<()> {
        let valid_ids: Vec<String> = self
            .eligibility
            .unique_identifiers
            .iter()
            .map(|c| strip_alias(c))
            .collect();

        for group in self.waterfall.groups() {
            for col in &group.columns {
                if !valid_ids.contains(col) {
                    return Err(WaterfallError::Config {
                        message: format!(
                            "waterfall count_columns entry '{}' uses column '{col}' \
                             which is not in eligibility unique_identifiers {valid_ids:?}",
                            group.name
                        ),
                    });
                }
            }
        }

        if self.history.enabled && self.history.store_path.is_none() {
            return Err(WaterfallError::Config {
                message: "history.enabled is true but history.store_path is not set".into(),
            });
        }

        Ok(())
    }
}

/// `t.party_id` → `party_id`. Columns without an alias pass through.
pub fn strip_alias(column: &str) -> String {
    column.rsplit('.').next().unwrap_or(column).to_string()
}
