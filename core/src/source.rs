//! Flag-matrix access.
//!
//! `FlagSource` is the seam to the eligibility collaborator: population
//! cardinality and boolean aggregation per group, never materialized
//! records. `FlagMatrix` is the in-memory implementation used by tests and
//! small runs; `sqlite_source.rs` provides the database-backed one.

use crate::config::Group;
use crate::error::{WaterfallError, WfResult};
use crate::expr::FlagExpr;
use crate::types::{CheckName, Count};
use std::collections::BTreeMap;

/// Read-only access to one flag matrix.
///
/// A single shared source is used sequentially across groups; the engine
/// never assumes a source is thread-safe.
pub trait FlagSource {
    /// Identifier for error messages and logs.
    fn name(&self) -> &str;

    /// Count of records in the group-collapsed population matching `expr`.
    fn count(&self, group: &Group, expr: &FlagExpr) -> WfResult<Count>;

    /// Batched counting. Backends that can answer a whole batch in one
    /// round-trip override this.
    fn count_many(&self, group: &Group, exprs: &[FlagExpr]) -> WfResult<Vec<Count>> {
        exprs.iter().map(|e| self.count(group, e)).collect()
    }

    /// Cardinality of the group-collapsed population.
    fn population(&self, group: &Group) -> WfResult<Count> {
        self.count(group, &FlagExpr::True)
    }
}

/// In-memory flag matrix: one row per record, one boolean per check.
///
/// Counting collapses rows by the group's key columns with a boolean OR per
/// check (a record passes a check if any of its rows does), the same
/// aggregation the SQL backend expresses as `MAX(flag) GROUP BY key`.
#[derive(Debug, Clone)]
pub struct FlagMatrix {
    name: String,
    key_columns: Vec<String>,
    check_columns: Vec<CheckName>,
    rows: Vec<(Vec<String>, Vec<bool>)>,
}

impl FlagMatrix {
    pub fn new(
        name: impl Into<String>,
        key_columns: Vec<String>,
        check_columns: Vec<CheckName>,
    ) -> Self {
        Self {
            name: name.into(),
            key_columns,
            check_columns,
            rows: Vec::new(),
        }
    }

    /// Append one record. `true_checks` lists the checks this record passes;
    /// every other check is false.
    pub fn add_record(&mut self, keys: &[&str], true_checks: &[&str]) -> WfResult<()> {
        if keys.len() != self.key_columns.len() {
            return Err(WaterfallError::DataAccess {
                group: self.key_columns.join("_"),
                message: format!(
                    "record has {} key values, matrix has {} key columns",
                    keys.len(),
                    self.key_columns.len()
                ),
            });
        }
        let mut flags = vec![false; self.check_columns.len()];
        for check in true_checks {
            let idx = self.check_index(check)?;
            flags[idx] = true;
        }
        self.rows
            .push((keys.iter().map(|k| k.to_string()).collect(), flags));
        Ok(())
    }

    fn check_index(&self, check: &str) -> WfResult<usize> {
        self.check_columns
            .iter()
            .position(|c| c == check)
            .ok_or_else(|| WaterfallError::UnknownCheck {
                source_name: self.name.clone(),
                check: check.to_string(),
            })
    }

    fn key_indexes(&self, group: &Group) -> WfResult<Vec<usize>> {
        group
            .columns
            .iter()
            .map(|col| {
                self.key_columns
                    .iter()
                    .position(|k| k == col)
                    .ok_or_else(|| WaterfallError::DataAccess {
                        group: group.name.clone(),
                        message: format!("group column '{col}' not present in flag matrix"),
                    })
            })
            .collect()
    }

    /// Collapse rows into one entity per group key, OR-merging check flags.
    fn collapse(&self, group: &Group) -> WfResult<Vec<Vec<bool>>> {
        let key_idx = self.key_indexes(group)?;
        let mut entities: BTreeMap<Vec<&str>, Vec<bool>> = BTreeMap::new();
        for (keys, flags) in &self.rows {
            let entity_key: Vec<&str> = key_idx.iter().map(|&i| keys[i].as_str()).collect();
            match entities.get_mut(&entity_key) {
                Some(merged) => {
                    for (m, f) in merged.iter_mut().zip(flags) {
                        *m = *m || *f;
                    }
                }
                None => {
                    entities.insert(entity_key, flags.clone());
                }
            }
        }
        Ok(entities.into_values().collect())
    }

    fn validate_expr(&self, expr: &FlagExpr) -> WfResult<()> {
        for check in expr.referenced_checks() {
            self.check_index(&check)?;
        }
        Ok(())
    }
}

impl FlagSource for FlagMatrix {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, group: &Group, expr: &FlagExpr) -> WfResult<Count> {
        Ok(self.count_many(group, std::slice::from_ref(expr))?[0])
    }

    fn count_many(&self, group: &Group, exprs: &[FlagExpr]) -> WfResult<Vec<Count>> {
        for expr in exprs {
            self.validate_expr(expr)?;
        }
        let entities = self.collapse(group)?;
        let mut counts = vec![0u64; exprs.len()];
        for flags in &entities {
            let flag = |name: &str| {
                // validated above, lookup cannot fail
                self.check_columns
                    .iter()
                    .position(|c| c == name)
                    .map(|i| flags[i])
                    .unwrap_or(false)
            };
            for (i, expr) in exprs.iter().enumerate() {
                if expr.eval(&flag) {
                    counts[i] += 1;
                }
            }
        }
        Ok(counts)
    }
}
