//! SQLite persistence for history runs.
//!
//! RULE: Only store.rs touches the history database. The store is
//! append-only: runs are written once after a group's metrics complete and
//! are never mutated or deleted. Durability comes from file-backed SQLite;
//! `in_memory()` exists for tests only.

use crate::error::{WaterfallError, WfResult};
use crate::funnel::StatName;
use crate::history::{select_run, HistoryRun, MetricKey, Selector};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the history database at `path`.
    pub fn open(path: &str) -> WfResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance on real files.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> WfResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> WfResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_history.sql"))?;
        Ok(())
    }

    /// Append one run snapshot. Run and metric rows commit atomically.
    pub fn record_run(&self, run: &HistoryRun) -> WfResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO history_run
                 (run_id, offer_code, group_key, started_at, starting_population)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.offer_code,
                run.group_key,
                run.started_at.to_rfc3339(),
                run.starting_population as i64,
            ],
        )?;

        // Stable write order keeps the store byte-comparable across
        // identical runs.
        let mut keys: Vec<&MetricKey> = run.metrics.keys().collect();
        keys.sort_by_key(|k| {
            (
                k.channel.clone(),
                k.segment.clone(),
                k.check.clone(),
                k.stat.as_str(),
            )
        });
        for key in keys {
            tx.execute(
                "INSERT INTO history_metric
                     (run_id, group_key, channel, segment, stat_name, check_name, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.run_id,
                    run.group_key,
                    key.channel,
                    key.segment,
                    key.stat.as_str(),
                    key.check.as_deref(),
                    run.metrics[key] as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All runs recorded for (offer, group), metrics included, oldest first.
    pub fn runs_for(&self, offer_code: &str, group_key: &str) -> WfResult<Vec<HistoryRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, offer_code, group_key, started_at, starting_population
             FROM history_run
             WHERE offer_code = ?1 AND group_key = ?2
             ORDER BY started_at ASC",
        )?;
        let headers = stmt
            .query_map(params![offer_code, group_key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut runs = Vec::with_capacity(headers.len());
        for (run_id, offer, group, started_at, pop) in headers {
            let metrics = self.load_metrics(&run_id, &group)?;
            runs.push(HistoryRun {
                run_id,
                offer_code: offer,
                group_key: group,
                started_at: parse_timestamp(&started_at)?,
                starting_population: pop as u64,
                metrics,
            });
        }
        Ok(runs)
    }

    /// Runs for (offer, group) with `from <= started_at <= to`.
    pub fn runs_in_range(
        &self,
        offer_code: &str,
        group_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> WfResult<Vec<HistoryRun>> {
        let runs = self.runs_for(offer_code, group_key)?;
        Ok(runs
            .into_iter()
            .filter(|r| r.started_at >= from && r.started_at <= to)
            .collect())
    }

    /// Resolve the comparison run for (offer, group) under `selector`.
    /// `Ok(None)` is the graceful "no match" state, never an error.
    pub fn resolve(
        &self,
        offer_code: &str,
        group_key: &str,
        selector: Selector,
        now: DateTime<Utc>,
    ) -> WfResult<Option<HistoryRun>> {
        if matches!(selector, Selector::None) {
            return Ok(None);
        }
        let runs = self.runs_for(offer_code, group_key)?;
        Ok(select_run(&runs, selector, now).cloned())
    }

    fn load_metrics(&self, run_id: &str, group_key: &str) -> WfResult<HashMap<MetricKey, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT channel, segment, stat_name, check_name, value
             FROM history_metric
             WHERE run_id = ?1 AND group_key = ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, group_key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut metrics = HashMap::with_capacity(rows.len());
        for (channel, segment, stat_name, check, value) in rows {
            let stat = StatName::parse(&stat_name).ok_or_else(|| WaterfallError::Config {
                message: format!("unknown stat_name '{stat_name}' in history run '{run_id}'"),
            })?;
            metrics.insert(
                MetricKey {
                    channel,
                    segment,
                    stat,
                    check,
                },
                value as u64,
            );
        }
        Ok(metrics)
    }
}

fn parse_timestamp(raw: &str) -> WfResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WaterfallError::Config {
            message: format!("invalid history timestamp '{raw}': {e}"),
        })
}
