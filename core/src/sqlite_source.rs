//! SQLite-backed flag source.
//!
//! RULE: Only this module runs SQL against the eligibility database. The
//! flag matrix lives in one table with identifier columns plus one 0/1
//! column per check; counting collapses it per group key with `MAX(flag)`
//! and answers a whole expression batch in a single SELECT of
//! `SUM(CASE WHEN … THEN 1 ELSE 0 END)` columns.

use crate::config::Group;
use crate::error::{WaterfallError, WfResult};
use crate::expr::FlagExpr;
use crate::source::FlagSource;
use crate::types::{CheckName, Count};
use rusqlite::Connection;

pub struct SqliteSource {
    conn: Connection,
    table: String,
}

impl SqliteSource {
    /// Open the eligibility database at `path`, reading flags from `table`.
    pub fn open(path: &str, table: &str) -> WfResult<Self> {
        valid_ident(table)?;
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// In-memory source (used in tests).
    pub fn in_memory(table: &str) -> WfResult<Self> {
        valid_ident(table)?;
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// Create the flag table. Fixture helper for tests and for collaborators
    /// that stage a matrix locally.
    pub fn create_table(&self, key_columns: &[&str], check_columns: &[&str]) -> WfResult<()> {
        for col in key_columns.iter().chain(check_columns) {
            valid_ident(col)?;
        }
        let mut cols: Vec<String> = key_columns
            .iter()
            .map(|c| format!("{c} TEXT NOT NULL"))
            .collect();
        cols.extend(
            check_columns
                .iter()
                .map(|c| format!("{c} INTEGER NOT NULL DEFAULT 0")),
        );
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.table,
            cols.join(", ")
        ))?;
        Ok(())
    }

    /// Insert one record row. `flags` pairs check column names with values.
    pub fn insert_record(&self, keys: &[(&str, &str)], flags: &[(&str, bool)]) -> WfResult<()> {
        for (col, _) in keys.iter() {
            valid_ident(col)?;
        }
        for (col, _) in flags.iter() {
            valid_ident(col)?;
        }
        let columns: Vec<&str> = keys
            .iter()
            .map(|(c, _)| *c)
            .chain(flags.iter().map(|(c, _)| *c))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(columns.len());
        for (_, v) in keys {
            params.push(Box::new(v.to_string()));
        }
        for (_, v) in flags {
            params.push(Box::new(if *v { 1i64 } else { 0i64 }));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        self.conn.execute(&sql, param_refs.as_slice())?;
        Ok(())
    }

    /// The grouped subquery: one row per group key, MAX per check flag.
    fn grouped_subquery(&self, group: &Group, checks: &[CheckName]) -> WfResult<String> {
        for col in &group.columns {
            valid_ident(col)?;
        }
        for check in checks {
            valid_ident(check)?;
        }
        if group.columns.is_empty() {
            return Err(WaterfallError::DataAccess {
                group: group.name.clone(),
                message: "group has no key columns".into(),
            });
        }
        let keys = group.columns.join(", ");
        let mut select = vec![keys.clone()];
        select.extend(checks.iter().map(|c| format!("MAX({c}) AS {c}")));
        Ok(format!(
            "SELECT {} FROM {} GROUP BY {}",
            select.join(", "),
            self.table,
            keys
        ))
    }
}

impl FlagSource for SqliteSource {
    fn name(&self) -> &str {
        &self.table
    }

    fn count(&self, group: &Group, expr: &FlagExpr) -> WfResult<Count> {
        Ok(self.count_many(group, std::slice::from_ref(expr))?[0])
    }

    fn count_many(&self, group: &Group, exprs: &[FlagExpr]) -> WfResult<Vec<Count>> {
        if exprs.is_empty() {
            return Ok(Vec::new());
        }
        let mut checks: Vec<CheckName> = Vec::new();
        for expr in exprs {
            for check in expr.referenced_checks() {
                if !checks.contains(&check) {
                    checks.push(check);
                }
            }
        }

        let sums: Vec<String> = exprs
            .iter()
            .map(|e| format!("SUM(CASE WHEN {} THEN 1 ELSE 0 END)", render_expr(e)))
            .collect();
        let sql = format!(
            "SELECT {} FROM ({}) f",
            sums.join(", "),
            self.grouped_subquery(group, &checks)?
        );
        log::debug!("group={} waterfall count SQL: {sql}", group.name);

        let mut stmt = self.conn.prepare(&sql)?;
        let counts = stmt.query_row([], |row| {
            let mut out = Vec::with_capacity(exprs.len());
            for i in 0..exprs.len() {
                // SUM over zero rows yields NULL; empty population counts 0.
                out.push(row.get::<_, Option<i64>>(i)?.unwrap_or(0));
            }
            Ok(out)
        })?;
        Ok(counts.into_iter().map(|c| c.max(0) as u64).collect())
    }
}

fn render_expr(expr: &FlagExpr) -> String {
    match expr {
        FlagExpr::True => "1=1".to_string(),
        FlagExpr::Check(name) => format!("f.{name} = 1"),
        FlagExpr::Not(inner) => format!("NOT ({})", render_expr(inner)),
        FlagExpr::All(items) => {
            if items.is_empty() {
                "1=1".to_string()
            } else {
                let parts: Vec<String> = items.iter().map(render_expr).collect();
                format!("({})", parts.join(" AND "))
            }
        }
        FlagExpr::Any(items) => {
            if items.is_empty() {
                "1=0".to_string()
            } else {
                let parts: Vec<String> = items.iter().map(render_expr).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

/// Reject identifiers that cannot be interpolated into generated SQL.
fn valid_ident(name: &str) -> WfResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap_or('0').is_ascii_digit();
    if ok {
        Ok(())
    } else {
        Err(WaterfallError::Config {
            message: format!("'{name}' is not a valid SQL identifier"),
        })
    }
}
