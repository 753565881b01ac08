//! Flag predicate algebra.
//!
//! RULE: No component materializes record sets. Everything that needs a
//! population cardinality builds a `FlagExpr` and hands it to a `FlagSource`
//! for counting. Segmentation exclusions, funnel chains and regain predicates
//! are all expressed here.

use crate::types::CheckName;

/// A boolean predicate over the flag matrix of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagExpr {
    /// Matches every record.
    True,
    /// The named check flag is set.
    Check(CheckName),
    Not(Box<FlagExpr>),
    /// Conjunction. Empty list matches everything.
    All(Vec<FlagExpr>),
    /// Disjunction. Empty list matches nothing.
    Any(Vec<FlagExpr>),
}

impl FlagExpr {
    pub fn check(name: impl Into<CheckName>) -> Self {
        FlagExpr::Check(name.into())
    }

    pub fn not(expr: FlagExpr) -> Self {
        FlagExpr::Not(Box::new(expr))
    }

    /// Conjunction that flattens the trivial cases.
    pub fn all(mut exprs: Vec<FlagExpr>) -> Self {
        exprs.retain(|e| !matches!(e, FlagExpr::True));
        match exprs.len() {
            0 => FlagExpr::True,
            1 => exprs.into_iter().next().unwrap(),
            _ => FlagExpr::All(exprs),
        }
    }

    /// Disjunction over the given check names ("claimed by any" policy).
    pub fn any_check(names: &[CheckName]) -> Self {
        let exprs: Vec<FlagExpr> = names.iter().cloned().map(FlagExpr::Check).collect();
        match exprs.len() {
            1 => exprs.into_iter().next().unwrap(),
            _ => FlagExpr::Any(exprs),
        }
    }

    /// `self AND other`.
    pub fn and(self, other: FlagExpr) -> Self {
        FlagExpr::all(vec![self, other])
    }

    /// Evaluate against a single record. `flag` returns the boolean value of
    /// a named check for that record.
    pub fn eval<F>(&self, flag: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match self {
            FlagExpr::True => true,
            FlagExpr::Check(name) => flag(name),
            FlagExpr::Not(inner) => !inner.eval(flag),
            FlagExpr::All(items) => items.iter().all(|e| e.eval(flag)),
            FlagExpr::Any(items) => items.iter().any(|e| e.eval(flag)),
        }
    }

    /// Every check name referenced by this expression, in first-seen order.
    pub fn referenced_checks(&self) -> Vec<CheckName> {
        let mut out = Vec::new();
        self.collect_checks(&mut out);
        out
    }

    fn collect_checks(&self, out: &mut Vec<CheckName>) {
        match self {
            FlagExpr::True => {}
            FlagExpr::Check(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            FlagExpr::Not(inner) => inner.collect_checks(out),
            FlagExpr::All(items) | FlagExpr::Any(items) => {
                for e in items {
                    e.collect_checks(out);
                }
            }
        }
    }
}
