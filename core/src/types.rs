//! Shared primitive types used across the entire engine.

/// The canonical run identifier (one waterfall execution).
pub type RunId = String;

/// Serialized group key: the count-columns entry joined with `_`
/// (e.g. `party_id` or `party_id_acct_nbr`).
pub type GroupKey = String;

/// A check's flag-column name (e.g. `email_seg1_2`).
pub type CheckName = String;

/// A record count. All funnel statistics are non-negative integers.
pub type Count = u64;
