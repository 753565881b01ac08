//! waterfall-core — funnel ("waterfall") metrics and history comparison.
//!
//! Turns a per-record pass/fail flag matrix into a funnel report: for each
//! grouping of identifier columns and each ordered set of eligibility
//! checks, how many records are claimed, drop at each step, remain, and
//! could be regained by relaxing a single check — optionally compared
//! against a prior run from the durable history store.

pub mod checkset;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod funnel;
pub mod history;
pub mod report;
pub mod segmentation;
pub mod source;
pub mod sqlite_source;
pub mod store;
pub mod types;
