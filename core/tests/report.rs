//! Report assembly: comparison overlay semantics.

use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use waterfall_core::funnel::{MetricRow, StatName};
use waterfall_core::history::{HistoryRun, MetricKey};
use waterfall_core::report::assemble_group;

fn row(stat: StatName, check: Option<&str>, value: u64) -> MetricRow {
    MetricRow {
        group: "id".into(),
        channel: "email".into(),
        segment: "seg1".into(),
        stat,
        check: check.map(Into::into),
        value,
    }
}

fn historic_run(values: &[(StatName, Option<&str>, u64)]) -> HistoryRun {
    let mut metrics = HashMap::new();
    for (stat, check, value) in values {
        metrics.insert(
            MetricKey {
                channel: "email".into(),
                segment: "seg1".into(),
                stat: *stat,
                check: check.map(Into::into),
            },
            *value,
        );
    }
    HistoryRun {
        run_id: "prior".into(),
        started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        offer_code: "OFFER1".into(),
        group_key: "id".into(),
        starting_population: 90,
        metrics,
    }
}

#[test]
fn delta_and_pct_change_against_historic_values() {
    let historic = historic_run(&[
        (StatName::RecordsClaimed, None, 80),
        (StatName::Remaining, Some("s1"), 50),
    ]);
    let rows = vec![
        row(StatName::RecordsClaimed, None, 100),
        row(StatName::Remaining, Some("s1"), 40),
    ];

    let report = assemble_group("id".into(), 100, rows, Some(&historic));

    assert_eq!(report.historic_run_id.as_deref(), Some("prior"));
    assert_eq!(report.historic_timestamp, Some(historic.started_at));

    let claimed = &report.rows[0];
    assert_eq!(claimed.historic, Some(80));
    assert_eq!(claimed.delta, Some(20));
    assert_eq!(claimed.pct_change, Some(0.25));

    // Declines come out negative, not saturated.
    let remaining = &report.rows[1];
    assert_eq!(remaining.delta, Some(-10));
    assert_eq!(remaining.pct_change, Some(-0.2));
}

#[test]
fn zero_historic_value_leaves_pct_unavailable() {
    let historic = historic_run(&[(StatName::UniqueDrops, Some("s1"), 0)]);
    let rows = vec![row(StatName::UniqueDrops, Some("s1"), 5)];

    let report = assemble_group("id".into(), 100, rows, Some(&historic));
    let overlay = &report.rows[0];
    assert_eq!(overlay.historic, Some(0));
    assert_eq!(overlay.delta, Some(5));
    // Undefined, not zero and not infinity.
    assert_eq!(overlay.pct_change, None);
}

#[test]
fn metric_missing_from_historic_run_is_unavailable() {
    // The prior run predates a newly added check.
    let historic = historic_run(&[(StatName::RecordsClaimed, None, 80)]);
    let rows = vec![row(StatName::UniqueDrops, Some("s_new"), 7)];

    let report = assemble_group("id".into(), 100, rows, Some(&historic));
    let overlay = &report.rows[0];
    assert_eq!(overlay.historic, None);
    assert_eq!(overlay.delta, None);
    assert_eq!(overlay.pct_change, None);
    // Current value is always present regardless.
    assert_eq!(overlay.metric.value, 7);
}

#[test]
fn no_resolved_run_degrades_every_overlay() {
    let rows = vec![
        row(StatName::RecordsClaimed, None, 100),
        row(StatName::Remaining, Some("s1"), 40),
    ];
    let report = assemble_group("id".into(), 100, rows, None);

    assert_eq!(report.historic_run_id, None);
    assert_eq!(report.historic_timestamp, None);
    for overlay in &report.rows {
        assert_eq!(overlay.historic, None);
        assert_eq!(overlay.delta, None);
        assert_eq!(overlay.pct_change, None);
    }
}

#[test]
fn report_serializes_distinguishing_zero_from_unavailable() {
    let historic = historic_run(&[(StatName::UniqueDrops, Some("s1"), 0)]);
    let rows = vec![row(StatName::UniqueDrops, Some("s1"), 0)];
    let report = assemble_group("id".into(), 100, rows, Some(&historic));

    let json = serde_json::to_value(&report).unwrap();
    let overlay = &json["rows"][0];
    assert_eq!(overlay["historic"], 0);
    assert_eq!(overlay["delta"], 0);
    assert!(overlay["pct_change"].is_null());
}
