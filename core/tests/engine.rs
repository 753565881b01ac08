//! End-to-end engine runs over an in-memory matrix and store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use waterfall_core::config::{
    AppConfig, ChannelConditions, ColumnSpec, ConditionCheck, ConditionsConfig, EligibilityConfig,
    HistoryConfig, SegmentConditions, WaterfallConfig,
};
use waterfall_core::engine::WaterfallEngine;
use waterfall_core::funnel::StatName;
use waterfall_core::source::FlagMatrix;
use waterfall_core::store::HistoryStore;

fn named(name: &str) -> ConditionCheck {
    ConditionCheck {
        name: Some(name.to_string()),
        sql: format!("{name} = 1"),
        description: None,
    }
}

fn config() -> AppConfig {
    AppConfig {
        offer_code: "OFFER1".into(),
        campaign_planner: Some("J. Planner".into()),
        lead: None,
        eligibility: EligibilityConfig {
            eligibility_table: "elig".into(),
            conditions: ConditionsConfig {
                main_ba: vec![named("m1")],
                channels: vec![ChannelConditions {
                    name: "email".into(),
                    ba: vec![named("e1")],
                    segments: vec![SegmentConditions {
                        name: "seg1".into(),
                        checks: vec![named("s1"), named("s2")],
                    }],
                }],
            },
            unique_identifiers: vec!["party_id".into(), "household_id".into()],
        },
        waterfall: WaterfallConfig {
            output_directory: "/tmp/out".into(),
            count_columns: vec![ColumnSpec::Single("party_id".into())],
        },
        history: HistoryConfig {
            enabled: true,
            store_path: Some("unused-in-tests.sqlite".into()),
            compare_offset_days: None,
            recent_window_days: Some(30),
        },
    }
}

fn matrix() -> FlagMatrix {
    let mut m = FlagMatrix::new(
        "elig",
        vec!["party_id".into(), "household_id".into()],
        vec!["m1".into(), "e1".into(), "s1".into(), "s2".into()],
    );
    // 8 parties fully eligible, 2 drop at s2, 3 drop at main BA.
    for i in 0..8 {
        let id = format!("p{i}");
        m.add_record(&[&id, "h1"], &["m1", "e1", "s1", "s2"]).unwrap();
    }
    for i in 8..10 {
        let id = format!("p{i}");
        m.add_record(&[&id, "h2"], &["m1", "e1", "s1"]).unwrap();
    }
    for i in 10..13 {
        let id = format!("p{i}");
        m.add_record(&[&id, "h3"], &["e1"]).unwrap();
    }
    m
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

fn store() -> HistoryStore {
    let store = HistoryStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

#[test]
fn first_run_has_no_comparison_even_with_open_window() {
    let config = config();
    let matrix = matrix();
    let store = store();
    let engine = WaterfallEngine::new(&config, &matrix, Some(&store));

    let report = engine.run(t0()).unwrap();

    assert_eq!(report.offer_code, "OFFER1");
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.group, "party_id");
    assert_eq!(group.starting_population, 13);

    // The run records itself only after resolution, so the in-window run
    // it just wrote never matches.
    assert_eq!(group.historic_run_id, None);
    for overlay in &group.rows {
        assert_eq!(overlay.historic, None);
    }

    // The store now holds this run for the next execution.
    assert_eq!(store.runs_for("OFFER1", "party_id").unwrap().len(), 1);
    assert_eq!(report.checks.len(), 4);
}

#[test]
fn second_run_compares_against_the_first() {
    let config = config();
    let matrix = matrix();
    let store = store();

    let first = WaterfallEngine::new(&config, &matrix, Some(&store))
        .run(t0())
        .unwrap();
    let second = WaterfallEngine::new(&config, &matrix, Some(&store))
        .run(t0() + Duration::days(7))
        .unwrap();

    assert_ne!(first.run_id, second.run_id);
    let group = &second.groups[0];
    assert_eq!(group.historic_run_id, Some(first.run_id.clone()));
    assert_eq!(group.historic_timestamp, Some(t0()));

    // Identical inputs: every overlay is a zero delta; pct is defined
    // exactly where the historic value is nonzero.
    for overlay in &group.rows {
        assert_eq!(overlay.historic, Some(overlay.metric.value));
        assert_eq!(overlay.delta, Some(0));
        if overlay.metric.value == 0 {
            assert_eq!(overlay.pct_change, None);
        } else {
            assert_eq!(overlay.pct_change, Some(0.0));
        }
    }
}

#[test]
fn metric_values_are_deterministic_across_fresh_runs() {
    let config = config();
    let matrix = matrix();

    let values = |report: &waterfall_core::report::WaterfallReport| -> Vec<u64> {
        report.groups[0].rows.iter().map(|r| r.metric.value).collect()
    };

    let a = WaterfallEngine::new(&config, &matrix, Some(&store()))
        .run(t0())
        .unwrap();
    let b = WaterfallEngine::new(&config, &matrix, Some(&store()))
        .run(t0())
        .unwrap();
    assert_eq!(values(&a), values(&b));
    assert!(!values(&a).is_empty());
}

#[test]
fn funnel_rows_cover_every_unit_in_report_order() {
    let config = config();
    let matrix = matrix();
    let store = store();
    let report = WaterfallEngine::new(&config, &matrix, Some(&store))
        .run(t0())
        .unwrap();

    let rows = &report.groups[0].rows;
    let units: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r.metric.channel.clone(), r.metric.segment.clone()))
        .fold(Vec::new(), |mut acc, u| {
            if acc.last() != Some(&u) {
                acc.push(u);
            }
            acc
        });
    assert_eq!(
        units,
        vec![
            ("main".into(), "BA".into()),
            ("email".into(), "BA".into()),
            ("email".into(), "seg1".into()),
        ]
    );

    // seg1 is its channel's last segment, so it claims the whole residual:
    // the 10 records passing m1 and e1.
    let claimed = rows
        .iter()
        .find(|r| {
            r.metric.segment == "seg1" && r.metric.stat == StatName::RecordsClaimed
        })
        .unwrap();
    assert_eq!(claimed.metric.value, 10);
    let remaining_s2 = rows
        .iter()
        .find(|r| {
            r.metric.stat == StatName::Remaining && r.metric.check.as_deref() == Some("s2")
        })
        .unwrap();
    assert_eq!(remaining_s2.metric.value, 8);
}

#[test]
fn tracking_without_store_is_a_configuration_error() {
    let config = config();
    let matrix = matrix();
    let engine = WaterfallEngine::new(&config, &matrix, None);
    let err = engine.run(t0()).unwrap_err();
    assert!(err.to_string().contains("history"), "{err}");
}

#[test]
fn tracking_disabled_runs_without_a_store() {
    let mut config = config();
    config.history = HistoryConfig::default();
    let matrix = matrix();
    let report = WaterfallEngine::new(&config, &matrix, None)
        .run(t0())
        .unwrap();
    assert_eq!(report.groups[0].historic_run_id, None);
}

#[test]
fn unknown_flag_column_aborts_the_run() {
    let mut config = config();
    config.eligibility.conditions.channels[0].segments[0]
        .checks
        .push(named("missing_flag"));
    let matrix = matrix();
    let store = store();
    let engine = WaterfallEngine::new(&config, &matrix, Some(&store));

    assert!(engine.run(t0()).is_err());
    // Fail-fast: nothing was recorded for the aborted run.
    assert!(store.runs_for("OFFER1", "party_id").unwrap().is_empty());
}

#[test]
fn groups_compute_in_declaration_order() {
    let mut config = config();
    config.waterfall.count_columns = vec![
        ColumnSpec::Single("household_id".into()),
        ColumnSpec::Single("party_id".into()),
    ];
    let matrix = matrix();
    let store = store();
    let report = WaterfallEngine::new(&config, &matrix, Some(&store))
        .run(t0())
        .unwrap();

    let names: Vec<&str> = report.groups.iter().map(|g| g.group.as_str()).collect();
    assert_eq!(names, vec!["household_id", "party_id"]);
    // Households collapse with an OR across their parties.
    assert_eq!(report.groups[0].starting_population, 3);
    assert_eq!(report.groups[1].starting_population, 13);
}
