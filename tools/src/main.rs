//! wf-runner: headless waterfall report runner.
//!
//! Usage:
//!   wf-runner --config campaign.json --flags-db elig.db
//!   wf-runner --config campaign.json --flags-db elig.db --out ./reports

use anyhow::Result;
use chrono::Utc;
use waterfall_core::{
    config::AppConfig, engine::WaterfallEngine, funnel::StatName, report::WaterfallReport,
    sqlite_source::SqliteSource, store::HistoryStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = parse_arg(&args, "--config")
        .ok_or_else(|| anyhow::anyhow!("--config <campaign.json> is required"))?;
    let flags_db = parse_arg(&args, "--flags-db")
        .ok_or_else(|| anyhow::anyhow!("--flags-db <eligibility.db> is required"))?;

    let config = AppConfig::load(&config_path)?;
    let out_dir = parse_arg(&args, "--out").unwrap_or_else(|| config.waterfall.output_directory.clone());

    println!("wf-runner");
    println!("  offer:     {}", config.offer_code);
    println!("  config:    {config_path}");
    println!("  flags db:  {flags_db}");
    println!("  out dir:   {out_dir}");
    println!();

    let source = SqliteSource::open(&flags_db, &config.eligibility.eligibility_table)?;

    let store = match (config.history.enabled, parse_arg(&args, "--history-db")) {
        (true, Some(path)) => Some(open_store(&path)?),
        (true, None) => {
            let path = config
                .history
                .store_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("history enabled but no store path configured"))?;
            Some(open_store(&path)?)
        }
        (false, _) => None,
    };

    let engine = WaterfallEngine::new(&config, &source, store.as_ref());
    let now = Utc::now();
    let report = engine.run(now)?;

    std::fs::create_dir_all(&out_dir)?;
    let filename = format!(
        "waterfall_{}_{}.json",
        report.offer_code,
        now.format("%Y-%m-%d_%H%M%S")
    );
    let out_path = format!("{out_dir}/{filename}");
    std::fs::write(&out_path, serde_json::to_string_pretty(&report)?)?;
    log::info!("report written to {out_path}");

    print_summary(&report);
    Ok(())
}

fn open_store(path: &str) -> Result<HistoryStore> {
    let store = HistoryStore::open(path)?;
    store.migrate()?;
    Ok(store)
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn print_summary(report: &WaterfallReport) {
    for group in &report.groups {
        println!(
            "── group {} (starting population {})",
            group.group, group.starting_population
        );
        match &group.historic_timestamp {
            Some(ts) => println!("   compared against run at {ts}"),
            None => println!("   no comparison run available"),
        }

        // Last remaining per funnel unit: the surviving population.
        let mut current_unit: Option<(String, String)> = None;
        let mut last_remaining: Option<(String, u64, Option<u64>)> = None;
        for row in &group.rows {
            let unit = (row.metric.channel.clone(), row.metric.segment.clone());
            if current_unit.as_ref() != Some(&unit) {
                flush_unit(&mut last_remaining);
                current_unit = Some(unit.clone());
                println!("   {} / {}", unit.0, unit.1);
                if row.metric.stat == StatName::RecordsClaimed {
                    println!("      records claimed: {}", row.metric.value);
                }
            }
            if row.metric.stat == StatName::Remaining {
                last_remaining = Some((
                    row.metric.check.clone().unwrap_or_default(),
                    row.metric.value,
                    row.historic,
                ));
            }
        }
        flush_unit(&mut last_remaining);
        println!();
    }
}

fn flush_unit(last_remaining: &mut Option<(String, u64, Option<u64>)>) {
    if let Some((check, value, historic)) = last_remaining.take() {
        match historic {
            Some(h) => println!("      remaining after {check}: {value} (was {h})"),
            None => println!("      remaining after {check}: {value}"),
        }
    }
}
