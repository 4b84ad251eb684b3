//! KEEL: boat race scoring, confidence tiering and staking engine.
//!
//! Entry point. Loads configuration and the pattern book, initialises
//! structured logging, loads the race data snapshot and runs either a
//! prediction batch for one day or a backtest over a date range.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use keel::backtest::{BacktestEvaluator, BacktestReport};
use keel::config::AppConfig;
use keel::engine::{BatchEvaluator, BatchReport, RacePipeline};
use keel::patterns::PatternBook;
use keel::store::{DataSnapshot, InMemoryStore, RaceDataStore};

const USAGE: &str = "usage: keel predict <YYYY-MM-DD>\n       keel backtest <FROM> <TO>";

enum Command {
    Predict(NaiveDate),
    Backtest(NaiveDate, NaiveDate),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let command = parse_args(std::env::args().skip(1).collect())?;

    let config_path = std::env::var("KEEL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let book = Arc::new(PatternBook::load(&cfg.engine.patterns_file)?);
    let pipeline = Arc::new(RacePipeline::from_config(&cfg, Arc::clone(&book))?);

    info!(
        name = %cfg.engine.name,
        workers = cfg.engine.workers,
        rules = book.len(),
        strategies = cfg.strategies.len(),
        bankroll = cfg.bankroll_f64(),
        "KEEL starting up"
    );

    let snapshot = DataSnapshot::load(&cfg.engine.data_file)?;
    let memory = InMemoryStore::from(snapshot);
    info!(races = memory.race_count(), "Race store ready");
    let store: Arc<dyn RaceDataStore> = Arc::new(memory);

    let batch = BatchEvaluator::new(pipeline, Arc::clone(&store), cfg.engine.workers)
        .with_timeout(cfg.engine.batch_timeout_secs.map(Duration::from_secs));

    match command {
        Command::Predict(date) => {
            let race_ids = store
                .races_between(date, date)
                .await
                .with_context(|| format!("Failed to list races on {date}"))?;
            let report = batch.run(race_ids).await;
            print_predictions(&report);
        }
        Command::Backtest(from, to) => {
            let evaluator = BacktestEvaluator::new(batch, cfg.backtest.clone(), cfg.odds_brackets.clone());
            let report = evaluator.run(from, to).await?;
            print_backtest(&report);
        }
    }

    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Command> {
    let date = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date '{s}'\n{USAGE}"))
    };
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["predict", day] => Ok(Command::Predict(date(*day)?)),
        ["backtest", from, to] => {
            let (from, to) = (date(*from)?, date(*to)?);
            if from > to {
                bail!("Backtest range is inverted: {from} > {to}");
            }
            Ok(Command::Backtest(from, to))
        }
        _ => bail!("{USAGE}"),
    }
}

fn print_predictions(report: &BatchReport) {
    for prediction in &report.predictions {
        let eval = &prediction.evaluation;
        let order: Vec<String> = eval.predicted_order().iter().map(|l| l.to_string()).collect();
        let flag = if eval.incomplete { " (incomplete)" } else { "" };
        println!("{}  {}{flag}", prediction.race_id(), order.join("-"));
        for result in &eval.results {
            let tier = result.tier.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "  #{} lane {} {:>6.1} -> {:>6.1}  {tier}",
                result.final_rank, result.lane, result.raw_score, result.final_score
            );
        }
        for decision in prediction.accepted() {
            println!("  BET {decision}");
        }
    }
    for (race_id, reason) in &report.failed {
        println!("{race_id}  FAILED: {reason}");
    }
    if !report.skipped.is_empty() {
        println!("{} races skipped after batch timeout", report.skipped.len());
    }
}

fn print_backtest(report: &BacktestReport) {
    println!(
        "Backtest {}..{}: evaluated={} excluded={} failed={}",
        report.from, report.to, report.races_evaluated, report.races_excluded, report.races_failed
    );
    for bucket in &report.buckets {
        println!("  {bucket}");
    }
    println!("  {}", report.total());

    let cal = &report.calibration;
    println!("Calibration: {} settled, Brier {:.4}, {}", cal.total, cal.overall_brier, cal.diagnosis);
    for tier in &cal.tiers {
        println!(
            "  {:<10} n={:<5} predicted={:.2} realised={:.2} brier={:.4}",
            tier.tier.to_string(),
            tier.count,
            tier.mean_predicted,
            tier.realised,
            tier.brier
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keel=info"));

    let json_logging = std::env::var("KEEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
