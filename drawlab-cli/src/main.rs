//! DrawLab CLI: list strategies, generate candidates, run backtests.
//!
//! Commands:
//! - `strategies`: list the registered strategies and their defaults
//! - `generate`: one recommendation for a tier from the configured history
//! - `backtest`: replay a parameter snapshot over a period range
//! - `score`: score a combination against a historical draw
//! - `runs`: summarize archived backtest runs per strategy
//! - `synth`: write a synthetic history CSV

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use drawlab_core::domain::{Candidate, PeriodId};
use drawlab_core::registry;
use drawlab_core::synthetic::synthetic_history;
use drawlab_runner::metrics::score;
use drawlab_runner::{
    summary_by_strategy, BacktestRequest, BacktestService, DrawLabConfig, JsonlArchive,
    MemoryHistory, MemoryResultSink, RunStatus, SelectionManager, Simulator,
};

#[derive(Parser)]
#[command(
    name = "drawlab",
    about = "DrawLab CLI: multi-strategy draw candidate generation and backtesting"
)]
struct Cli {
    /// Path to drawlab.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered strategies.
    Strategies {
        /// Print as JSON, including default parameters.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate one recommendation for a caller tier.
    Generate {
        #[arg(long)]
        tier: String,

        /// History window. Defaults to `engine.history_window`.
        #[arg(long)]
        window: Option<usize>,

        /// Master seed. Defaults to `engine.master_seed`.
        #[arg(long)]
        seed: Option<u64>,

        /// Use this many synthetic draws instead of the configured CSV.
        #[arg(long)]
        synthetic: Option<usize>,
    },
    /// Replay a parameter snapshot over an inclusive period range.
    Backtest {
        /// Parameter snapshot version.
        #[arg(long)]
        version: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Stake per period. Defaults to `backtest.bet_amount`.
        #[arg(long)]
        bet: Option<f64>,

        /// Use this many synthetic draws instead of the configured CSV.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Print the per-period curve as well as the totals.
        #[arg(long, default_value_t = false)]
        curve: bool,
    },
    /// Score a combination against a historical draw.
    Score {
        /// Six red numbers, comma-separated.
        #[arg(long, value_delimiter = ',', num_args = 6)]
        reds: Vec<u8>,

        #[arg(long)]
        blue: u8,

        /// Period token of the draw to score against.
        #[arg(long)]
        draw_period: String,

        #[arg(long, default_value_t = 2.0)]
        bet: f64,
    },
    /// Summarize archived backtest runs per strategy.
    Runs {
        /// Archive file. Defaults to `backtest.archive`.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Write a synthetic history CSV.
    Synth {
        #[arg(long, default_value_t = 300)]
        count: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Strategies { json } => run_strategies(json),
        Commands::Generate {
            tier,
            window,
            seed,
            synthetic,
        } => run_generate(&config, &tier, window, seed, synthetic),
        Commands::Backtest {
            version,
            start,
            end,
            bet,
            synthetic,
            curve,
        } => run_backtest(&config, version, start, end, bet, synthetic, curve),
        Commands::Score {
            reds,
            blue,
            draw_period,
            bet,
        } => run_score(&config, &reds, blue, &draw_period, bet),
        Commands::Runs { archive } => run_runs(&config, archive),
        Commands::Synth { count, seed, out } => run_synth(count, seed, &out),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DrawLabConfig> {
    match path {
        Some(p) => DrawLabConfig::from_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(DrawLabConfig::default()),
    }
}

fn load_history(config: &DrawLabConfig, synthetic: Option<usize>) -> Result<MemoryHistory> {
    if let Some(n) = synthetic {
        return Ok(MemoryHistory::new(synthetic_history(n, config.engine.master_seed)));
    }
    let Some(path) = &config.history.csv else {
        bail!("no history source: set [history] csv in the config or pass --synthetic N");
    };
    let history = MemoryHistory::from_csv(path)
        .with_context(|| format!("loading history {}", path.display()))?;
    info!(draws = history.len(), path = %path.display(), "history loaded");
    Ok(history)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────

fn run_strategies(json: bool) -> Result<()> {
    let registry = registry::global();
    if json {
        let list: Vec<_> = registry
            .list()
            .into_iter()
            .map(|d| {
                serde_json::json!({
                    "code": d.code(),
                    "name": d.name(),
                    "description": d.description(),
                    "min_history": d.min_history(),
                    "enabled_by_default": d.enabled_by_default(),
                    "default_params": d.default_params().to_json(),
                })
            })
            .collect();
        return print_json(&list);
    }

    println!("{:<18} {:<28} {:>7}  {:<7} Description", "Code", "Name", "Min", "Default");
    println!("{}", "-".repeat(90));
    for d in registry.list() {
        println!(
            "{:<18} {:<28} {:>7}  {:<7} {}",
            d.code(),
            d.name(),
            d.min_history(),
            if d.enabled_by_default() { "yes" } else { "no" },
            d.description()
        );
    }
    Ok(())
}

fn run_generate(
    config: &DrawLabConfig,
    tier: &str,
    window: Option<usize>,
    seed: Option<u64>,
    synthetic: Option<usize>,
) -> Result<()> {
    let history = load_history(config, synthetic)?;
    let manager = SelectionManager::new(
        Arc::new(registry::Registry::standard()),
        Arc::new(history),
        Arc::new(config.permissions()),
        seed.unwrap_or(config.engine.master_seed),
    )
    .with_fusion(config.fusion());

    let recommendation = manager.generate_for(tier, window.unwrap_or(config.engine.history_window));
    print_json(&recommendation)
}

fn run_backtest(
    config: &DrawLabConfig,
    version: String,
    start: String,
    end: String,
    bet: Option<f64>,
    synthetic: Option<usize>,
    curve: bool,
) -> Result<()> {
    let history = load_history(config, synthetic)?;
    let simulator = Simulator::new(
        Arc::new(registry::Registry::standard()),
        Arc::new(history),
        Arc::new(config.snapshots()),
        config.simulator_config(),
    );

    let mut sink = MemoryResultSink::new();
    if let Some(path) = &config.backtest.archive {
        sink = sink.with_archive(JsonlArchive::new(path));
    }
    let service = BacktestService::new(Arc::new(simulator), Arc::new(sink))
        .with_max_retries(config.backtest.max_retries);

    let request = BacktestRequest::new(
        version,
        start.as_str(),
        end.as_str(),
        bet.unwrap_or(config.backtest.bet_amount),
    );
    let run_id = service.submit(request);
    info!(run_id = %run_id, "waiting for backtest");

    let Some(mut record) = service.wait(&run_id) else {
        bail!("run {run_id} disappeared");
    };
    if !curve {
        if let Some(stats) = record.stats.as_mut() {
            stats.curve.clear();
        }
    }
    print_json(&record)?;
    if record.status == RunStatus::Failed {
        bail!(
            "backtest failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn run_score(
    config: &DrawLabConfig,
    reds: &[u8],
    blue: u8,
    period: &str,
    bet: f64,
) -> Result<()> {
    let history = load_history(config, None)?;
    let Some(actual) = history.find(&PeriodId::from(period)) else {
        bail!("no draw for period {period}");
    };
    let candidate = Candidate::new(reds, blue, "manual").context("invalid combination")?;
    let s = score(&candidate, actual, &config.prize_table(), bet);
    print_json(&serde_json::json!({
        "period": period,
        "candidate": { "reds": candidate.reds(), "blue": candidate.blue() },
        "actual": { "reds": actual.reds(), "blue": actual.blue() },
        "score": s,
    }))
}

fn run_runs(config: &DrawLabConfig, archive: Option<PathBuf>) -> Result<()> {
    let Some(path) = archive.or_else(|| config.backtest.archive.clone()) else {
        bail!("no archive: pass --archive or set backtest.archive in the config");
    };
    let records = JsonlArchive::new(&path)
        .read_all()
        .with_context(|| format!("reading archive {}", path.display()))?;
    print_json(&summary_by_strategy(&records))
}

fn run_synth(count: usize, seed: u64, out: &Path) -> Result<()> {
    let history = MemoryHistory::new(synthetic_history(count, seed));
    history
        .write_csv(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(draws = history.len(), path = %out.display(), "synthetic history written");
    Ok(())
}
