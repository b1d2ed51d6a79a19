//! vwapcross CLI: backtest and simulated live runs.
//!
//! Modes:
//! - `--backtest`: replay CSV (or seeded synthetic) bars and report the trade ledger
//! - `--live`: poll a simulated venue through the live feed until `--max-polls`
//!   is reached or Ctrl+C is pressed

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;
use vwapcross_core::config::TradingMode;
use vwapcross_core::domain::Timeframe;
use vwapcross_core::execution::{SharedExecution, SimulatedExecution};
use vwapcross_runner::{run_backtest, run_live, RunConfig, RunReport};

#[derive(Parser)]
#[command(name = "vwapcross", about = "VWAP/EMA/MACD crossover signal engine", version)]
#[command(group(ArgGroup::new("mode").required(true).args(["backtest", "live"])))]
struct Cli {
    /// Replay historical or synthetic bars.
    #[arg(long)]
    backtest: bool,

    /// Run against the simulated live venue.
    #[arg(long)]
    live: bool,

    /// Path to a TOML run file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the traded symbol.
    #[arg(long)]
    symbol: Option<String>,

    /// Override the timeframe set (e.g. `--timeframes 5m,15m`).
    #[arg(long, value_delimiter = ',')]
    timeframes: Vec<Timeframe>,

    /// Historical CSV for a single timeframe: `5m=path/to/bars.csv`.
    #[arg(long = "csv", value_parser = parse_csv_arg)]
    csv: Vec<(Timeframe, PathBuf)>,

    /// Synthetic bars per timeframe when no CSV is given.
    #[arg(long)]
    bars: Option<usize>,

    /// Master seed for synthetic data and noise.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop a live run after this many polls per timeframe.
    #[arg(long)]
    max_polls: Option<u64>,

    /// Wait between live polls, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Write the full report as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_csv_arg(value: &str) -> Result<(Timeframe, PathBuf), String> {
    let (tf, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TIMEFRAME=PATH, got '{value}'"))?;
    let tf = tf.parse::<Timeframe>().map_err(|e| e.to_string())?;
    Ok((tf, PathBuf::from(path)))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vwapcross=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let report = if cli.backtest {
        run_backtest(&config)?
    } else {
        if config.strategy.mode == TradingMode::Live {
            bail!("mode = \"live\" dispatches real orders; no exchange client is configured in this binary");
        }
        let stop = Arc::new(AtomicBool::new(false));
        stop_on_ctrl_c(Arc::clone(&stop))?;
        let execution = SharedExecution::new(SimulatedExecution::with_fill_limit(
            config.live.ledger_capacity,
        ));
        run_live(&config, execution, &stop)?
    };

    print_summary(&report);
    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}

/// Set `stop` on Ctrl+C so a live run finishes its poll and reports.
fn stop_on_ctrl_c(stop: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received Ctrl+C, stopping live run");
                    stop.store(true, Ordering::Relaxed);
                }
            });
        })
        .context("spawning signal thread")?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("loading run config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(symbol) = &cli.symbol {
        config.strategy.symbol = symbol.clone();
    }
    if !cli.timeframes.is_empty() {
        config.strategy.timeframes = cli.timeframes.clone();
    }
    for (tf, path) in &cli.csv {
        config.backtest.csv.insert(tf.as_str().to_string(), path.clone());
    }
    if let Some(bars) = cli.bars {
        config.backtest.synthetic_bars = bars;
    }
    if let Some(seed) = cli.seed {
        config.backtest.seed = seed;
        config.live.seed = seed;
    }
    if cli.max_polls.is_some() {
        config.live.max_polls = cli.max_polls;
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.live.poll_interval_ms = interval;
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!();
    println!("=== {} {:?} ===", report.symbol, report.mode);
    for tf in &report.timeframes {
        println!(
            "  {:>4}  bars {:>6}  signals {:>4}  entries {:>4}  exits {:>4}  state {:?}{}",
            tf.timeframe.as_str(),
            tf.stats.bars_received,
            tf.stats.signals,
            tf.stats.entries,
            tf.stats.exits,
            tf.final_state,
            if tf.halted { "  HALTED" } else { "" },
        );
    }
    println!();
    println!("  Trades:         {}", s.trade_count);
    println!("  Win rate:       {:.1}%", s.win_rate * 100.0);
    println!("  Total P&L:      {:.2}", s.total_pnl);
    println!("  Final equity:   {:.2}", s.final_equity);
    println!("  Return:         {:.2}%", s.return_pct);
    println!("  Avg win/loss:   {:.2} / {:.2}", s.avg_win, s.avg_loss);
    println!("  Profit factor:  {:.2}", s.profit_factor);
    println!("  Max drawdown:   {:.2}%", s.max_drawdown_pct);
}
