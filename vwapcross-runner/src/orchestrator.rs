//! Backtest and live orchestration.
//!
//! One rayon task per configured timeframe, each with its own
//! [`TimeframeWorker`]. Workers share nothing but the execution client,
//! which [`SharedExecution`] serialises. Backtest and live differ only in
//! the bar source: a [`HistoricalFeed`] over loaded bars, or a [`LiveFeed`]
//! fed by polling a venue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, DurationRound, Utc};
use rayon::prelude::*;
use thiserror::Error;
use vwapcross_core::domain::Timeframe;
use vwapcross_core::execution::{ExecutionClient, SharedExecution, SimulatedExecution};
use vwapcross_core::feed::{GaussianNoise, HistoricalFeed, LiveFeed};
use vwapcross_core::rng::{RngHierarchy, SeedStream};

use crate::config::{RunConfig, RunConfigError};
use crate::data::{load_bars, LoadError, SimulatedVenue, SyntheticBars};
use crate::report::{RunMode, RunReport, TimeframeReport, TradeRecord};
use crate::worker::TimeframeWorker;

/// Errors that abort a run before or while starting workers.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] RunConfigError),

    #[error("cannot load {timeframe} bars: {source}")]
    Load {
        timeframe: Timeframe,
        #[source]
        source: LoadError,
    },

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

type WorkerOutput = (TimeframeReport, Vec<TradeRecord>);

/// Longest single sleep while waiting for the next poll, so a stop request
/// is noticed promptly.
const STOP_CHECK_INTERVAL: StdDuration = StdDuration::from_millis(100);

fn new_worker(config: &RunConfig, timeframe: Timeframe) -> TimeframeWorker {
    let worker = TimeframeWorker::new(&config.strategy.symbol, timeframe, &config.strategy);
    match config.backtest.position_fraction {
        Some(fraction) => worker.with_equity_sizing(fraction, config.backtest.initial_capital),
        None => worker,
    }
}

/// Sleep up to `interval`, returning early once `stop` is set.
fn pause(interval: StdDuration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}

fn worker_pool(timeframes: usize) -> Result<rayon::ThreadPool, RunError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(timeframes.max(1))
        .thread_name(|i| format!("vwapcross-worker-{i}"))
        .build()?)
}

fn collect_report(config: &RunConfig, mode: RunMode, outputs: Vec<WorkerOutput>) -> RunReport {
    let mut timeframes = Vec::with_capacity(outputs.len());
    let mut trades = Vec::new();
    for (report, ledger) in outputs {
        timeframes.push(report);
        trades.extend(ledger);
    }
    RunReport::new(
        mode,
        config.strategy.symbol.clone(),
        timeframes,
        trades,
        config.backtest.initial_capital,
    )
}

/// Replay historical (or synthetic) bars for every timeframe with simulated fills.
pub fn run_backtest(config: &RunConfig) -> Result<RunReport, RunError> {
    run_backtest_with(config, SharedExecution::new(SimulatedExecution::new()))
}

/// [`run_backtest`] against a caller-supplied execution client.
pub fn run_backtest_with<E>(
    config: &RunConfig,
    execution: SharedExecution<E>,
) -> Result<RunReport, RunError>
where
    E: ExecutionClient,
{
    config.validate()?;
    let symbol = config.strategy.symbol.as_str();

    let mut loaded = Vec::with_capacity(config.strategy.timeframes.len());
    for &timeframe in &config.strategy.timeframes {
        let data = load_bars(config, timeframe).map_err(|source| RunError::Load { timeframe, source })?;
        loaded.push((timeframe, data));
    }

    tracing::info!(
        symbol,
        timeframes = loaded.len(),
        "starting backtest"
    );

    let pool = worker_pool(loaded.len())?;
    let outputs: Vec<WorkerOutput> = pool.install(|| {
        loaded
            .into_par_iter()
            .map(|(timeframe, data)| {
                let mut worker = new_worker(config, timeframe);
                let mut execution = execution.clone();
                worker.drain(&mut HistoricalFeed::new(data.bars), &mut execution);
                worker.finish(Some(data.source))
            })
            .collect()
    });

    let report = collect_report(config, RunMode::Backtest, outputs);
    tracing::info!(
        trades = report.summary.trade_count,
        pnl = report.summary.total_pnl,
        "backtest finished"
    );
    Ok(report)
}

/// Run against a simulated live venue until `stop` is set or every worker
/// has made `live.max_polls` polls.
///
/// Workers wait `live.poll_interval_ms` between polls and keep at most
/// `live.ledger_capacity` signals and trades, so the summary of a long run
/// covers the newest trades only.
///
/// The newest bar of each poll is perturbed with Gaussian noise when
/// `live.noise_sigma > 0`.
pub fn run_live<E>(
    config: &RunConfig,
    execution: SharedExecution<E>,
    stop: &AtomicBool,
) -> Result<RunReport, RunError>
where
    E: ExecutionClient,
{
    run_live_from(config, execution, stop, Utc::now())
}

/// [`run_live`] with the venue's first bar pinned near `start`.
pub fn run_live_from<E>(
    config: &RunConfig,
    execution: SharedExecution<E>,
    stop: &AtomicBool,
    start: DateTime<Utc>,
) -> Result<RunReport, RunError>
where
    E: ExecutionClient,
{
    config.validate()?;
    let symbol = config.strategy.symbol.as_str();
    let live = &config.live;
    let hierarchy = RngHierarchy::new(live.seed);

    tracing::info!(
        symbol,
        mode = ?config.strategy.mode,
        timeframes = config.strategy.timeframes.len(),
        window_hours = live.window_hours,
        "starting live run"
    );

    let pool = worker_pool(config.strategy.timeframes.len())?;
    let outputs: Vec<WorkerOutput> = pool.install(|| {
        config
            .strategy
            .timeframes
            .par_iter()
            .map(|&timeframe| {
                let first = start
                    .duration_trunc(timeframe.duration())
                    .unwrap_or(start);
                let walk = SyntheticBars::from_hierarchy(&hierarchy, symbol, timeframe, first);
                let mut venue = SimulatedVenue::new(walk, live.bars_per_poll, live.overlap);
                let noise = GaussianNoise::new(
                    live.noise_sigma,
                    hierarchy.rng_for(symbol, timeframe, SeedStream::Noise),
                );
                let mut feed = LiveFeed::new(live.window(), noise);
                let mut worker =
                    new_worker(config, timeframe).with_ledger_capacity(live.ledger_capacity);
                let mut execution = execution.clone();

                let mut polls = 0u64;
                let more_polls = |polls: u64| live.max_polls.map_or(true, |max| polls < max);
                while !stop.load(Ordering::Relaxed) && more_polls(polls) {
                    feed.ingest(venue.poll());
                    worker.drain(&mut feed, &mut execution);
                    polls += 1;
                    if worker.is_halted() || !more_polls(polls) {
                        break;
                    }
                    pause(live.poll_interval(), stop);
                }
                tracing::info!(
                    timeframe = %timeframe,
                    polls,
                    feed = ?feed.stats(),
                    "live worker stopped"
                );
                worker.finish(None)
            })
            .collect()
    });

    Ok(collect_report(config, RunMode::Live, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bars: usize) -> RunConfig {
        let mut config = RunConfig::default();
        config.backtest.synthetic_bars = bars;
        config
    }

    #[test]
    fn backtest_reports_every_timeframe() {
        let report = run_backtest(&config(300)).unwrap();
        assert_eq!(report.mode, RunMode::Backtest);
        let tfs: Vec<_> = report.timeframes.iter().map(|t| t.timeframe).collect();
        assert_eq!(tfs, vec![Timeframe::M5, Timeframe::M15]);
        for tf in &report.timeframes {
            assert_eq!(tf.stats.bars_received, 300);
            assert!(!tf.halted);
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let mut config = config(10);
        config.strategy.order_size = -1.0;
        assert!(matches!(run_backtest(&config), Err(RunError::Config(_))));
    }

    #[test]
    fn missing_csv_is_a_load_error() {
        let mut config = config(10);
        config
            .backtest
            .csv
            .insert("5m".into(), "/nonexistent/5m.csv".into());
        let err = run_backtest(&config).unwrap_err();
        assert!(matches!(err, RunError::Load { timeframe: Timeframe::M5, .. }));
    }

    #[test]
    fn live_run_stops_after_max_polls() {
        let mut config = config(0);
        config.live.poll_interval_ms = 0;
        config.live.max_polls = Some(20);
        config.live.bars_per_poll = 4;
        let stop = AtomicBool::new(false);
        let exec = SharedExecution::new(SimulatedExecution::new());
        let report = run_live(&config, exec, &stop).unwrap();
        assert_eq!(report.mode, RunMode::Live);
        for tf in &report.timeframes {
            // Overlapping bars are swallowed by the feed.
            assert_eq!(tf.stats.bars_received, 80);
            assert_eq!(tf.stats.duplicates, 0);
        }
    }

    #[test]
    fn stop_flag_cuts_the_poll_wait_short() {
        let mut config = config(0);
        config.live.poll_interval_ms = 60_000;
        let stop = AtomicBool::new(false);
        let exec = SharedExecution::new(SimulatedExecution::new());

        let started = Instant::now();
        let report = std::thread::scope(|scope| {
            let run = scope.spawn(|| run_live(&config, exec, &stop));
            std::thread::sleep(StdDuration::from_millis(300));
            stop.store(true, Ordering::Relaxed);
            run.join().unwrap()
        })
        .unwrap();

        assert!(started.elapsed() < StdDuration::from_secs(30));
        for tf in &report.timeframes {
            // One poll, then the stop request ends the wait.
            assert_eq!(tf.stats.bars_received, config.live.bars_per_poll as u64);
        }
    }

    #[test]
    fn pause_returns_at_once_when_stopped() {
        let started = Instant::now();
        pause(StdDuration::from_secs(60), &AtomicBool::new(true));
        assert!(started.elapsed() < StdDuration::from_secs(1));
    }

    #[test]
    fn backtest_sizes_from_capital() {
        let mut config = config(2_000);
        config.backtest.position_fraction = Some(0.5);
        let exec = SharedExecution::new(SimulatedExecution::new());
        run_backtest_with(&config, exec.clone()).unwrap();
        let first = exec
            .with_client(|c| c.fills().first().cloned())
            .unwrap()
            .expect("2000 bars produce an entry");
        assert!(first.intent.reason.is_entry());
        let expected = 0.5 * 10_000.0 / first.intent.price_basis;
        assert!((first.intent.size - expected).abs() < 1e-9);
    }

    #[test]
    fn preset_stop_flag_means_no_polls() {
        let stop = AtomicBool::new(true);
        let exec = SharedExecution::new(SimulatedExecution::new());
        let report = run_live(&config(0), exec, &stop).unwrap();
        assert!(report.timeframes.iter().all(|t| t.stats.bars_received == 0));
        assert!(report.trades.is_empty());
    }
}
