//! Fan-out of independent per-instrument runs over a fixed worker pool.
//!
//! Units are spawned on a dedicated rayon pool and report back over an mpsc
//! channel, one message per unit. Each unit runs under `catch_unwind`, so a
//! panic turns into a failed result for that unit alone.

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use market_io::{instrument_id_from_path, read_series, InstrumentSeries};
use tracing::{debug, info, warn};

use crate::config::BacktestConfig;
use crate::core::run_instrument;
use crate::error::BacktestError;
use crate::models::{BatchTally, InstrumentOutcome, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Dispatching,
    Awaiting,
    Collected,
    Done,
}

/// Result of one dispatched unit, tagged with its dispatch position.
#[derive(Debug)]
pub struct UnitResult<T> {
    pub index: usize,
    /// `Err` carries the panic message of a unit that did not finish.
    pub outcome: Result<T, String>,
}

pub struct FanOutCoordinator {
    pool: rayon::ThreadPool,
    workers: usize,
    state: CoordinatorState,
}

impl FanOutCoordinator {
    /// Builds the pool. `None` uses the available parallelism.
    pub fn new(workers: Option<usize>) -> Result<Self, BacktestError> {
        let workers = match workers {
            Some(0) => {
                return Err(BacktestError::InvalidConfig(
                    "worker count must be positive".into(),
                ))
            }
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("backtest-worker-{i}"))
            .build()?;

        Ok(Self {
            pool,
            workers,
            state: CoordinatorState::Idle,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Runs `job` once per unit and blocks until every unit has reported.
    ///
    /// Results come back in completion order. A unit that panics yields an
    /// `Err` entry; its siblings are unaffected. The coordinator is left in
    /// `Collected` until the caller has consumed the results and calls
    /// [`finish`](Self::finish).
    pub fn run<U, T, F>(&mut self, units: Vec<U>, job: F) -> Vec<UnitResult<T>>
    where
        U: Send + 'static,
        T: Send + 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let total = units.len();
        let job = Arc::new(job);
        let (tx, rx) = mpsc::channel::<UnitResult<T>>();

        self.state = CoordinatorState::Dispatching;
        debug!(units = total, workers = self.workers, "dispatching");
        for (index, unit) in units.into_iter().enumerate() {
            let tx = tx.clone();
            let job = Arc::clone(&job);
            self.pool.spawn(move || {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| job(unit))).map_err(panic_message);
                // The receiver outlives every sender, so this cannot fail.
                let _ = tx.send(UnitResult { index, outcome });
            });
        }
        drop(tx);

        self.state = CoordinatorState::Awaiting;
        let mut results: Vec<UnitResult<T>> = rx.iter().collect();

        // A unit whose sender vanished without a message still counts.
        if results.len() < total {
            let mut reported = vec![false; total];
            for result in &results {
                reported[result.index] = true;
            }
            for (index, _) in reported.iter().enumerate().filter(|(_, seen)| !**seen) {
                results.push(UnitResult {
                    index,
                    outcome: Err("unit exited without reporting".to_string()),
                });
            }
        }

        self.state = CoordinatorState::Collected;
        debug!(results = results.len(), "collected");
        results
    }

    /// Marks the collected batch as consumed.
    pub fn finish(&mut self) {
        if self.state == CoordinatorState::Collected {
            self.state = CoordinatorState::Done;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Something a worker can turn into an `InstrumentSeries`.
pub trait SeriesSource: Send + 'static {
    fn instrument_id(&self) -> String;
    fn load(self) -> Result<InstrumentSeries, BacktestError>;
}

impl SeriesSource for PathBuf {
    fn instrument_id(&self) -> String {
        instrument_id_from_path(self).unwrap_or_else(|_| self.display().to_string())
    }

    fn load(self) -> Result<InstrumentSeries, BacktestError> {
        Ok(read_series(&self)?)
    }
}

impl SeriesSource for InstrumentSeries {
    fn instrument_id(&self) -> String {
        self.id().to_string()
    }

    fn load(self) -> Result<InstrumentSeries, BacktestError> {
        Ok(self)
    }
}

/// Backtests every source on the coordinator's pool.
///
/// Every source yields exactly one `InstrumentOutcome`. Unreadable files and
/// panicking runs come back as `RunOutcome::Failed` and are logged here.
pub fn run_batch<S: SeriesSource>(
    coordinator: &mut FanOutCoordinator,
    sources: Vec<S>,
    config: Arc<BacktestConfig>,
) -> Vec<InstrumentOutcome> {
    let ids: Vec<String> = sources.iter().map(SeriesSource::instrument_id).collect();
    info!(instruments = ids.len(), workers = coordinator.workers(), "backtest started");

    let results = coordinator.run(sources, move |source: S| match source.load() {
        Ok(series) => run_instrument(&series, &config),
        Err(e) => RunOutcome::Failed(e),
    });

    let outcomes: Vec<InstrumentOutcome> = results
        .into_iter()
        .map(|result| {
            let instrument_id = ids[result.index].clone();
            let outcome = result
                .outcome
                .unwrap_or_else(|msg| RunOutcome::Failed(BacktestError::WorkerPanicked(msg)));
            match &outcome {
                RunOutcome::Failed(e) => {
                    warn!(instrument = %instrument_id, error = %e, "instrument failed")
                }
                RunOutcome::Skipped(reason) => {
                    debug!(instrument = %instrument_id, %reason, "instrument skipped")
                }
                RunOutcome::Completed(_) => {}
            }
            InstrumentOutcome {
                instrument_id,
                outcome,
            }
        })
        .collect();
    coordinator.finish();

    let tally = BatchTally::from_outcomes(&outcomes);
    info!(
        completed = tally.completed,
        skipped = tally.skipped,
        failed = tally.failed,
        signals = tally.signals,
        "backtest finished"
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::ignition_series;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_coordinator_collects_every_unit() {
        let mut coordinator = FanOutCoordinator::new(Some(3)).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let results = coordinator.run((0..20).collect(), |n: u64| n * n);
        assert_eq!(coordinator.state(), CoordinatorState::Collected);
        assert_eq!(results.len(), 20);
        coordinator.finish();
        assert_eq!(coordinator.state(), CoordinatorState::Done);

        let mut squares: Vec<u64> = results.into_iter().map(|r| r.outcome.unwrap()).collect();
        squares.sort_unstable();
        assert_eq!(squares, (0..20).map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_unit_does_not_cancel_siblings() {
        let mut coordinator = FanOutCoordinator::new(Some(2)).unwrap();
        let results = coordinator.run((0..8).collect(), |n: usize| {
            if n == 5 {
                panic!("unit {n} exploded");
            }
            n + 1
        });

        assert_eq!(results.len(), 8);
        let failed: Vec<&UnitResult<usize>> = results.iter().filter(|r| r.outcome.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 5);
        assert!(failed[0].outcome.as_ref().unwrap_err().contains("exploded"));
        assert_eq!(results.iter().filter(|r| r.outcome.is_ok()).count(), 7);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            FanOutCoordinator::new(Some(0)),
            Err(BacktestError::InvalidConfig(_))
        ));
        assert!(FanOutCoordinator::new(None).unwrap().workers() >= 1);
    }

    #[test]
    fn test_run_batch_isolates_bad_files() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("000002.csv");
        fs::write(&bad, "日期,开盘\nnot,a,valid,row\n").unwrap();
        let missing = dir.path().join("000003.csv");

        let mut coordinator = FanOutCoordinator::new(Some(2)).unwrap();
        let outcomes = run_batch(
            &mut coordinator,
            vec![bad, missing],
            Arc::new(BacktestConfig::default()),
        );

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.outcome, RunOutcome::Failed(BacktestError::Data(_)))));
    }

    #[test]
    fn test_run_batch_in_memory_series() {
        let sources = vec![
            ignition_series("600000"),
            ignition_series("600001"),
            InstrumentSeries::new("600002", ignition_series("x").bars()[..50].to_vec()),
        ];
        let mut coordinator = FanOutCoordinator::new(Some(2)).unwrap();
        let mut outcomes = run_batch(&mut coordinator, sources, Arc::new(BacktestConfig::default()));
        outcomes.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));

        assert_eq!(outcomes[0].outcome.signals().len(), 1);
        assert_eq!(outcomes[1].outcome.signals().len(), 1);
        assert!(matches!(outcomes[2].outcome, RunOutcome::Skipped(_)));
        assert_eq!(BatchTally::from_outcomes(&outcomes).signals, 2);
        assert_eq!(coordinator.state(), CoordinatorState::Done);
    }
}
