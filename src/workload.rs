//! Drives N concurrent increments against one counter and reports what the
//! chosen discipline actually delivered.
//!
//! Each run owns its counter and its pool; nothing is shared between runs, so
//! repeated runs (and tests) cannot contaminate each other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::counter::{Counter, Strategy};
use crate::lock::ExplicitLock;
use crate::pool::{CompletionStatus, PoolError, WorkerPool};

/// Default grace period before unfinished tasks are forcibly cancelled.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub pool_size: usize,
    pub task_count: usize,
    pub strategy: Strategy,
    pub shutdown_timeout: Duration,
}

impl WorkloadConfig {
    pub fn new(pool_size: usize, task_count: usize, strategy: Strategy) -> Self {
        Self {
            pool_size,
            task_count,
            strategy,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// What a workload run produced: the counter's final value and how the pool
/// wound down. Both are reported even when tasks had to be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadReport {
    pub final_count: i64,
    pub status: CompletionStatus,
}

impl WorkloadReport {
    /// Increments that never made it into the final count.
    pub fn lost_updates(&self, expected: i64) -> i64 {
        expected - self.final_count
    }
}

/// Submits `task_count` fire-and-forget increments to a pool of
/// `pool_size` workers, waits for the pool to drain, and reads the result.
pub fn run_workload(config: &WorkloadConfig) -> Result<WorkloadReport, PoolError> {
    log::info!(
        "running workload: {} tasks on {} workers under {:?}",
        config.task_count,
        config.pool_size,
        config.strategy
    );

    let counter = Arc::new(Counter::new(config.strategy));
    let mut pool = WorkerPool::new(config.pool_size)?;

    for _ in 0..config.task_count {
        let counter = Arc::clone(&counter);
        pool.submit(async move { counter.increment() });
    }

    let status = pool.shutdown(config.shutdown_timeout);
    let report = WorkloadReport {
        final_count: counter.get_count(),
        status,
    };
    log::info!(
        "workload finished: expected {}, counted {}, status: {}",
        config.task_count,
        report.final_count,
        report.status
    );
    Ok(report)
}

/// What the contention run observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionReport {
    pub completions: usize,
    pub elapsed: Duration,
    pub status: CompletionStatus,
}

/// Serialization under load: every task grabs the same [`ExplicitLock`] and
/// holds it across a blocking sleep, so the holders line up one behind the
/// other and total elapsed time approaches `holders * hold_for`.
///
/// The sleep is deliberately a blocking `std::thread::sleep` while the lock
/// is held; with enough workers each holder pins one worker thread, which is
/// exactly the contention being demonstrated.
pub fn run_contention(
    pool_size: usize,
    holders: usize,
    hold_for: Duration,
) -> Result<ContentionReport, PoolError> {
    let lock = Arc::new(ExplicitLock::new());
    let mut pool = WorkerPool::new(pool_size)?;
    let started = Instant::now();

    for i in 0..holders {
        let lock = Arc::clone(&lock);
        pool.submit(async move {
            let held = lock.acquire();
            log::info!("task {i} got the lock, holding for {hold_for:?}");
            std::thread::sleep(hold_for);
            drop(held);
        });
    }

    // Generous bound: serialized holders need holders * hold_for, plus slack.
    let wait_bound = hold_for * (holders.max(1) as u32) + Duration::from_secs(2);
    let completions = match pool.wait_all(wait_bound) {
        Ok(results) => results.iter().filter(|r| r.is_ok()).count(),
        Err(PoolError::Timeout { outstanding }) => holders - outstanding,
        Err(err) => return Err(err),
    };
    let elapsed = started.elapsed();
    let status = pool.shutdown(Duration::from_secs(1));

    log::info!(
        "contention run: {completions}/{holders} holders finished in {elapsed:?} ({status})"
    );
    Ok(ContentionReport {
        completions,
        elapsed,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logs() {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .is_test(true)
            .try_init()
            .ok();
    }

    const TASKS: usize = 10_000;

    #[test]
    fn locked_strategies_count_exactly() {
        init_logs();
        for strategy in [Strategy::Exclusive, Strategy::Explicit, Strategy::Atomic] {
            let report = run_workload(&WorkloadConfig::new(4, TASKS, strategy)).unwrap();
            assert_eq!(report.status, CompletionStatus::AllCompleted);
            assert_eq!(
                report.final_count, TASKS as i64,
                "strategy {strategy:?} must not lose updates"
            );
        }
    }

    #[test]
    fn unsynchronized_counter_loses_updates() {
        init_logs();
        let config = WorkloadConfig::new(4, 100_000, Strategy::Unsynchronized);

        // The race is probabilistic; a handful of attempts makes the
        // demonstration reliable without weakening the assertion.
        let mut lost = 0;
        for attempt in 1..=5 {
            let report = run_workload(&config).unwrap();
            assert_eq!(report.status, CompletionStatus::AllCompleted);
            assert!(
                report.final_count <= 100_000,
                "lost updates can only lower the count"
            );
            lost = report.lost_updates(100_000);
            log::info!("attempt {attempt}: lost {lost} updates");
            if lost > 0 {
                break;
            }
        }
        assert!(lost > 0, "expected at least one lost update across attempts");
    }

    #[test]
    fn single_worker_is_exact_for_every_strategy() {
        init_logs();
        // With one worker there is no interleaving, so even the
        // unsynchronized counter cannot race.
        for strategy in [
            Strategy::Unsynchronized,
            Strategy::Exclusive,
            Strategy::Explicit,
            Strategy::Atomic,
        ] {
            let report = run_workload(&WorkloadConfig::new(1, 1_000, strategy)).unwrap();
            assert_eq!(report.status, CompletionStatus::AllCompleted);
            assert_eq!(report.final_count, 1_000, "strategy {strategy:?}");
        }
    }

    #[test]
    fn zero_tasks_complete_immediately() {
        let started = Instant::now();
        let config = WorkloadConfig::new(2, 0, Strategy::Exclusive)
            .shutdown_timeout(Duration::from_secs(1));
        let report = run_workload(&config).unwrap();
        assert_eq!(report.final_count, 0);
        assert_eq!(report.status, CompletionStatus::AllCompleted);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn report_is_stable_after_completion() {
        let report = run_workload(&WorkloadConfig::new(2, 100, Strategy::Atomic)).unwrap();
        assert_eq!(report.final_count, 100);
        // The pool is gone; nothing mutates the result afterwards.
        assert_eq!(report.final_count, 100);
    }

    #[test]
    fn contended_lock_serializes_holders() {
        init_logs();
        let hold = Duration::from_millis(100);
        let report = run_contention(3, 3, hold).unwrap();

        assert_eq!(report.completions, 3);
        assert_eq!(report.status, CompletionStatus::AllCompleted);
        assert!(
            report.elapsed >= hold * 3,
            "holders must run one at a time, finished in {:?}",
            report.elapsed
        );
    }
}
