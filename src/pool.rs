//! A fixed-size worker pool with bounded waiting and forced cancellation.
//!
//! Wraps a dedicated multi-thread tokio runtime: `pool_size` worker threads
//! pull submitted tasks from the runtime's queue, the driver blocks only in
//! the wait operations, never inside a worker. Shutdown first cancels the
//! pool's [`CancellationToken`] so cooperative tasks can finish, then aborts
//! whatever is still outstanding once the grace period elapses.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Failures surfaced by the pool's wait and shutdown operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool needs at least one worker thread.
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    /// The underlying runtime could not be started.
    #[error("failed to start worker pool runtime")]
    Runtime(#[source] std::io::Error),

    /// The wait was interrupted before completion or timeout.
    #[error("wait was interrupted before completion")]
    Interrupted,

    /// A task panicked while executing. Isolated to that task; siblings
    /// keep running.
    #[error("task execution failed: {reason}")]
    TaskFailed { reason: String },

    /// A task was aborted before it could complete.
    #[error("task was cancelled before completion")]
    Cancelled,

    /// A bounded wait expired with tasks still outstanding.
    #[error("timed out waiting with {outstanding} tasks outstanding")]
    Timeout { outstanding: usize },

    /// No tasks have been submitted to wait for.
    #[error("no tasks to wait for")]
    Empty,
}

/// How a shutdown ended: either every task finished inside the grace period
/// or the stragglers were forcibly cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    AllCompleted,
    ForcedCancel { remaining: usize },
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllCompleted => write!(f, "all completed"),
            Self::ForcedCancel { remaining } => {
                write!(f, "forced-cancel, {remaining} remaining")
            }
        }
    }
}

pub struct WorkerPool<T> {
    runtime: Runtime,
    tasks: JoinSet<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// A pool with exactly `workers` worker threads.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("counter-worker")
            .enable_all()
            .build()
            .map_err(PoolError::Runtime)?;
        Ok(Self {
            runtime,
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Submits a task. Never blocks; the task starts as soon as a worker
    /// is free.
    pub fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let _ = self.tasks.spawn_on(task, self.runtime.handle());
    }

    /// Tasks submitted but not yet joined.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// The pool's cancellation token. Long-running tasks should watch it and
    /// exit once shutdown begins; tasks that do not are aborted when the
    /// shutdown grace period expires.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for every outstanding task, up to `timeout`.
    ///
    /// Per-task failures are isolated: a panicking task yields an `Err` entry
    /// in the returned vector while its siblings run to completion. Only an
    /// expired bound fails the whole wait, with the outstanding count.
    pub fn wait_all(&mut self, timeout: Duration) -> Result<Vec<Result<T, PoolError>>, PoolError> {
        let Self { runtime, tasks, .. } = self;
        // Timeout futures must be created inside the runtime context.
        let outcome = runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                let mut results = Vec::new();
                while let Some(joined) = tasks.join_next().await {
                    results.push(joined.map_err(join_failure));
                }
                results
            })
            .await
        });
        match outcome {
            Ok(results) => Ok(results),
            Err(_) => Err(PoolError::Timeout {
                outstanding: tasks.len(),
            }),
        }
    }

    /// Like [`wait_all`](Self::wait_all), but an interrupt signal ends the
    /// wait early with [`PoolError::Interrupted`]. The interrupt is surfaced,
    /// not retried; outstanding tasks keep running.
    pub fn wait_all_interruptible(
        &mut self,
        timeout: Duration,
        mut interrupt: oneshot::Receiver<()>,
    ) -> Result<Vec<Result<T, PoolError>>, PoolError> {
        enum WaitEnd<T> {
            Done(Vec<Result<T, PoolError>>),
            TimedOut,
            Interrupted,
        }

        let Self { runtime, tasks, .. } = self;
        let end = runtime.block_on(async {
            let drain = async {
                let mut results = Vec::new();
                while let Some(joined) = tasks.join_next().await {
                    results.push(joined.map_err(join_failure));
                }
                results
            };
            tokio::select! {
                _ = &mut interrupt => WaitEnd::Interrupted,
                finished = tokio::time::timeout(timeout, drain) => match finished {
                    Ok(results) => WaitEnd::Done(results),
                    Err(_) => WaitEnd::TimedOut,
                },
            }
        });
        match end {
            WaitEnd::Done(results) => Ok(results),
            WaitEnd::TimedOut => Err(PoolError::Timeout {
                outstanding: tasks.len(),
            }),
            WaitEnd::Interrupted => Err(PoolError::Interrupted),
        }
    }

    /// Returns the first task of the batch to finish. The rest keep running
    /// until they are waited on or the pool shuts down.
    pub fn wait_any(&mut self) -> Result<T, PoolError> {
        let Self { runtime, tasks, .. } = self;
        match runtime.block_on(tasks.join_next()) {
            Some(joined) => joined.map_err(join_failure),
            None => Err(PoolError::Empty),
        }
    }

    /// Bounded wait for the next task to finish, distinguishing an expired
    /// bound ([`PoolError::Timeout`]) from a task failure
    /// ([`PoolError::TaskFailed`]). A timed-out task is not cancelled here;
    /// it stays outstanding for a later wait or shutdown to account for.
    pub fn wait_timeout(&mut self, limit: Duration) -> Result<T, PoolError> {
        if self.tasks.is_empty() {
            return Err(PoolError::Empty);
        }
        let Self { runtime, tasks, .. } = self;
        let outcome =
            runtime.block_on(async { tokio::time::timeout(limit, tasks.join_next()).await });
        match outcome {
            Ok(Some(joined)) => joined.map_err(join_failure),
            Ok(None) => Err(PoolError::Empty),
            Err(_) => Err(PoolError::Timeout {
                outstanding: tasks.len(),
            }),
        }
    }

    /// Orderly shutdown: no new submissions (the pool is consumed), signal
    /// the cancellation token, wait up to `timeout` for outstanding tasks,
    /// then forcibly cancel whatever remains.
    ///
    /// Tasks blocked in non-async calls (a `std::thread::sleep`, say) only
    /// observe the abort at their next await point and may outlive the pool.
    pub fn shutdown(self, timeout: Duration) -> CompletionStatus {
        let Self {
            runtime,
            mut tasks,
            cancel,
        } = self;

        log::info!(
            "attempting worker pool shutdown, {} tasks outstanding",
            tasks.len()
        );
        cancel.cancel();

        let drained = runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                while let Some(joined) = tasks.join_next().await {
                    if let Err(err) = joined {
                        log::error!("task failed during shutdown: {}", join_failure(err));
                    }
                }
            })
            .await
        });

        let status = match drained {
            Ok(()) => CompletionStatus::AllCompleted,
            Err(_) => {
                let remaining = tasks.len();
                log::warn!("cancelling {remaining} unfinished tasks");
                tasks.abort_all();
                CompletionStatus::ForcedCancel { remaining }
            }
        };

        // Dropping the JoinSet detaches the aborted tasks;
        // shutdown_background keeps a stuck task from hanging the caller.
        drop(tasks);
        runtime.shutdown_background();
        log::info!("worker pool shutdown finished: {status}");
        status
    }
}

fn join_failure(err: JoinError) -> PoolError {
    if err.is_cancelled() {
        return PoolError::Cancelled;
    }
    let reason = match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string()),
        Err(other) => other.to_string(),
    };
    PoolError::TaskFailed { reason }
}
