//! Shared-counter race demonstration harness
//!
//! A shared counter is incremented concurrently by a fixed-size worker pool
//! under a selectable synchronization discipline.
//!
//! # Problem
//! An unsynchronized `value = value + 1` is a read-modify-write: two workers
//! can read the same value, both add one, and one update is lost. Across
//! 100 000 increments on a multi-worker pool the final count comes up short
//! essentially every run.
//!
//! # Solution
//! Wrapping the same critical section in mutual exclusion — a plain mutex or
//! a first-class re-entrant [`ExplicitLock`] — makes the increments
//! linearizable and the final count exact, deterministically. A lock-free
//! atomic strategy is included for comparison.
//!
//! # Usage
//! Run the race demonstration:
//! ```bash
//! cargo run --bin problem
//! ```
//!
//! Run the locking disciplines:
//! ```bash
//! cargo run --bin solution
//! ```

pub mod counter;
pub mod lock;
pub mod pool;
pub mod workload;

pub use counter::{Counter, Strategy};
pub use lock::{ExplicitLock, LockError, LockGuard};
pub use pool::{CompletionStatus, PoolError, WorkerPool};
pub use workload::{
    run_contention, run_workload, ContentionReport, WorkloadConfig, WorkloadReport,
};
