//! A shared counter mutated under a selectable synchronization discipline.
//!
//! The counter exists to make race conditions observable, not to hide them:
//! the [`Strategy::Unsynchronized`] variant deliberately performs a
//! non-atomic read-modify-write so concurrent increments can lose updates,
//! while the locking variants wrap the same critical section in mutual
//! exclusion and always produce exact counts.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::lock::ExplicitLock;

/// Which synchronization discipline guards the read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No mutual exclusion at all. Concurrent callers race and updates are
    /// lost; the final count is at most the number of increments.
    Unsynchronized,
    /// A single mutex scoped to the whole critical section.
    Exclusive,
    /// A first-class re-entrant [`ExplicitLock`] around the critical section.
    Explicit,
    /// A single hardware atomic per increment; exact without any lock.
    Atomic,
}

enum Discipline {
    Unsynchronized,
    Exclusive(Mutex<()>),
    Explicit(ExplicitLock),
    Atomic,
}

pub struct Counter {
    value: AtomicI64,
    strategy: Strategy,
    discipline: Discipline,
}

impl Counter {
    /// A fresh counter at zero.
    pub fn new(strategy: Strategy) -> Self {
        let discipline = match strategy {
            Strategy::Unsynchronized => Discipline::Unsynchronized,
            Strategy::Exclusive => Discipline::Exclusive(Mutex::new(())),
            Strategy::Explicit => Discipline::Explicit(ExplicitLock::new()),
            Strategy::Atomic => Discipline::Atomic,
        };
        Self {
            value: AtomicI64::new(0),
            strategy,
            discipline,
        }
    }

    pub fn increment(&self) {
        self.apply(1);
    }

    pub fn decrement(&self) {
        self.apply(-1);
    }

    fn apply(&self, delta: i64) {
        match &self.discipline {
            Discipline::Unsynchronized => {
                // Deliberately racy: the load and the store are independent
                // operations, so a concurrent writer between them is lost.
                let current = self.value.load(Ordering::Relaxed);
                self.value.store(current + delta, Ordering::Relaxed);
            }
            Discipline::Exclusive(section) => {
                let _guard = section.lock().unwrap_or_else(PoisonError::into_inner);
                let current = self.value.load(Ordering::Relaxed);
                self.value.store(current + delta, Ordering::Relaxed);
            }
            Discipline::Explicit(lock) => {
                let _held = lock.acquire();
                let current = self.value.load(Ordering::Relaxed);
                self.value.store(current + delta, Ordering::Relaxed);
            }
            Discipline::Atomic => {
                self.value.fetch_add(delta, Ordering::Relaxed);
            }
        }
    }

    /// Current value. Under the locking and atomic disciplines this reflects
    /// every mutation that completed before the call; under
    /// [`Strategy::Unsynchronized`] visibility is unspecified.
    pub fn get_count(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set_count(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The lock backing the explicit discipline, for sharing or inspection.
    pub fn explicit_lock(&self) -> Option<&ExplicitLock> {
        match &self.discipline {
            Discipline::Explicit(lock) => Some(lock),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_once() {
        let counter = Counter::new(Strategy::Exclusive);
        counter.increment();
        assert_eq!(counter.get_count(), 1);
    }

    #[test]
    fn decrement_goes_negative() {
        let counter = Counter::new(Strategy::Explicit);
        counter.decrement();
        assert_eq!(counter.get_count(), -1);
    }

    #[test]
    fn set_count_overrides_value() {
        let counter = Counter::new(Strategy::Atomic);
        counter.set_count(42);
        assert_eq!(counter.get_count(), 42);
        counter.increment();
        assert_eq!(counter.get_count(), 43);
    }

    #[test]
    fn sequential_increments_are_exact_for_every_strategy() {
        for strategy in [
            Strategy::Unsynchronized,
            Strategy::Exclusive,
            Strategy::Explicit,
            Strategy::Atomic,
        ] {
            let counter = Counter::new(strategy);
            for _ in 0..10 {
                counter.increment();
            }
            assert_eq!(counter.get_count(), 10, "strategy {strategy:?}");
        }
    }

    #[test]
    fn get_count_is_idempotent() {
        let counter = Counter::new(Strategy::Exclusive);
        counter.increment();
        counter.increment();
        let first = counter.get_count();
        assert_eq!(counter.get_count(), first);
        assert_eq!(counter.get_count(), first);
    }

    #[test]
    fn explicit_lock_is_exposed_for_inspection() {
        let counter = Counter::new(Strategy::Explicit);
        let lock = counter.explicit_lock().expect("explicit strategy has a lock");
        assert!(!lock.is_held());

        let held = lock.acquire();
        assert_eq!(lock.hold_count(), 1);
        // Re-entry from the owning thread must not deadlock the counter.
        counter.increment();
        drop(held);

        assert_eq!(counter.get_count(), 1);
        assert!(counter.explicit_lock().is_some());
        assert!(Counter::new(Strategy::Exclusive).explicit_lock().is_none());
    }
}
