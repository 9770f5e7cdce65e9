//! A first-class, re-entrant lock with inspectable state.
//!
//! `std::sync::Mutex` is non-re-entrant: a thread that already holds it
//! deadlocks on a second `lock()`. The explicit-lock discipline needs a lock
//! object that can be shared as a value, re-entered by its owner, and asked
//! how deeply it is held, so this module tracks the owning thread and a hold
//! count on top of a `Mutex` + `Condvar` pair.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Failures while waiting to acquire the lock. Neither variant leaves the
/// lock held by the caller.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock state was poisoned while we waited (a holder panicked).
    #[error("interrupted while waiting for the lock")]
    Interrupted,

    /// The wait bound elapsed before the lock became available.
    #[error("timed out waiting for the lock")]
    Timeout,
}

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    holds: u32,
}

/// A shareable, re-entrant lock. The owning thread may acquire it again
/// without self-deadlock; each acquisition bumps the hold count and each
/// released guard decrements it, freeing the lock at zero.
#[derive(Default)]
pub struct ExplicitLock {
    state: Mutex<LockState>,
    available: Condvar,
}

impl ExplicitLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, blocking until it is free or already owned by the
    /// calling thread.
    pub fn acquire(&self) -> LockGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.holds += 1;
                    return self.guard();
                }
                None => {
                    state.owner = Some(me);
                    state.holds = 1;
                    return self.guard();
                }
                Some(_) => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Non-blocking acquisition attempt.
    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.owner {
            Some(owner) if owner == me => {
                state.holds += 1;
                Some(self.guard())
            }
            None => {
                state.owner = Some(me);
                state.holds = 1;
                Some(self.guard())
            }
            Some(_) => None,
        }
    }

    /// Acquires the lock, waiting at most `limit`.
    ///
    /// Returns [`LockError::Timeout`] once the bound elapses and
    /// [`LockError::Interrupted`] if the lock state was poisoned mid-wait.
    pub fn acquire_timeout(&self, limit: Duration) -> Result<LockGuard<'_>, LockError> {
        let deadline = Instant::now() + limit;
        let me = thread::current().id();
        let mut state = self.state.lock().map_err(|_| LockError::Interrupted)?;
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.holds += 1;
                    return Ok(self.guard());
                }
                None => {
                    state.owner = Some(me);
                    state.holds = 1;
                    return Ok(self.guard());
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::Timeout);
                    }
                    // Spurious wakeups loop back to the owner check above.
                    let (next, _timed_out) = self
                        .available
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| LockError::Interrupted)?;
                    state = next;
                }
            }
        }
    }

    /// How many times the current owner holds the lock (0 when free).
    pub fn hold_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .holds
    }

    pub fn is_held(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
            .is_some()
    }

    fn guard(&self) -> LockGuard<'_> {
        LockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            // notify_all: a timed-out waiter would swallow a single wakeup.
            self.available.notify_all();
        }
    }
}

impl fmt::Debug for ExplicitLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ExplicitLock")
            .field("held", &state.owner.is_some())
            .field("holds", &state.holds)
            .finish()
    }
}

/// Releases one hold on drop. Must stay on the acquiring thread (`!Send`)
/// and must not be held across an `.await`.
pub struct LockGuard<'a> {
    lock: &'a ExplicitLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_and_release() {
        let lock = ExplicitLock::new();
        assert!(!lock.is_held());

        let guard = lock.acquire();
        assert!(lock.is_held());
        assert_eq!(lock.hold_count(), 1);

        drop(guard);
        assert!(!lock.is_held());
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn reentry_does_not_self_deadlock() {
        let lock = ExplicitLock::new();

        let outer = lock.acquire();
        let inner = lock.acquire();
        assert_eq!(lock.hold_count(), 2);

        drop(inner);
        assert!(lock.is_held(), "outer hold must survive inner release");
        assert_eq!(lock.hold_count(), 1);

        drop(outer);
        assert!(!lock.is_held());
    }

    #[test]
    fn try_acquire_fails_while_held_elsewhere() {
        let lock = Arc::new(ExplicitLock::new());
        let guard = lock.acquire();

        let contender = Arc::clone(&lock);
        let outcome = std::thread::spawn(move || contender.try_acquire().is_some())
            .join()
            .unwrap();
        assert!(!outcome, "another thread must not steal a held lock");

        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn acquire_timeout_expires_under_contention() {
        let lock = Arc::new(ExplicitLock::new());
        let guard = lock.acquire();

        let contender = Arc::clone(&lock);
        let result = std::thread::spawn(move || {
            contender.acquire_timeout(Duration::from_millis(50)).err()
        })
        .join()
        .unwrap();
        assert!(matches!(result, Some(LockError::Timeout)));
        // The failed attempt must not have taken the lock over.
        assert_eq!(lock.hold_count(), 1);

        drop(guard);
        assert!(lock.acquire_timeout(Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn blocked_acquire_wakes_on_release() {
        let lock = Arc::new(ExplicitLock::new());
        let guard = lock.acquire();

        let contender = Arc::clone(&lock);
        let waiter = std::thread::spawn(move || {
            let _guard = contender.acquire();
            contender.hold_count()
        });

        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 1);
        assert!(!lock.is_held());
    }
}
