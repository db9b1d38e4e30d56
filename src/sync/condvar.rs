// Condition variable over `spin::Mutex`
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::Parker;

/// Queue of threads sleeping on a condition.
///
/// Waiters register their waker while still holding the guarded lock and
/// notifiers run with that same lock held, so a notification can never
/// fall between a waiter's predicate check and its sleep.
pub struct CondVar<W> {
    waiters: Mutex<Vec<W>>,
}

impl<W: Clone> CondVar<W> {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Release `guard`, sleep until notified, then reacquire `lock`.
    ///
    /// Wakeups may be spurious; callers re-check their predicate in a loop.
    pub fn wait<'a, T, P>(&self, lock: &'a Mutex<T>, guard: MutexGuard<'a, T>, parker: &P) -> MutexGuard<'a, T>
    where
        P: Parker<Waker = W>,
    {
        self.waiters.lock().push(parker.current_waker());
        drop(guard);
        parker.block();
        lock.lock()
    }

    /// Wake every sleeping thread. Call with the guarded lock held.
    pub fn notify_all<P>(&self, parker: &P)
    where
        P: Parker<Waker = W>,
    {
        let waiters = core::mem::take(&mut *self.waiters.lock());
        for waker in &waiters {
            parker.wake(waker);
        }
    }

    /// Threads currently registered as sleeping
    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl<W: Clone> Default for CondVar<W> {
    fn default() -> Self {
        Self::new()
    }
}
