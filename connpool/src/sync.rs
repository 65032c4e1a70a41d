use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

// A poisoned lock means some thread panicked while holding it, and the pool bookkeeping can no
// longer be trusted.  We simply crash.
pub(crate) trait MutexExt<T> {
    fn must_lock(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn must_lock(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap()
    }
}

pub(crate) trait CondvarExt {
    fn must_wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T>;

    fn must_wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> MutexGuard<'a, T>;
}

impl CondvarExt for Condvar {
    fn must_wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.wait(guard).unwrap()
    }

    fn must_wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> MutexGuard<'a, T> {
        // Callers re-check the pool state after waking, so whether we timed out does not matter.
        self.wait_timeout(guard, timeout).unwrap().0
    }
}
