use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use scopeguard::ScopeGuard;
use snafu::prelude::*;

use crate::config::Config;
use crate::error::{Error, InvalidMaxCountSnafu, ShutdownSnafu, TimeoutSnafu};
use crate::resource::Resource;
use crate::sync::{CondvarExt, MutexExt};

pub struct Pool<R, E>
where
    R: Resource,
{
    state: Mutex<State<R>>,
    // Notified whenever a resource enters the idle store or a capacity slot is freed.
    available: Condvar,
    retry_backoff: Duration,
    // We use `Box<dyn ...>` here so that the factory type does not leak into the generic
    // parameters of `Pool`.  It has its own lock so that a slow factory does not block releasers.
    make: Mutex<Box<dyn FnMut() -> Result<R, E> + Send>>,
}

#[derive(Debug)]
struct State<R> {
    idle: Vec<R>,
    max_count: usize,
    // Idle and checked-out resources.
    num_open: usize,
    // Capacity slots held by in-flight factory calls.
    num_reserved: usize,
    is_shutdown: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Status {
    pub max_count: usize,
    pub num_open: usize,
    pub num_reserved: usize,
    pub num_idle: usize,
    pub is_shutdown: bool,
}

/// Checked-out resource.
///
/// The resource is released back to the pool when the guard is dropped.
pub struct Guard<'a, R, E>
where
    R: Resource,
{
    resource: Option<R>,
    pool: &'a Pool<R, E>,
}

impl<R, E> Pool<R, E>
where
    R: Resource,
    E: fmt::Display,
{
    pub fn new<F>(max_count: usize, make: F) -> Result<Self, Error>
    where
        F: FnMut() -> Result<R, E> + Send + 'static,
    {
        Self::with_config(&Config::new(max_count), make)
    }

    /// Creates a pool and pre-warms half of its capacity.
    ///
    /// Pre-warming is best-effort; factory errors are logged and otherwise ignored.
    pub fn with_config<F>(config: &Config, mut make: F) -> Result<Self, Error>
    where
        F: FnMut() -> Result<R, E> + Send + 'static,
    {
        let max_count = config.max_count;
        ensure!(max_count > 0, InvalidMaxCountSnafu { max_count });

        let mut idle = Vec::with_capacity(max_count);
        for _ in 0..max_count / 2 {
            match make() {
                Ok(resource) => {
                    tracing::debug!(id = %resource.id(), "prewarm");
                    idle.push(resource);
                }
                Err(error) => tracing::warn!(%error, "prewarm"),
            }
        }
        let num_open = idle.len();

        Ok(Self {
            state: Mutex::new(State {
                idle,
                max_count,
                num_open,
                num_reserved: 0,
                is_shutdown: false,
            }),
            available: Condvar::new(),
            retry_backoff: config.retry_backoff,
            make: Mutex::new(Box::new(make)),
        })
    }

    /// Checks out a resource, blocking until one is available.
    ///
    /// Factory errors are retried indefinitely; the only error returned is `Shutdown`.
    pub fn acquire(&self) -> Result<Guard<'_, R, E>, Error> {
        self.acquire_until(None)
    }

    /// Same as `acquire`, except that it gives up with `Timeout` after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Guard<'_, R, E>, Error> {
        self.acquire_until(Instant::now().checked_add(timeout))
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<Guard<'_, R, E>, Error> {
        let resource = self.get(deadline)?;
        tracing::debug!(id = %resource.id(), "acquire");
        Ok(Guard {
            resource: Some(resource),
            pool: self,
        })
    }

    fn get(&self, deadline: Option<Instant>) -> Result<R, Error> {
        let mut state = self.state.must_lock();
        loop {
            ensure!(!state.is_shutdown, ShutdownSnafu);

            // Liveness is not checked here; inactive resources are discarded on release.
            if let Some(resource) = state.idle.pop() {
                return Ok(resource);
            }

            let timeout = match deadline {
                Some(deadline) => Some(self.remaining(&state, deadline)?),
                None => None,
            };

            state = if state.has_capacity() {
                state.num_reserved += 1;
                drop(state);
                if let Some(resource) = self.make() {
                    return Ok(resource);
                }
                let backoff = timeout.map_or(self.retry_backoff, |t| t.min(self.retry_backoff));
                self.available
                    .must_wait_timeout(self.state.must_lock(), backoff)
            } else {
                match timeout {
                    Some(timeout) => self.available.must_wait_timeout(state, timeout),
                    None => self.available.must_wait(state),
                }
            };
        }
    }

    fn remaining(&self, state: &State<R>, deadline: Instant) -> Result<Duration, Error> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        if timeout.is_zero() {
            // We might have consumed a notification that another waiter could act on.
            if state.can_serve() {
                self.available.notify_one();
            }
            return TimeoutSnafu.fail();
        }
        Ok(timeout)
    }

    /// Calls the factory on a capacity slot that the caller has reserved.
    ///
    /// The reservation is cancelled if the factory fails or panics.
    fn make(&self) -> Option<R> {
        let reservation = scopeguard::guard((), |()| self.cancel_reservation());
        let result = {
            // The factory has no pool bookkeeping to corrupt, so a panic in an earlier call does
            // not prevent us from calling it again.
            let mut make = self.make.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut **make)()
        };
        match result {
            Ok(resource) => {
                ScopeGuard::into_inner(reservation);
                let mut state = self.state.must_lock();
                state.num_reserved -= 1;
                state.num_open += 1;
                drop(state);
                tracing::debug!(id = %resource.id(), "make");
                Some(resource)
            }
            Err(error) => {
                tracing::warn!(%error, "make");
                None
            }
        }
    }

    fn cancel_reservation(&self) {
        self.state.must_lock().num_reserved -= 1;
        self.available.notify_one();
    }
}

impl<R, E> Pool<R, E>
where
    R: Resource,
{
    /// Returns a resource to the pool.
    ///
    /// The resource is closed instead of being kept idle if it is inactive, if the pool is at (or
    /// above) capacity, or if the pool was shut down.  Capacity here counts open resources only,
    /// not slots reserved by in-flight factory calls.
    pub fn release(&self, resource: R) {
        let mut state = self.state.must_lock();
        if state.idle.len() >= state.num_open {
            // Every idle resource is open, so this one is not accounted for.
            tracing::error!(id = %resource.id(), "release resource not checked out from pool");
            close(resource);
            return;
        }
        if state.is_shutdown || state.num_open >= state.max_count || !resource.is_active() {
            state.close(resource);
        } else {
            tracing::debug!(id = %resource.id(), "release");
            state.idle.push(resource);
        }
        drop(state);
        self.available.notify_one();
    }

    /// Closes all idle resources and rejects subsequent acquisitions.
    ///
    /// Checked-out resources are closed when they are released.
    pub fn shutdown(&self) {
        let mut state = self.state.must_lock();
        if !state.is_shutdown {
            tracing::info!(num_open = state.num_open, num_idle = state.idle.len(), "shutdown");
            state.is_shutdown = true;
        }
        while let Some(resource) = state.idle.pop() {
            state.close(resource);
        }
        drop(state);
        self.available.notify_all();
    }

    /// Changes the capacity of the pool.
    ///
    /// When shrinking, surplus idle resources are closed immediately, and surplus checked-out
    /// resources are closed on release.
    pub fn set_max_count(&self, max_count: usize) -> Result<(), Error> {
        ensure!(max_count > 0, InvalidMaxCountSnafu { max_count });
        let mut state = self.state.must_lock();
        ensure!(!state.is_shutdown, ShutdownSnafu);
        tracing::info!(old = state.max_count, new = max_count, "set_max_count");
        state.max_count = max_count;
        while state.num_open + state.num_reserved > state.max_count {
            let Some(resource) = state.idle.pop() else {
                break;
            };
            state.close(resource);
        }
        drop(state);
        self.available.notify_all();
        Ok(())
    }

    pub fn status(&self) -> Status {
        let state = self.state.must_lock();
        Status {
            max_count: state.max_count,
            num_open: state.num_open,
            num_reserved: state.num_reserved,
            num_idle: state.idle.len(),
            is_shutdown: state.is_shutdown,
        }
    }
}

impl<R, E> fmt::Debug for Pool<R, E>
where
    R: Resource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

impl<R, E> Drop for Pool<R, E>
where
    R: Resource,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<R> State<R>
where
    R: Resource,
{
    fn can_serve(&self) -> bool {
        !self.idle.is_empty() || self.has_capacity()
    }

    fn has_capacity(&self) -> bool {
        self.num_open + self.num_reserved < self.max_count
    }

    fn close(&mut self, resource: R) {
        close(resource);
        self.num_open -= 1;
    }
}

fn close<R>(mut resource: R)
where
    R: Resource,
{
    let id = resource.id();
    resource.close();
    tracing::debug!(%id, "close");
}

impl<R, E> Guard<'_, R, E>
where
    R: Resource,
{
    /// Detaches the resource from the guard.
    ///
    /// The resource still counts against the pool capacity; the caller should hand it back with
    /// `Pool::release` eventually.
    pub fn into_inner(mut guard: Self) -> R {
        guard.resource.take().expect("guard resource taken")
    }
}

impl<R, E> fmt::Debug for Guard<'_, R, E>
where
    R: Resource + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.resource).finish()
    }
}

impl<R, E> Deref for Guard<'_, R, E>
where
    R: Resource,
{
    type Target = R;

    fn deref(&self) -> &Self::Target {
        self.resource.as_ref().expect("guard resource taken")
    }
}

impl<R, E> DerefMut for Guard<'_, R, E>
where
    R: Resource,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource.as_mut().expect("guard resource taken")
    }
}

impl<R, E> Drop for Guard<'_, R, E>
where
    R: Resource,
{
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}
