use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Pooled resource.
pub trait Resource {
    type Id: fmt::Display;

    /// Releases the underlying handle.
    ///
    /// The pool calls this at most once per resource and never hands the resource out afterwards.
    fn close(&mut self);

    /// Returns false when the resource should not be reused.
    fn is_active(&self) -> bool;

    /// Identifies the resource in log messages.
    fn id(&self) -> Self::Id;
}

impl<R> Resource for Box<R>
where
    R: Resource + ?Sized,
{
    type Id = R::Id;

    fn close(&mut self) {
        (**self).close()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn id(&self) -> Self::Id {
        (**self).id()
    }
}

/// Resource that becomes inactive after a time-to-live elapses.
#[derive(Debug)]
pub struct Expire<R> {
    resource: R,
    // `None` when the time-to-live is too large to be represented, i.e., never expires.
    expire_at: Option<Instant>,
}

impl<R> Expire<R> {
    pub fn new(resource: R, ttl: Duration) -> Self {
        Self {
            resource,
            expire_at: Instant::now().checked_add(ttl),
        }
    }

    pub fn with_deadline(resource: R, expire_at: Instant) -> Self {
        Self {
            resource,
            expire_at: Some(expire_at),
        }
    }

    pub fn expire_at(&self) -> Option<Instant> {
        self.expire_at
    }

    pub fn into_inner(self) -> R {
        self.resource
    }
}

impl<R> Deref for Expire<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<R> DerefMut for Expire<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.resource
    }
}

impl<R> Resource for Expire<R>
where
    R: Resource,
{
    type Id = R::Id;

    fn close(&mut self) {
        self.resource.close()
    }

    fn is_active(&self) -> bool {
        self.expire_at
            .is_none_or(|expire_at| Instant::now() < expire_at)
            && self.resource.is_active()
    }

    fn id(&self) -> Self::Id {
        self.resource.id()
    }
}
