//! Bounded pool of expensive, reusable resources such as network connections.
//!
//! The pool caps the number of resources that exist at the same time (idle or checked out).  When
//! the cap is reached and nothing is idle, `Pool::acquire` blocks until a resource is released.

mod config;
mod error;
mod pool;
mod resource;
mod sync;

pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::pool::{Guard, Pool, Status};
pub use crate::resource::{Expire, Resource};
