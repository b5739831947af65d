//! Command surface implementation
//!
//! One module per data structure. Each method builds the native command and
//! hands it to [`crate::backend::Backend::run`]; operation names double as
//! span names and as the `command` of a [`crate::error::CommandError`].

mod generic;
mod hash;
mod list;
mod pubsub;
mod scripting;
mod set;
mod sorted_set;
mod string;
mod transaction;

use std::time::Duration;

use crate::error::{CacheError, CacheResult};

/// Reject empty argument lists before they reach the server
pub(crate) fn require_args<T>(op: &str, args: &[T]) -> CacheResult<()> {
    if args.is_empty() {
        return Err(CacheError::InvalidArgument(format!(
            "{op} requires at least one argument"
        )));
    }
    Ok(())
}

/// Milliseconds for PX/PEXPIRE, `None` for no expiry
pub(crate) fn ttl_millis(ttl: Option<Duration>) -> Option<u64> {
    ttl.filter(|d| !d.is_zero())
        .map(|d| (d.as_millis() as u64).max(1))
}
