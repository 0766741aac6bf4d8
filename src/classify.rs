//! Transient-failure classification.
//!
//! [`is_transient`] walks a chain of wrapped errors and stops at the first
//! level that says whether it is temporary. Three kinds of error carry that
//! signal:
//!
//! - [`TemporaryError`], which exchangers (and test fakes) use to state it
//!   explicitly
//! - `std::io::Error`, by its [`ErrorKind`](std::io::ErrorKind)
//! - `reqwest::Error` timeouts
//!
//! Any other error is unwrapped one level and the walk continues. A chain that
//! runs out without a signal is not transient.

use crate::BoxError;
use std::error::Error as StdError;
use std::io;

// Backstop for cycles the identity check cannot see, e.g. through
// duplicated vtables.
const MAX_CHAIN_DEPTH: usize = 4096;

/// An error that states whether retrying the same request may succeed.
///
/// # Examples
///
/// ```
/// use metaclient::classify::{is_transient, TemporaryError};
///
/// let err = TemporaryError::new(true, "connection reset by peer");
/// assert!(is_transient(&err));
/// ```
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct TemporaryError {
    temporary: bool,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TemporaryError {
    /// Creates a new error with the given temporariness.
    pub fn new(temporary: bool, message: impl Into<String>) -> Self {
        Self {
            temporary,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the error this one wraps.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns whether the failure is expected to clear on retry.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

/// Returns `true` if the failure is likely to succeed when retried unchanged.
///
/// A chain that links back to an error it already visited, or runs deeper
/// than 4096 levels, ends the walk with `false`.
pub fn is_transient(err: &(dyn StdError + 'static)) -> bool {
    // Address plus vtable: a by-value newtype shares its address with the
    // error it wraps, so the address alone does not identify a level.
    let mut visited: Vec<*const (dyn StdError + 'static)> = Vec::new();
    let mut current = Some(err);

    while let Some(err) = current {
        let ptr = err as *const (dyn StdError + 'static);
        if visited.len() >= MAX_CHAIN_DEPTH
            || visited.iter().any(|seen| std::ptr::eq(*seen, ptr))
        {
            return false;
        }
        visited.push(ptr);

        if let Some(temporary) = temporary_signal(err) {
            return temporary;
        }
        current = unwrap_once(err);
    }

    false
}

fn temporary_signal(err: &(dyn StdError + 'static)) -> Option<bool> {
    if let Some(err) = err.downcast_ref::<TemporaryError>() {
        return Some(err.is_temporary());
    }
    if let Some(err) = err.downcast_ref::<reqwest::Error>() {
        // Connect and body errors carry the io::Error further down the chain.
        if err.is_timeout() {
            return Some(true);
        }
        return None;
    }
    if let Some(err) = err.downcast_ref::<io::Error>() {
        if is_temporary_kind(err.kind()) {
            return Some(true);
        }
        // A custom io::Error may wrap something more specific.
        if err.get_ref().is_some() {
            return None;
        }
        return Some(false);
    }
    None
}

// io::Error::source() skips the wrapped error of a custom io::Error, so step
// into it explicitly.
fn unwrap_once<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        if let Some(inner) = io_err.get_ref() {
            return Some(inner as &(dyn StdError + 'static));
        }
    }
    err.source()
}

fn is_temporary_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
