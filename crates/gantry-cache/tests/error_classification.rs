//! Error classification survives wrapping by calling code

use gantry_cache::{
    CacheError, ErrorKind, is_command_error, is_connection_error, is_key_not_exists_error,
    is_timeout_error,
};
use std::error::Error;
use std::fmt;

/// What a service layer typically wraps cache errors in
#[derive(Debug)]
struct Context {
    what: &'static str,
    source: CacheError,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl Error for Context {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("request failed")]
struct Outer(#[source] Context);

fn wrap(err: CacheError) -> Outer {
    Outer(Context {
        what: "loading permissions",
        source: err,
    })
}

#[test]
fn key_not_exists_through_two_layers() {
    let err = wrap(CacheError::KeyNotExists);
    assert!(is_key_not_exists_error(&err));
    assert!(!is_command_error(&err));
    assert!(!is_connection_error(&err));
    assert!(!is_timeout_error(&err));
}

#[test]
fn predicates_on_unrelated_errors() {
    let io = std::io::Error::other("disk full");
    assert!(!is_key_not_exists_error(&io));
    assert!(!is_connection_error(&io));
}

#[test]
fn kinds_are_stable_labels() {
    assert_eq!(CacheError::KeyNotExists.kind(), ErrorKind::KeyNotExists);
    assert_eq!(CacheError::TxFailed.kind().as_str(), "tx_failed");
    assert_eq!(CacheError::Closed.kind().as_str(), "closed");
}
