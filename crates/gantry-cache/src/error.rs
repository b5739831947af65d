//! Error taxonomy for cache operations
//!
//! Every failure a caller can observe falls into one of a few classes:
//! configuration problems (reported by [`crate::new_client`] before any I/O),
//! connection-level failures, commands rejected by the server, client-side
//! deadlines, and the "key does not exist" condition. Classification is
//! structural: the `is_*` predicates walk the [`std::error::Error::source`]
//! chain and downcast, so callers may wrap these errors freely.

use crate::config::Mode;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Boxed cause carried by [`ConnectionError`]
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Low-cardinality error classes, usable as span and log labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeyNotExists,
    InvalidMode,
    EmptyAddrs,
    EmptyMasterSet,
    ConnectionFailed,
    CommandFailed,
    Timeout,
    InvalidArgument,
    InvalidConfig,
    TxFailed,
    PipelineNotExecuted,
    Closed,
}

impl ErrorKind {
    /// Get string representation for labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::KeyNotExists => "key_not_exists",
            ErrorKind::InvalidMode => "invalid_mode",
            ErrorKind::EmptyAddrs => "empty_addrs",
            ErrorKind::EmptyMasterSet => "empty_master_set",
            ErrorKind::ConnectionFailed => "connection",
            ErrorKind::CommandFailed => "command",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::TxFailed => "tx_failed",
            ErrorKind::PipelineNotExecuted => "pipeline_not_executed",
            ErrorKind::Closed => "closed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend could not be reached, or a connection broke mid-operation.
#[derive(Debug, Error)]
#[error("connection to {addr} failed: {source}")]
pub struct ConnectionError {
    pub addr: String,
    #[source]
    pub source: BoxError,
}

/// The backend rejected a well-formed request (wrong type, bad argument, ...).
#[derive(Debug, Error)]
#[error("command {command} failed: {source}")]
pub struct CommandError {
    pub command: String,
    #[source]
    pub source: redis::RedisError,
}

/// A client-side deadline elapsed before the backend answered.
#[derive(Debug, Error)]
#[error("{operation} timed out after {timeout:?}")]
pub struct TimeoutError {
    pub operation: String,
    pub timeout: Duration,
}

/// Errors returned by the cache client
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key does not exist")]
    KeyNotExists,

    #[error("invalid cache mode '{0}', expected single, cluster or sentinel")]
    InvalidMode(String),

    #[error("no addresses configured for {0} mode")]
    EmptyAddrs(Mode),

    #[error("sentinel master name is empty")]
    EmptyMasterSet,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("transaction aborted: a watched key was modified")]
    TxFailed,

    #[error("{0} result read before the pipeline was executed")]
    PipelineNotExecuted(&'static str),

    #[error("cache client is closed")]
    Closed,
}

impl CacheError {
    pub(crate) fn connection(addr: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CacheError::Connection(ConnectionError {
            addr: addr.into(),
            source: source.into(),
        })
    }

    pub(crate) fn command(command: impl Into<String>, source: redis::RedisError) -> Self {
        CacheError::Command(CommandError {
            command: command.into(),
            source,
        })
    }

    pub(crate) fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        CacheError::Timeout(TimeoutError {
            operation: operation.into(),
            timeout,
        })
    }

    /// Classify a native client error raised while running `command` against `addr`.
    ///
    /// `deadline` is reported when the native client gave up on its own
    /// response timeout.
    pub(crate) fn from_redis(
        command: &str,
        addr: &str,
        err: redis::RedisError,
        deadline: Duration,
    ) -> Self {
        if err.is_timeout() {
            CacheError::timeout(command, deadline)
        } else if is_connection_level(&err) {
            CacheError::connection(addr, err)
        } else {
            CacheError::command(command, err)
        }
    }

    /// Get the error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::KeyNotExists => ErrorKind::KeyNotExists,
            CacheError::InvalidMode(_) => ErrorKind::InvalidMode,
            CacheError::EmptyAddrs(_) => ErrorKind::EmptyAddrs,
            CacheError::EmptyMasterSet => ErrorKind::EmptyMasterSet,
            CacheError::Connection(_) => ErrorKind::ConnectionFailed,
            CacheError::Command(_) => ErrorKind::CommandFailed,
            CacheError::Timeout(_) => ErrorKind::Timeout,
            CacheError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CacheError::InvalidEnvVar { .. } => ErrorKind::InvalidConfig,
            CacheError::TxFailed => ErrorKind::TxFailed,
            CacheError::PipelineNotExecuted(_) => ErrorKind::PipelineNotExecuted,
            CacheError::Closed => ErrorKind::Closed,
        }
    }

    /// Configuration errors are reported before any I/O happens
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidMode
                | ErrorKind::EmptyAddrs
                | ErrorKind::EmptyMasterSet
                | ErrorKind::InvalidConfig
        )
    }
}

fn is_connection_level(err: &redis::RedisError) -> bool {
    use redis::ErrorKind as Native;

    err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || matches!(
            err.kind(),
            Native::AuthenticationFailed
                | Native::ClusterDown
                | Native::MasterDown
                | Native::MasterNameNotFoundBySentinel
                | Native::NoValidReplicasFoundBySentinel
                | Native::EmptySentinelList
        )
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn StdError + 'static)| (*e).source())
}

fn has_kind(err: &(dyn StdError + 'static), kind: ErrorKind) -> bool {
    chain(err).any(|e| {
        e.downcast_ref::<CacheError>()
            .is_some_and(|cache| cache.kind() == kind)
    })
}

/// True when `err`, or anything it wraps, reports a missing key.
pub fn is_key_not_exists_error(err: &(dyn StdError + 'static)) -> bool {
    has_kind(err, ErrorKind::KeyNotExists)
}

/// True when `err`, or anything it wraps, is a connection-level failure.
pub fn is_connection_error(err: &(dyn StdError + 'static)) -> bool {
    has_kind(err, ErrorKind::ConnectionFailed) || chain(err).any(|e| e.is::<ConnectionError>())
}

/// True when `err`, or anything it wraps, is a command rejected by the backend.
pub fn is_command_error(err: &(dyn StdError + 'static)) -> bool {
    has_kind(err, ErrorKind::CommandFailed) || chain(err).any(|e| e.is::<CommandError>())
}

/// True when `err`, or anything it wraps, is a client-side timeout.
pub fn is_timeout_error(err: &(dyn StdError + 'static)) -> bool {
    has_kind(err, ErrorKind::Timeout) || chain(err).any(|e| e.is::<TimeoutError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("loading user session")]
    struct ServiceError(#[source] CacheError);

    fn response_error() -> redis::RedisError {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ))
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::ConnectionFailed.as_str(), "connection");
        assert_eq!(ErrorKind::CommandFailed.to_string(), "command");
        assert_eq!(CacheError::KeyNotExists.kind(), ErrorKind::KeyNotExists);
    }

    #[test]
    fn test_native_type_error_is_command_error() {
        let err = CacheError::from_redis("hget", "127.0.0.1:6379", response_error(), Duration::ZERO);
        assert_eq!(err.kind(), ErrorKind::CommandFailed);
        assert!(is_command_error(&err));
        assert!(!is_connection_error(&err));
        assert!(err.to_string().contains("hget"));
    }

    #[test]
    fn test_native_io_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CacheError::from_redis(
            "get",
            "127.0.0.1:6379",
            redis::RedisError::from(io),
            Duration::ZERO,
        );
        assert!(is_connection_error(&err));
        assert!(err.to_string().contains("127.0.0.1:6379"));
    }

    #[test]
    fn test_native_timeout_is_timeout_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = CacheError::from_redis(
            "get",
            "127.0.0.1:6379",
            redis::RedisError::from(io),
            Duration::from_millis(3000),
        );
        assert!(is_timeout_error(&err));
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn test_wrapping_keeps_classification() {
        let err = ServiceError(CacheError::command("set", response_error()));
        assert!(is_command_error(&err));
        assert!(!is_timeout_error(&err));

        let err = ServiceError(CacheError::KeyNotExists);
        assert!(is_key_not_exists_error(&err));
        assert!(!is_command_error(&err));
    }

    #[test]
    fn test_structured_errors_expose_cause() {
        let err = CacheError::connection("10.0.0.1:6379", "reset by peer");
        let source = err.source().expect("connection error carries its cause");
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn test_config_errors() {
        assert!(CacheError::EmptyMasterSet.is_config_error());
        assert!(CacheError::EmptyAddrs(Mode::Cluster).is_config_error());
        assert!(!CacheError::TxFailed.is_config_error());
        assert_eq!(
            CacheError::EmptyAddrs(Mode::Cluster).to_string(),
            "no addresses configured for cluster mode"
        );
    }
}
