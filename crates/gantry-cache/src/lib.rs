//! # Gantry Cache
//!
//! One cache client for the three ways Redis is deployed behind the admin
//! backend: a single node, a sharded cluster, or a primary/replica set behind
//! sentinels. The deployment is chosen by configuration; the command surface
//! is the same for all three.
//!
//! ## Quick start
//!
//! ```no_run
//! use gantry_cache::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> CacheResult<()> {
//! let client = new_client(CacheConfig::single("127.0.0.1:6379")).await?;
//!
//! client.set("session:42", "alice", Some(Duration::from_secs(60))).await?;
//! assert_eq!(client.get("session:42").await?, "alice");
//!
//! match client.get("session:missing").await {
//!     Err(e) if is_key_not_exists_error(&e) => println!("no session"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is one of: configuration problem, connection failure,
//! command rejected by the server, client-side timeout, or missing key. Use
//! the `is_*_error` predicates to tell them apart; they keep working when the
//! error is wrapped by calling code.
//!
//! ## Tracing
//!
//! With `enable_trace` set every command runs inside a `cache.command` span
//! carrying OpenTelemetry attributes. Install a subscriber with
//! [`gantry_observability::init_observability`] to export them.

mod backend;
mod commands;
mod topology;

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pubsub;
pub mod retry;
pub mod transaction;
pub mod types;

pub use client::{
    CacheClient, Client, HashCommands, ListCommands, PubSubCommands, ScriptingCommands,
    SetCommands, SortedSetCommands, StringCommands, TRACER_NAME, TransactionCommands, new_client,
};
pub use config::{CacheConfig, ClusterConfig, Mode, SentinelConfig, SingleConfig};
pub use error::{
    CacheError, CacheResult, CommandError, ConnectionError, ErrorKind, TimeoutError,
    is_command_error, is_connection_error, is_key_not_exists_error, is_timeout_error,
};
pub use pipeline::{Deferred, Pipeline};
pub use pubsub::{Message, Subscription};
pub use retry::RetryPolicy;
pub use transaction::{Tx, WatchFn, watch_fn};
pub use types::{KeyTtl, KeyValue, Z};

/// Native reply type returned by `do_command` and scripting calls
pub use redis::Value;

/// Everything needed to construct a client and call commands on it
pub mod prelude {
    pub use crate::{
        CacheClient, CacheConfig, CacheError, CacheResult, Client, HashCommands, KeyTtl,
        KeyValue, ListCommands, Mode, PubSubCommands, ScriptingCommands, SetCommands,
        SortedSetCommands, StringCommands, TransactionCommands, Tx, Z, is_command_error,
        is_connection_error, is_key_not_exists_error, is_timeout_error, new_client, watch_fn,
    };
}

/// Hash slot a key maps to in cluster mode
pub fn key_slot(key: &str) -> u16 {
    topology::hash_slot(key.as_bytes())
}
