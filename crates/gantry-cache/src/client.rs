//! Public client surface and the factory
//!
//! [`new_client`] is the only way to obtain a [`Client`]. The command surface
//! is split into one trait per data structure; [`CacheClient`] combines them,
//! so `use gantry_cache::prelude::*` brings every method into scope.

use async_trait::async_trait;
use gantry_observability::CommandTracer;
use redis::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::config::{CacheConfig, Mode};
use crate::error::{CacheError, CacheResult, ErrorKind};
use crate::pipeline::Pipeline;
use crate::pubsub::Subscription;
use crate::topology::{ClusterNodes, SentinelNodes, SingleNode, Topology};
use crate::transaction::WatchFn;
use crate::types::{KeyTtl, KeyValue, Z};

/// Name of the tracer handed to backends when tracing is enabled
pub const TRACER_NAME: &str = "gantry-cache";

/// A connected cache client, shareable across tasks
pub type Client = Arc<dyn CacheClient>;

/// String and key commands
#[async_trait]
pub trait StringCommands: Send + Sync {
    /// Value of `key`; [`CacheError::KeyNotExists`] when absent
    async fn get(&self, key: &str) -> CacheResult<String>;
    /// Value of `key`, `None` when absent
    async fn get_with_exists(&self, key: &str) -> CacheResult<Option<String>>;
    /// Store `value`; `ttl` of `None` or zero keeps the key forever
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;
    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<bool>;
    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>>;
    async fn mset(&self, pairs: &[KeyValue]) -> CacheResult<()>;
    /// Number of keys removed
    async fn del(&self, keys: &[&str]) -> CacheResult<u64>;
    /// Number of the given keys that exist
    async fn exists(&self, keys: &[&str]) -> CacheResult<u64>;
    /// Returns false when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;
    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;
}

/// Hash commands
#[async_trait]
pub trait HashCommands: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> CacheResult<String>;
    async fn hget_with_exists(&self, key: &str, field: &str) -> CacheResult<Option<String>>;
    /// Number of fields that were newly created
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<u64>;
    async fn hget_all(&self, key: &str) -> CacheResult<HashMap<String, String>>;
    async fn hdel(&self, key: &str, fields: &[&str]) -> CacheResult<u64>;
    async fn hexists(&self, key: &str, field: &str) -> CacheResult<bool>;
    async fn hkeys(&self, key: &str) -> CacheResult<Vec<String>>;
    async fn hvals(&self, key: &str) -> CacheResult<Vec<String>>;
    async fn hlen(&self, key: &str) -> CacheResult<u64>;
}

/// List commands
#[async_trait]
pub trait ListCommands: Send + Sync {
    /// Length of the list after the push
    async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<u64>;
    async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<u64>;
    async fn lpop(&self, key: &str) -> CacheResult<String>;
    async fn lpop_with_exists(&self, key: &str) -> CacheResult<Option<String>>;
    async fn rpop(&self, key: &str) -> CacheResult<String>;
    async fn rpop_with_exists(&self, key: &str) -> CacheResult<Option<String>>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>>;
    async fn llen(&self, key: &str) -> CacheResult<u64>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()>;
    /// Number of removed elements
    async fn lrem(&self, key: &str, count: i64, value: &str) -> CacheResult<u64>;
}

/// Set commands
#[async_trait]
pub trait SetCommands: Send + Sync {
    async fn sadd(&self, key: &str, members: &[&str]) -> CacheResult<u64>;
    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>>;
    async fn srem(&self, key: &str, members: &[&str]) -> CacheResult<u64>;
    async fn sismember(&self, key: &str, member: &str) -> CacheResult<bool>;
    async fn scard(&self, key: &str) -> CacheResult<u64>;
    async fn sdiff(&self, keys: &[&str]) -> CacheResult<Vec<String>>;
    async fn sinter(&self, keys: &[&str]) -> CacheResult<Vec<String>>;
    async fn sunion(&self, keys: &[&str]) -> CacheResult<Vec<String>>;
}

/// Sorted-set commands
#[async_trait]
pub trait SortedSetCommands: Send + Sync {
    /// Number of members newly added
    async fn zadd(&self, key: &str, members: &[Z]) -> CacheResult<u64>;
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>>;
    /// Members with scores, ascending by score
    async fn zrange_with_scores(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Z>>;
    async fn zrem(&self, key: &str, members: &[&str]) -> CacheResult<u64>;
    async fn zcard(&self, key: &str) -> CacheResult<u64>;
    /// [`CacheError::KeyNotExists`] when the member is absent
    async fn zscore(&self, key: &str, member: &str) -> CacheResult<f64>;
    async fn zrank(&self, key: &str, member: &str) -> CacheResult<u64>;
    async fn zrevrank(&self, key: &str, member: &str) -> CacheResult<u64>;
}

/// Batches and optimistic transactions
#[async_trait]
pub trait TransactionCommands: Send + Sync {
    /// Batch executed atomically inside MULTI/EXEC
    fn tx_pipeline(&self) -> Pipeline;
    /// Batch sent in one round trip without atomicity
    fn pipeline(&self) -> Pipeline;
    /// Run `f` with `keys` watched; its queued writes commit only if none of
    /// the keys changed meanwhile, otherwise [`CacheError::TxFailed`].
    async fn watch(&self, keys: &[&str], f: WatchFn) -> CacheResult<()>;
}

/// Lua scripting
#[async_trait]
pub trait ScriptingCommands: Send + Sync {
    async fn eval(&self, script: &str, keys: &[&str], args: &[&str]) -> CacheResult<Value>;
    async fn eval_sha(&self, sha1: &str, keys: &[&str], args: &[&str]) -> CacheResult<Value>;
    /// SHA1 digest of the loaded script
    async fn script_load(&self, script: &str) -> CacheResult<String>;
}

/// Publish/subscribe
#[async_trait]
pub trait PubSubCommands: Send + Sync {
    async fn subscribe(&self, channels: &[&str]) -> CacheResult<Subscription>;
    async fn psubscribe(&self, patterns: &[&str]) -> CacheResult<Subscription>;
    /// Number of subscribers that received the message
    async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64>;
}

/// The full command surface, identical for every deployment mode
#[async_trait]
pub trait CacheClient:
    StringCommands
    + HashCommands
    + ListCommands
    + SetCommands
    + SortedSetCommands
    + TransactionCommands
    + ScriptingCommands
    + PubSubCommands
{
    /// Send an arbitrary command, e.g. `["INCRBY", "counter", "5"]`
    async fn do_command(&self, args: &[&str]) -> CacheResult<Value>;

    async fn ping(&self) -> CacheResult<()>;

    fn mode(&self) -> Mode;

    /// Release every pooled connection. Later calls fail with [`CacheError::Closed`].
    async fn close(&self);
}

/// Build a connected client for `config`.
///
/// Configuration errors are returned before any I/O. Any failure while
/// connecting or during the liveness check is reported as a connection error
/// and leaves nothing running.
pub async fn new_client(config: CacheConfig) -> CacheResult<Client> {
    config.validate()?;
    let config = config.with_defaults();

    let tracer = if config.enable_trace {
        CommandTracer::named(TRACER_NAME)
    } else {
        CommandTracer::noop()
    };

    debug!(
        mode = %config.mode,
        endpoints = ?config.endpoints(),
        tracing = tracer.is_enabled(),
        "creating cache client"
    );

    let client: Client = match config.mode {
        Mode::Single => {
            let topology = SingleNode::connect(&config)
                .await
                .map_err(|e| construction_error(&config, e))?;
            Arc::new(check_live(topology, &config, tracer).await?)
        }
        Mode::Cluster => {
            let topology = ClusterNodes::connect(&config)
                .await
                .map_err(|e| construction_error(&config, e))?;
            Arc::new(check_live(topology, &config, tracer).await?)
        }
        Mode::Sentinel => {
            let topology = SentinelNodes::connect(&config)
                .await
                .map_err(|e| construction_error(&config, e))?;
            Arc::new(check_live(topology, &config, tracer).await?)
        }
    };

    info!(mode = %config.mode, "cache client connected");
    Ok(client)
}

/// PING once before handing the backend out. Bounded by the read/write
/// timeout even when commands themselves have no deadline.
async fn check_live<T: Topology>(
    topology: T,
    config: &CacheConfig,
    tracer: CommandTracer,
) -> CacheResult<Backend<T>> {
    let backend = Backend::new(topology, config, tracer);
    let limit = config.response_timeout();
    let outcome = match tokio::time::timeout(limit, CacheClient::ping(&backend)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CacheError::timeout("PING", limit)),
    };
    if let Err(e) = outcome {
        backend.close().await;
        return Err(construction_error(config, e));
    }
    Ok(backend)
}

fn construction_error(config: &CacheConfig, err: CacheError) -> CacheError {
    match err.kind() {
        ErrorKind::ConnectionFailed | ErrorKind::InvalidArgument => err,
        _ if err.is_config_error() => err,
        _ => CacheError::connection(config.endpoints().join(","), err),
    }
}
