//! Deployment topologies
//!
//! Each [`Topology`] hides how connections are obtained for one deployment
//! mode. The command layer only ever asks for "a connection for this access
//! class", "a dedicated connection for these watched keys" or "a pub/sub
//! connection".

mod cluster;
mod pool;
mod sentinel;
mod single;

pub(crate) use cluster::{ClusterNodes, hash_slot};
pub(crate) use pool::NodePool;
pub(crate) use sentinel::SentinelNodes;
pub(crate) use single::SingleNode;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, MultiplexedConnection, PubSub};
use redis::cluster_async::ClusterConnection;
use redis::{
    Cmd, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, Pipeline, RedisConnectionInfo,
    RedisFuture, Value,
};
use std::time::Duration;

use crate::config::{CacheConfig, Mode};
use crate::error::{CacheError, CacheResult, ErrorKind};

/// Which node class a command may be served by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// A connection checked out for one command or one batch
pub(crate) enum Conn {
    Pooled(deadpool_redis::Connection),
    Cluster(ClusterConnection),
    Direct(MultiplexedConnection),
}

impl ConnectionLike for Conn {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Conn::Pooled(conn) => conn.req_packed_command(cmd),
            Conn::Cluster(conn) => conn.req_packed_command(cmd),
            Conn::Direct(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Conn::Pooled(conn) => conn.req_packed_commands(cmd, offset, count),
            Conn::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
            Conn::Direct(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Conn::Pooled(conn) => conn.get_db(),
            Conn::Cluster(conn) => conn.get_db(),
            Conn::Direct(conn) => conn.get_db(),
        }
    }
}

/// Connection source for one deployment mode
#[async_trait]
pub(crate) trait Topology: Send + Sync + 'static {
    fn mode(&self) -> Mode;

    /// Address reported in connection errors for `access`
    fn describe(&self, access: Access) -> String;

    async fn connection(&self, access: Access) -> CacheResult<Conn>;

    /// A connection nobody else will use until it is dropped; required by WATCH.
    async fn watch_connection(&self, keys: &[String]) -> CacheResult<Conn>;

    async fn pubsub(&self) -> CacheResult<PubSub>;

    /// Called after a command on `access` failed with a connection error or
    /// timed out
    async fn on_failure(&self, _access: Access, _kind: ErrorKind) {}

    async fn close(&self);
}

/// Connection info for one node, carrying the configured credentials and db.
pub(crate) fn node_info(addr: &str, config: &CacheConfig, db: i64) -> CacheResult<ConnectionInfo> {
    let mut info = if addr.contains("://") {
        addr.into_connection_info()
            .map_err(|e| CacheError::InvalidArgument(format!("invalid address '{addr}': {e}")))?
    } else {
        let (host, port) = split_host_port(addr)?;
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo::default(),
        }
    };

    if config.username.is_some() {
        info.redis.username = config.username.clone();
    }
    if config.password.is_some() {
        info.redis.password = config.password.clone();
    }
    if db != 0 {
        info.redis.db = db;
    }

    Ok(info)
}

fn split_host_port(addr: &str) -> CacheResult<(String, u16)> {
    let invalid = || CacheError::InvalidArgument(format!("invalid address '{addr}', expected host:port"));

    let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}

/// Open a connection owned by a single caller, bounded by `connect_timeout`.
pub(crate) async fn open_direct(
    info: ConnectionInfo,
    connect_timeout: Duration,
) -> CacheResult<MultiplexedConnection> {
    let addr = info.addr.to_string();
    let client = redis::Client::open(info).map_err(|e| CacheError::connection(&addr, e))?;

    match tokio::time::timeout(connect_timeout, client.get_multiplexed_async_connection()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(CacheError::from_redis("connect", &addr, e, connect_timeout)),
        Err(_) => Err(CacheError::timeout(format!("connect to {addr}"), connect_timeout)),
    }
}

/// Open a pub/sub connection, bounded by `connect_timeout`.
pub(crate) async fn open_pubsub(
    info: ConnectionInfo,
    connect_timeout: Duration,
) -> CacheResult<PubSub> {
    let addr = info.addr.to_string();
    let client = redis::Client::open(info).map_err(|e| CacheError::connection(&addr, e))?;

    match tokio::time::timeout(connect_timeout, client.get_async_pubsub()).await {
        Ok(Ok(pubsub)) => Ok(pubsub),
        Ok(Err(e)) => Err(CacheError::from_redis("subscribe", &addr, e, connect_timeout)),
        Err(_) => Err(CacheError::timeout(format!("connect to {addr}"), connect_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_info_from_host_port() {
        let config = CacheConfig::single("cache.internal:6380").with_auth(None, "pw");
        let info = node_info("cache.internal:6380", &config, 3).unwrap();

        assert_eq!(info.addr.to_string(), "cache.internal:6380");
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("pw"));
        assert_eq!(info.redis.username, None);
    }

    #[test]
    fn test_node_info_accepts_urls() {
        let config = CacheConfig::single("redis://127.0.0.1:6379/2");
        let info = node_info("redis://127.0.0.1:6379/2", &config, 0).unwrap();
        assert_eq!(info.redis.db, 2);
    }

    #[test]
    fn test_node_info_rejects_malformed_addresses() {
        let config = CacheConfig::single("nope");
        for addr in ["nope", ":6379", "host:port", "host:70000"] {
            let err = node_info(addr, &config, 0).unwrap_err();
            assert!(matches!(err, CacheError::InvalidArgument(_)), "{addr}");
        }
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(
            split_host_port("[::1]:6379").unwrap(),
            ("::1".to_string(), 6379)
        );
    }
}
