//! Sharded cluster
//!
//! Regular commands go through the native cluster connection, which routes by
//! hash slot and follows MOVED/ASK redirects. WATCH needs a connection pinned
//! to one master, so the slot owner is looked up explicitly.

use async_trait::async_trait;
use crc16::{State, XMODEM};
use redis::aio::PubSub;
use redis::cluster::{ClusterClient, ClusterClientBuilder};
use redis::cluster_async::ClusterConnection;
use redis::{ConnectionInfo, FromRedisValue, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{Access, Conn, Topology, node_info, open_direct, open_pubsub};
use crate::config::{CacheConfig, Mode};
use crate::error::{CacheError, CacheResult};

/// Total number of hash slots in a cluster
pub const CLUSTER_SLOTS: u16 = 16384;

/// Hash slot of `key`, honouring `{hash tags}`.
pub(crate) fn hash_slot(key: &[u8]) -> u16 {
    State::<XMODEM>::calculate(hash_tag(key)) % CLUSTER_SLOTS
}

fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

pub(crate) struct ClusterNodes {
    config: CacheConfig,
    seeds: Vec<ConnectionInfo>,
    // kept alive for the lifetime of the connection
    _client: ClusterClient,
    // taken on close
    conn: RwLock<Option<ClusterConnection>>,
}

impl ClusterNodes {
    pub(crate) async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let seeds = config
            .cluster
            .addrs
            .iter()
            .map(|addr| node_info(addr, config, 0))
            .collect::<CacheResult<Vec<_>>>()?;
        let seed_list = config.cluster.addrs.join(",");

        let mut builder = ClusterClientBuilder::new(seeds.clone())
            .retries(config.max_retries)
            .min_retry_wait(config.min_retry_backoff_ms)
            .max_retry_wait(config.max_retry_backoff_ms)
            .connection_timeout(config.connect_timeout());
        if let Some(username) = &config.username {
            builder = builder.username(username.clone());
        }
        if let Some(password) = &config.password {
            builder = builder.password(password.clone());
        }

        let client = builder
            .build()
            .map_err(|e| CacheError::connection(&seed_list, e))?;

        let connect_timeout = config.connect_timeout();
        let conn = match tokio::time::timeout(connect_timeout, client.get_async_connection()).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(CacheError::connection(&seed_list, e)),
            Err(_) => {
                return Err(CacheError::timeout(
                    format!("connect to cluster {seed_list}"),
                    connect_timeout,
                ));
            }
        };

        debug!(seeds = %seed_list, "cluster connection ready");

        Ok(Self {
            config: config.clone(),
            seeds,
            _client: client,
            conn: RwLock::new(Some(conn)),
        })
    }

    /// Handle on the shared cluster connection, or `Closed` once closed
    async fn native(&self) -> CacheResult<ClusterConnection> {
        self.conn.read().await.clone().ok_or(CacheError::Closed)
    }

    /// Address of the master serving `slot`, from CLUSTER SLOTS
    async fn slot_owner(&self, slot: u16) -> CacheResult<(String, u16)> {
        let mut conn = self.native().await?;
        let reply: Value = redis::cmd("CLUSTER")
            .arg("SLOTS")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                CacheError::from_redis(
                    "cluster slots",
                    &self.describe(Access::Write),
                    e,
                    self.config.response_timeout(),
                )
            })?;

        let ranges = parse_slot_ranges(&reply)
            .map_err(|e| CacheError::command("cluster slots", e))?;

        ranges
            .into_iter()
            .find(|range| range.start <= slot && slot <= range.end)
            .map(|range| (range.host, range.port))
            .ok_or_else(|| {
                CacheError::connection(
                    self.describe(Access::Write),
                    format!("no master serves slot {slot}"),
                )
            })
    }
}

/// The one slot shared by every watched key
fn watch_slot(keys: &[String]) -> CacheResult<u16> {
    let mut slots = keys.iter().map(|k| hash_slot(k.as_bytes()));
    let Some(slot) = slots.next() else {
        return Err(CacheError::InvalidArgument(
            "watch requires at least one key".to_string(),
        ));
    };
    if slots.any(|s| s != slot) {
        return Err(CacheError::InvalidArgument(
            "watched keys must share one hash slot; use a {hash tag}".to_string(),
        ));
    }
    Ok(slot)
}

#[derive(Debug, PartialEq)]
struct SlotRange {
    start: u16,
    end: u16,
    host: String,
    port: u16,
}

fn parse_slot_ranges(reply: &Value) -> redis::RedisResult<Vec<SlotRange>> {
    let entries: Vec<Value> = FromRedisValue::from_redis_value(reply)?;
    let mut ranges = Vec::with_capacity(entries.len());

    for entry in &entries {
        let items: Vec<Value> = FromRedisValue::from_redis_value(entry)?;
        let (Some(start), Some(end), Some(master)) = (items.first(), items.get(1), items.get(2))
        else {
            continue;
        };
        let master: Vec<Value> = FromRedisValue::from_redis_value(master)?;
        let (Some(host), Some(port)) = (master.first(), master.get(1)) else {
            continue;
        };

        ranges.push(SlotRange {
            start: u16::from_redis_value(start)?,
            end: u16::from_redis_value(end)?,
            host: String::from_redis_value(host)?,
            port: u16::from_redis_value(port)?,
        });
    }

    Ok(ranges)
}

#[async_trait]
impl Topology for ClusterNodes {
    fn mode(&self) -> Mode {
        Mode::Cluster
    }

    fn describe(&self, _access: Access) -> String {
        self.config.cluster.addrs.join(",")
    }

    async fn connection(&self, _access: Access) -> CacheResult<Conn> {
        Ok(Conn::Cluster(self.native().await?))
    }

    async fn watch_connection(&self, keys: &[String]) -> CacheResult<Conn> {
        let slot = watch_slot(keys)?;
        let (mut host, port) = self.slot_owner(slot).await?;
        if host.is_empty() {
            // an empty host means "the node you asked"
            if let Some(seed) = self.seeds.first() {
                if let redis::ConnectionAddr::Tcp(seed_host, _) = &seed.addr {
                    host = seed_host.clone();
                }
            }
        }

        let info = node_info(&format!("{host}:{port}"), &self.config, 0)?;
        let conn = open_direct(info, self.config.connect_timeout()).await?;
        Ok(Conn::Direct(conn))
    }

    async fn pubsub(&self) -> CacheResult<PubSub> {
        if self.conn.read().await.is_none() {
            return Err(CacheError::Closed);
        }
        let mut last_error = None;
        for seed in &self.seeds {
            match open_pubsub(seed.clone(), self.config.connect_timeout()).await {
                Ok(pubsub) => return Ok(pubsub),
                Err(e) => {
                    warn!(addr = %seed.addr, error = %e, "seed unavailable for pub/sub");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(CacheError::EmptyAddrs(Mode::Cluster)))
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.write().await.take() {
            drop(conn);
            debug!(seeds = %self.describe(Access::Write), "cluster connection released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_hash_slot_known_values() {
        assert_eq!(hash_slot(b"123456789"), 12739);
        assert_eq!(hash_slot(b"foo"), 12182);
    }

    #[test]
    fn test_hash_tags() {
        assert_eq!(
            hash_slot(b"{user1000}.following"),
            hash_slot(b"{user1000}.followers")
        );
        assert_eq!(hash_slot(b"{user1000}.following"), hash_slot(b"user1000"));
        // empty tag hashes the whole key
        assert_eq!(hash_tag(b"{}.key"), b"{}.key");
        assert_eq!(hash_tag(b"no-tag"), b"no-tag");
    }

    #[test]
    fn test_watch_slot_requires_one_slot() {
        let tagged = vec!["{cart:7}.items".to_string(), "{cart:7}.total".to_string()];
        assert_eq!(watch_slot(&tagged).unwrap(), hash_slot(b"cart:7"));

        let spread = vec!["foo".to_string(), "bar".to_string()];
        assert_ne!(hash_slot(b"foo"), hash_slot(b"bar"));
        assert!(matches!(
            watch_slot(&spread),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(watch_slot(&[]), Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_slot_ranges() {
        let reply = Value::Array(vec![
            Value::Array(vec![
                Value::Int(0),
                Value::Int(8191),
                Value::Array(vec![bulk("10.0.0.1"), Value::Int(7000), bulk("id-1")]),
                Value::Array(vec![bulk("10.0.0.3"), Value::Int(7002), bulk("id-3")]),
            ]),
            Value::Array(vec![
                Value::Int(8192),
                Value::Int(16383),
                Value::Array(vec![bulk("10.0.0.2"), Value::Int(7001), bulk("id-2")]),
            ]),
        ]);

        let ranges = parse_slot_ranges(&reply).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(
            ranges[1],
            SlotRange {
                start: 8192,
                end: 16383,
                host: "10.0.0.2".into(),
                port: 7001,
            }
        );
    }
}
