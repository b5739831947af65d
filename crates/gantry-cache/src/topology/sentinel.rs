//! Primary/replica set discovered through sentinels
//!
//! The master is resolved at construction and again whenever a command fails
//! at the connection level, so a failover is picked up without restarting.
//! With read/write splitting enabled, read-only commands are served by a
//! replica pool, falling back to the master when no replica is reachable. A
//! replica that stops answering is dropped and a replacement is looked up in
//! the background.

use async_trait::async_trait;
use redis::aio::PubSub;
use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{ConnectionInfo, RedisConnectionInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{Access, Conn, NodePool, Topology, node_info, open_pubsub};
use crate::config::{CacheConfig, Mode};
use crate::error::{CacheError, CacheResult, ErrorKind};

/// Longest a read waits for a replica connection before using the master
const REPLICA_CHECKOUT_LIMIT: Duration = Duration::from_millis(500);

/// Pause after a failed replica lookup before another one may start
const REPLICA_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum Role {
    Master,
    Replica,
}

/// What every lookup needs: the sentinels and the data-node credentials
struct Discovery {
    config: CacheConfig,
    sentinel: Mutex<Sentinel>,
    node_auth: SentinelNodeConnectionInfo,
}

impl Discovery {
    async fn resolve(&self, role: Role) -> CacheResult<ConnectionInfo> {
        let mut sentinel = self.sentinel.lock().await;
        resolve(&mut sentinel, &self.config, &self.node_auth, role).await
    }
}

/// The replica serving reads. Emptied when it fails, refilled by a
/// background lookup.
struct ReplicaSlot {
    discovery: Arc<Discovery>,
    pool: RwLock<Option<Arc<NodePool>>>,
    refreshing: AtomicBool,
    closed: AtomicBool,
}

impl ReplicaSlot {
    async fn current(&self) -> Option<Arc<NodePool>> {
        self.pool.read().await.clone()
    }

    /// Drop `stale` if it is still installed and start looking for another.
    async fn retire(self: &Arc<Self>, stale: &Arc<NodePool>) {
        {
            let mut pool = self.pool.write().await;
            if pool.as_ref().is_some_and(|p| Arc::ptr_eq(p, stale)) {
                *pool = None;
                stale.close();
                warn!(addr = %stale.addr(), "replica dropped, reads go to the master");
            }
        }
        self.refresh();
    }

    /// Look a replica up in the background; at most one lookup runs at a time.
    fn refresh(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) || self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }

        let slot = Arc::clone(self);
        tokio::spawn(async move {
            let config = &slot.discovery.config;
            let found = match slot.discovery.resolve(Role::Replica).await {
                Ok(info) => open_pool(info, config).await,
                Err(e) => Err(e),
            };

            match found {
                Ok(pool) => {
                    let mut current = slot.pool.write().await;
                    if !slot.closed.load(Ordering::Acquire) {
                        info!(addr = %pool.addr(), "sentinel replica resolved");
                        if let Some(old) = current.replace(Arc::new(pool)) {
                            old.close();
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        master_name = %config.sentinel.master_name,
                        error = %e,
                        "replica lookup failed, reads stay on the master"
                    );
                    tokio::time::sleep(REPLICA_RETRY_INTERVAL).await;
                }
            }
            slot.refreshing.store(false, Ordering::Release);
        });
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(pool) = self.pool.write().await.take() {
            pool.close();
        }
    }
}

pub(crate) struct SentinelNodes {
    config: CacheConfig,
    discovery: Arc<Discovery>,
    master: RwLock<Arc<NodePool>>,
    master_info: RwLock<ConnectionInfo>,
    // present only with read/write splitting
    replica: Option<Arc<ReplicaSlot>>,
    failover: Mutex<()>,
}

impl SentinelNodes {
    pub(crate) async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let sentinels = config
            .sentinel
            .addrs
            .iter()
            .map(|addr| sentinel_info(addr, config))
            .collect::<CacheResult<Vec<_>>>()?;

        let sentinel = Sentinel::build(sentinels)
            .map_err(|e| CacheError::connection(config.sentinel.addrs.join(","), e))?;

        let node_auth = SentinelNodeConnectionInfo {
            redis_connection_info: Some(RedisConnectionInfo {
                db: config.db,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let discovery = Arc::new(Discovery {
            config: config.clone(),
            sentinel: Mutex::new(sentinel),
            node_auth,
        });

        let master_info = discovery.resolve(Role::Master).await?;
        let master = open_pool(master_info.clone(), config).await?;
        debug!(
            master_name = %config.sentinel.master_name,
            addr = %master.addr(),
            "sentinel master resolved"
        );

        let replica = if config.enable_read_write {
            let mut pool = None;
            match discovery.resolve(Role::Replica).await {
                Ok(info) => match open_pool(info, config).await {
                    Ok(replica) => {
                        debug!(addr = %replica.addr(), "sentinel replica resolved");
                        pool = Some(Arc::new(replica));
                    }
                    Err(e) => {
                        warn!(error = %e, "replica unreachable, reads will be served by the master");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "no replica available, reads will be served by the master");
                }
            }
            Some(Arc::new(ReplicaSlot {
                discovery: discovery.clone(),
                pool: RwLock::new(pool),
                refreshing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }))
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            discovery,
            master: RwLock::new(Arc::new(master)),
            master_info: RwLock::new(master_info),
            replica,
            failover: Mutex::new(()),
        })
    }

    async fn master(&self) -> Arc<NodePool> {
        self.master.read().await.clone()
    }

    /// Connection to the current replica, or `None` when reads should use
    /// the master
    async fn replica_connection(&self) -> Option<Conn> {
        let slot = self.replica.as_ref()?;
        let Some(replica) = slot.current().await else {
            slot.refresh();
            return None;
        };

        // leave room for the master fallback inside the exec deadline
        let mut limit = self.config.connect_timeout().min(REPLICA_CHECKOUT_LIMIT);
        if let Some(exec) = self.config.exec_timeout() {
            limit = limit.min(exec / 2);
        }
        match replica.get_once(limit).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(addr = %replica.addr(), error = %e, "replica checkout failed, reading from master");
                slot.retire(&replica).await;
                None
            }
        }
    }

    async fn follow_failover(&self) {
        // one re-resolution at a time; concurrent failures share its outcome
        let Ok(_guard) = self.failover.try_lock() else {
            return;
        };

        let current = self.master().await.addr().to_string();
        let info = match self.discovery.resolve(Role::Master).await {
            Ok(info) => info,
            Err(e) => {
                warn!(master_name = %self.config.sentinel.master_name, error = %e, "master re-resolution failed");
                return;
            }
        };

        let resolved = info.addr.to_string();
        if resolved == current {
            return;
        }

        match open_pool(info.clone(), &self.config).await {
            Ok(pool) => {
                info!(from = %current, to = %resolved, "sentinel failover, switching master");
                let old = std::mem::replace(&mut *self.master.write().await, Arc::new(pool));
                *self.master_info.write().await = info;
                old.close();
            }
            Err(e) => {
                warn!(addr = %resolved, error = %e, "new master unreachable");
            }
        }
    }
}

async fn resolve(
    sentinel: &mut Sentinel,
    config: &CacheConfig,
    node_auth: &SentinelNodeConnectionInfo,
    role: Role,
) -> CacheResult<ConnectionInfo> {
    let name = config.sentinel.master_name.as_str();
    let timeout = config.connect_timeout();

    let resolved = match role {
        Role::Master => {
            tokio::time::timeout(timeout, sentinel.async_master_for(name, Some(node_auth))).await
        }
        Role::Replica => {
            tokio::time::timeout(timeout, sentinel.async_replica_for(name, Some(node_auth))).await
        }
    };

    match resolved {
        Ok(Ok(client)) => Ok(client.get_connection_info().clone()),
        Ok(Err(e)) => Err(CacheError::from_redis(
            "sentinel lookup",
            &config.sentinel.addrs.join(","),
            e,
            timeout,
        )),
        Err(_) => Err(CacheError::timeout(
            format!("sentinel lookup of {name}"),
            timeout,
        )),
    }
}

async fn open_pool(info: ConnectionInfo, config: &CacheConfig) -> CacheResult<NodePool> {
    let mut pool = NodePool::new(info, config)?;
    drop(pool.get().await?);
    pool.warm_up(config.min_idle_conns).await;
    pool.start_reaper(config.idle_timeout(), config.min_idle_conns);
    Ok(pool)
}

fn sentinel_info(addr: &str, config: &CacheConfig) -> CacheResult<ConnectionInfo> {
    // sentinels have their own password and never the data-node credentials
    let mut info = node_info(addr, &CacheConfig::default(), 0)?;
    info.redis.password = config.sentinel.password.clone();
    Ok(info)
}

#[async_trait]
impl Topology for SentinelNodes {
    fn mode(&self) -> Mode {
        Mode::Sentinel
    }

    fn describe(&self, access: Access) -> String {
        let pool = match (access, &self.replica) {
            (Access::Read, Some(slot)) => slot.pool.try_read().ok().and_then(|p| p.clone()),
            _ => None,
        };
        let pool = pool.or_else(|| self.master.try_read().ok().map(|m| m.clone()));

        match pool {
            Some(pool) => pool.addr().to_string(),
            None => self.config.sentinel.master_name.clone(),
        }
    }

    async fn connection(&self, access: Access) -> CacheResult<Conn> {
        if access == Access::Read {
            if let Some(conn) = self.replica_connection().await {
                return Ok(conn);
            }
        }

        self.master().await.get().await
    }

    async fn watch_connection(&self, _keys: &[String]) -> CacheResult<Conn> {
        self.master().await.detached().await
    }

    async fn pubsub(&self) -> CacheResult<PubSub> {
        let info = self.master_info.read().await.clone();
        open_pubsub(info, self.config.connect_timeout()).await
    }

    async fn on_failure(&self, access: Access, kind: ErrorKind) {
        if access == Access::Read {
            if let Some(slot) = &self.replica {
                if let Some(replica) = slot.current().await {
                    slot.retire(&replica).await;
                }
            }
        }
        if kind == ErrorKind::ConnectionFailed {
            self.follow_failover().await;
        }
    }

    async fn close(&self) {
        self.master().await.close();
        if let Some(slot) = &self.replica {
            slot.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_info_uses_sentinel_password() {
        let mut config = CacheConfig::sentinel("mymaster", ["10.0.0.1:26379"])
            .with_auth(Some("app".into()), "data-pw");
        config.sentinel.password = Some("sentinel-pw".into());

        let info = sentinel_info("10.0.0.1:26379", &config).unwrap();
        assert_eq!(info.redis.password.as_deref(), Some("sentinel-pw"));
        assert_eq!(info.redis.username, None);
        assert_eq!(info.redis.db, 0);
    }

    fn config() -> CacheConfig {
        CacheConfig::sentinel("mymaster", ["127.0.0.1:1"])
            .with_read_write(true)
            .with_defaults()
    }

    fn pool(addr: &str, config: &CacheConfig) -> Arc<NodePool> {
        let info = node_info(addr, config, 0).unwrap();
        Arc::new(NodePool::new(info, config).unwrap())
    }

    fn replica_slot(config: &CacheConfig, installed: Option<Arc<NodePool>>) -> Arc<ReplicaSlot> {
        let sentinels = vec![sentinel_info("127.0.0.1:1", config).unwrap()];
        Arc::new(ReplicaSlot {
            discovery: Arc::new(Discovery {
                config: config.clone(),
                sentinel: Mutex::new(Sentinel::build(sentinels).unwrap()),
                node_auth: SentinelNodeConnectionInfo::default(),
            }),
            pool: RwLock::new(installed),
            refreshing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn test_retire_only_drops_the_installed_replica() {
        let config = config();
        let slot = replica_slot(&config, Some(pool("127.0.0.1:2", &config)));
        let installed = slot.current().await.unwrap();

        let unrelated = pool("127.0.0.1:3", &config);
        slot.retire(&unrelated).await;
        assert!(slot.current().await.is_some());

        slot.retire(&installed).await;
        assert!(slot.current().await.is_none());
        // a replacement lookup is under way
        assert!(slot.refreshing.load(Ordering::Acquire));

        slot.close().await;
    }

    #[tokio::test]
    async fn test_closed_slot_starts_no_lookup() {
        let config = config();
        let slot = replica_slot(&config, Some(pool("127.0.0.1:2", &config)));

        slot.close().await;
        assert!(slot.current().await.is_none());

        slot.refresh();
        assert!(!slot.refreshing.load(Ordering::Acquire));
    }
}
