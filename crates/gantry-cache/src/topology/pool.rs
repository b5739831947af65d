//! Pooled connections to one node
//!
//! A thin layer over deadpool-redis that adds the pieces the pool itself does
//! not do: warming up to the idle floor, retiring idle connections, and
//! bounded retries when checking a connection out.

use deadpool_redis::{Config, Pool, PoolConfig, PoolError, Runtime, Timeouts};
use redis::ConnectionInfo;
use std::cell::Cell;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Conn;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::retry::RetryPolicy;

pub(crate) struct NodePool {
    addr: String,
    pool: Pool,
    retry: RetryPolicy,
    connect_timeout: Duration,
    reaper: Option<JoinHandle<()>>,
}

impl NodePool {
    /// Create the pool for `info`. No connection is opened yet.
    pub(crate) fn new(info: ConnectionInfo, config: &CacheConfig) -> CacheResult<Self> {
        let addr = info.addr.to_string();

        let mut pool_config = Config::from_connection_info(info);
        let mut limits = PoolConfig::new(config.pool_size.max(1));
        limits.timeouts = Timeouts {
            wait: Some(config.connect_timeout()),
            create: Some(config.connect_timeout()),
            recycle: Some(config.read_timeout()),
        };
        pool_config.pool = Some(limits);

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::connection(&addr, e))?;

        Ok(Self {
            addr,
            pool,
            retry: config.retry_policy(),
            connect_timeout: config.connect_timeout(),
            reaper: None,
        })
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    /// Check out a connection, retrying connection-level failures.
    pub(crate) async fn get(&self) -> CacheResult<Conn> {
        self.checkout().await.map(Conn::Pooled)
    }

    /// One checkout attempt bounded by `limit`, without retries.
    pub(crate) async fn get_once(&self, limit: Duration) -> CacheResult<Conn> {
        match tokio::time::timeout(limit, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(Conn::Pooled(conn)),
            Ok(Err(e)) => Err(self.pool_error(e)),
            Err(_) => Err(CacheError::timeout(
                format!("connection checkout from {}", self.addr),
                limit,
            )),
        }
    }

    /// A connection removed from the pool for good; it closes when dropped.
    /// WATCH state can then never leak into another caller's commands.
    pub(crate) async fn detached(&self) -> CacheResult<Conn> {
        let conn = self.checkout().await?;
        Ok(Conn::Direct(deadpool_redis::Connection::take(conn)))
    }

    async fn checkout(&self) -> CacheResult<deadpool_redis::Connection> {
        self.retry
            .acquire(&self.addr, || async {
                self.pool.get().await.map_err(|e| self.pool_error(e))
            })
            .await
    }

    fn pool_error(&self, err: PoolError) -> CacheError {
        match err {
            PoolError::Timeout(_) => CacheError::timeout(
                format!("connection checkout from {}", self.addr),
                self.connect_timeout,
            ),
            PoolError::Backend(e) => {
                CacheError::from_redis("connect", &self.addr, e, self.connect_timeout)
            }
            PoolError::Closed => CacheError::Closed,
            other => CacheError::connection(&self.addr, other.to_string()),
        }
    }

    /// Open connections until `min_idle` are sitting in the pool.
    pub(crate) async fn warm_up(&self, min_idle: usize) {
        let target = min_idle.min(self.pool.status().max_size);
        let checkouts = (0..target).map(|_| self.pool.get());
        let results = futures::future::join_all(checkouts).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(addr = %self.addr, failed, target, "could not open all idle connections");
        }
        // dropping the checked out connections returns them to the pool
    }

    /// Retire connections idle for longer than `idle_timeout`, keeping `min_idle`.
    pub(crate) fn start_reaper(&mut self, idle_timeout: Duration, min_idle: usize) {
        if idle_timeout.is_zero() {
            return;
        }

        let pool = self.pool.clone();
        let addr = self.addr.clone();
        let period = (idle_timeout / 2).max(Duration::from_secs(1));

        self.reaper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                let retired = retire_idle(&pool, idle_timeout, min_idle);
                if retired > 0 {
                    debug!(addr = %addr, retired, "retired idle connections");
                }
            }
        }));
    }

    pub(crate) fn close(&self) {
        if let Some(reaper) = &self.reaper {
            reaper.abort();
        }
        self.pool.close();
    }
}

impl Drop for NodePool {
    fn drop(&mut self) {
        self.close();
    }
}

fn retire_idle(pool: &Pool, idle_timeout: Duration, min_idle: usize) -> usize {
    let kept = Cell::new(0usize);
    let result = pool.retain(|_, metrics| {
        if metrics.last_used() < idle_timeout || kept.get() < min_idle {
            kept.set(kept.get() + 1);
            true
        } else {
            false
        }
    });
    result.removed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::node_info;

    fn config() -> CacheConfig {
        CacheConfig::single("127.0.0.1:1")
            .with_pool_size(4)
            .with_defaults()
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        let config = config();
        let info = node_info("127.0.0.1:1", &config, 0).unwrap();
        let pool = NodePool::new(info, &config).unwrap();

        assert_eq!(pool.addr(), "127.0.0.1:1");
        assert_eq!(pool.pool.status().max_size, 4);
        assert_eq!(pool.pool.status().size, 0);
    }

    #[tokio::test]
    async fn test_checkout_from_unreachable_node_is_connection_error() {
        let mut config = config();
        config.max_retries = 1;
        config.retry_delay_ms = 1;
        config.min_retry_backoff_ms = 1;
        config.max_retry_backoff_ms = 1;
        let info = node_info("127.0.0.1:1", &config, 0).unwrap();
        let pool = NodePool::new(info, &config).unwrap();

        let err = match pool.get().await {
            Ok(_) => panic!("nothing listens on port 1"),
            Err(e) => e,
        };
        assert!(crate::error::is_connection_error(&err), "{err}");
    }

    #[tokio::test]
    async fn test_single_checkout_does_not_retry() {
        let mut config = config();
        config.max_retries = 5;
        config.retry_delay_ms = 10_000;
        let info = node_info("127.0.0.1:1", &config, 0).unwrap();
        let pool = NodePool::new(info, &config).unwrap();

        let started = std::time::Instant::now();
        let err = match pool.get_once(Duration::from_millis(500)).await {
            Ok(_) => panic!("nothing listens on port 1"),
            Err(e) => e,
        };
        assert!(
            crate::error::is_connection_error(&err) || crate::error::is_timeout_error(&err),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_pool_reports_closed() {
        let config = config();
        let info = node_info("127.0.0.1:1", &config, 0).unwrap();
        let pool = NodePool::new(info, &config).unwrap();
        pool.close();

        assert!(matches!(pool.get().await, Err(CacheError::Closed)));
    }
}
