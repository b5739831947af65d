//! One standalone node behind a connection pool

use async_trait::async_trait;
use redis::ConnectionInfo;
use redis::aio::PubSub;
use std::time::Duration;
use tracing::debug;

use super::{Access, Conn, NodePool, Topology, node_info, open_pubsub};
use crate::config::{CacheConfig, Mode};
use crate::error::CacheResult;

pub(crate) struct SingleNode {
    info: ConnectionInfo,
    pool: NodePool,
    connect_timeout: Duration,
}

impl SingleNode {
    pub(crate) async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let info = node_info(&config.single.addr, config, config.db)?;
        let mut pool = NodePool::new(info.clone(), config)?;

        // fail fast: the first checkout opens the first connection
        drop(pool.get().await?);
        pool.warm_up(config.min_idle_conns).await;
        pool.start_reaper(config.idle_timeout(), config.min_idle_conns);

        debug!(addr = %pool.addr(), pool_size = config.pool_size, "single node pool ready");

        Ok(Self {
            info,
            pool,
            connect_timeout: config.connect_timeout(),
        })
    }
}

#[async_trait]
impl Topology for SingleNode {
    fn mode(&self) -> Mode {
        Mode::Single
    }

    fn describe(&self, _access: Access) -> String {
        self.pool.addr().to_string()
    }

    async fn connection(&self, _access: Access) -> CacheResult<Conn> {
        self.pool.get().await
    }

    async fn watch_connection(&self, _keys: &[String]) -> CacheResult<Conn> {
        self.pool.detached().await
    }

    async fn pubsub(&self) -> CacheResult<PubSub> {
        open_pubsub(self.info.clone(), self.connect_timeout).await
    }

    async fn close(&self) {
        self.pool.close();
    }
}
