//! Optimistic transactions (WATCH / MULTI / EXEC)
//!
//! The callback passed to `watch` reads through [`Tx`] on the connection that
//! holds the WATCH, and queues writes. The queued writes are committed in one
//! MULTI/EXEC block after the callback returns; if a watched key changed in
//! the meantime nothing is applied and the call fails with
//! [`CacheError::TxFailed`].
//!
//! ```no_run
//! # use gantry_cache::prelude::*;
//! # async fn example(client: Client) -> CacheResult<()> {
//! client
//!     .watch(
//!         &["balance"],
//!         watch_fn(|tx: Tx| async move {
//!             let balance: i64 = tx.get("balance").await?.and_then(|v| v.parse().ok()).unwrap_or(0);
//!             tx.set("balance", &(balance + 10).to_string(), None).await;
//!             Ok(())
//!         }),
//!     )
//!     .await
//! # }
//! ```

use futures::future::BoxFuture;
use redis::{Cmd, FromRedisValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::commands::ttl_millis;
use crate::error::{CacheError, CacheResult};
use crate::topology::Conn;

/// Callback run while the watched keys are held
pub type WatchFn = Box<dyn FnOnce(Tx) -> BoxFuture<'static, CacheResult<()>> + Send>;

/// Box an async closure as a [`WatchFn`]
pub fn watch_fn<F, Fut>(f: F) -> WatchFn
where
    F: FnOnce(Tx) -> Fut + Send + 'static,
    Fut: Future<Output = CacheResult<()>> + Send + 'static,
{
    Box::new(move |tx| Box::pin(f(tx)))
}

pub(crate) struct TxState {
    pub(crate) conn: Option<Conn>,
    pub(crate) queued: Vec<Cmd>,
}

/// Handle given to a watch callback. Cheap to clone; unusable once the
/// callback has returned.
#[derive(Clone)]
pub struct Tx {
    state: Arc<Mutex<TxState>>,
    addr: Arc<str>,
    report_timeout: Duration,
}

impl Tx {
    pub(crate) fn new(conn: Conn, addr: String, report_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TxState {
                conn: Some(conn),
                queued: Vec::new(),
            })),
            addr: addr.into(),
            report_timeout,
        }
    }

    /// Take the connection and the queued writes, ending the callback's access.
    pub(crate) async fn finish(&self) -> CacheResult<(Conn, Vec<Cmd>)> {
        let mut state = self.state.lock().await;
        let conn = state.conn.take().ok_or(CacheError::Closed)?;
        Ok((conn, std::mem::take(&mut state.queued)))
    }

    /// Run a read on the watched connection right away
    pub async fn query<T: FromRedisValue>(&self, op: &'static str, cmd: &Cmd) -> CacheResult<T> {
        let mut state = self.state.lock().await;
        let conn = state.conn.as_mut().ok_or(CacheError::Closed)?;
        cmd.query_async(conn)
            .await
            .map_err(|e| CacheError::from_redis(op, &self.addr, e, self.report_timeout))
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        self.query("HGET", redis::cmd("HGET").arg(key).arg(field))
            .await
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.query("EXISTS", redis::cmd("EXISTS").arg(key)).await
    }

    /// Queue a write for the commit
    pub async fn queue(&self, cmd: Cmd) {
        self.state.lock().await.queued.push(cmd);
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        self.queue(cmd).await;
    }

    pub async fn del(&self, keys: &[&str]) {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.queue(cmd).await;
    }

    pub async fn hset(&self, key: &str, fields: &[(&str, &str)]) {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(*value);
        }
        self.queue(cmd).await;
    }

    pub async fn incr_by(&self, key: &str, delta: i64) {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(delta);
        self.queue(cmd).await;
    }

    /// Number of writes queued so far
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queued.len()
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").field("addr", &self.addr).finish()
    }
}
