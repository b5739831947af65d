//! Batched commands with deferred results
//!
//! A [`Pipeline`] only records commands. Each recording method returns a
//! [`Deferred`] handle; nothing is sent until [`Pipeline::exec`], which runs
//! the whole batch in one round trip and fills every handle.
//!
//! A command the server rejects does not sink the batch: its handle yields
//! the [`CacheError::Command`] and the other handles keep their replies.
//! `exec` still reports the first such error once every handle is filled.
//!
//! ```no_run
//! # use gantry_cache::prelude::*;
//! # async fn example(client: Client) -> CacheResult<()> {
//! let mut tx = client.tx_pipeline();
//! tx.set("user:1:name", "ada", None);
//! let visits = tx.query::<i64>(redis::cmd("INCR").arg("user:1:visits"));
//! tx.exec().await?;
//! println!("visits: {}", visits.result()?);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use redis::{Cmd, FromRedisValue, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::commands::ttl_millis;
use crate::error::{CacheError, CacheResult};
use crate::types::Z;

/// Runs a recorded batch against a backend.
///
/// Returns one raw reply per command, server errors included, or
/// [`CacheError::TxFailed`] when a transaction was discarded.
#[async_trait]
pub(crate) trait PipelineExecutor: Send + Sync {
    async fn exec_pipeline(&self, op: &'static str, pipe: redis::Pipeline)
    -> CacheResult<Vec<Value>>;
}

type Slot = Arc<OnceLock<Value>>;

/// Result of one pipelined command, available after [`Pipeline::exec`].
pub struct Deferred<T> {
    op: &'static str,
    slot: Slot,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRedisValue> Deferred<T> {
    /// Decoded reply, or [`CacheError::PipelineNotExecuted`] when the batch
    /// has not run (or failed as a whole). A reply the server rejected comes
    /// back as [`CacheError::Command`].
    pub fn result(&self) -> CacheResult<T> {
        let value = self
            .slot
            .get()
            .ok_or(CacheError::PipelineNotExecuted(self.op))?;
        let value = value
            .clone()
            .extract_error()
            .map_err(|e| CacheError::command(self.op, e))?;
        T::from_redis_value(&value).map_err(|e| CacheError::command(self.op, e))
    }

    /// Raw reply, if the batch has run
    pub fn value(&self) -> Option<&Value> {
        self.slot.get()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            op: self.op,
            slot: self.slot.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("op", &self.op)
            .field("value", &self.slot.get())
            .finish()
    }
}

/// A batch of commands, plain or transactional
pub struct Pipeline {
    executor: Arc<dyn PipelineExecutor>,
    atomic: bool,
    commands: Vec<(&'static str, Cmd, Slot)>,
}

impl Pipeline {
    pub(crate) fn new(executor: Arc<dyn PipelineExecutor>, atomic: bool) -> Self {
        Self {
            executor,
            atomic,
            commands: Vec::new(),
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Record an arbitrary command
    pub fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> Deferred<T> {
        self.push("QUERY", cmd.clone())
    }

    fn push<T>(&mut self, op: &'static str, cmd: Cmd) -> Deferred<T> {
        let slot: Slot = Arc::new(OnceLock::new());
        self.commands.push((op, cmd, slot.clone()));
        Deferred {
            op,
            slot,
            _marker: PhantomData,
        }
    }

    pub fn get(&mut self, key: &str) -> Deferred<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.push("GET", cmd)
    }

    pub fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> Deferred<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        self.push("SET", cmd)
    }

    pub fn del(&mut self, keys: &[&str]) -> Deferred<u64> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.push("DEL", cmd)
    }

    /// A zero `ttl` is rejected up front, as with the direct `expire`, and
    /// nothing is recorded.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> CacheResult<Deferred<bool>> {
        let ms = ttl_millis(Some(ttl)).ok_or_else(|| {
            CacheError::InvalidArgument("expire requires a non-zero ttl".to_string())
        })?;
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ms);
        Ok(self.push("EXPIRE", cmd))
    }

    pub fn hset(&mut self, key: &str, fields: &[(&str, &str)]) -> Deferred<u64> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(*value);
        }
        self.push("HSET", cmd)
    }

    pub fn hget(&mut self, key: &str, field: &str) -> Deferred<Option<String>> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.push("HGET", cmd)
    }

    pub fn hget_all(&mut self, key: &str) -> Deferred<HashMap<String, String>> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.push("HGETALL", cmd)
    }

    pub fn lpush(&mut self, key: &str, values: &[&str]) -> Deferred<u64> {
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key).arg(values);
        self.push("LPUSH", cmd)
    }

    pub fn rpush(&mut self, key: &str, values: &[&str]) -> Deferred<u64> {
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key).arg(values);
        self.push("RPUSH", cmd)
    }

    pub fn sadd(&mut self, key: &str, members: &[&str]) -> Deferred<u64> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(members);
        self.push("SADD", cmd)
    }

    pub fn zadd(&mut self, key: &str, members: &[Z]) -> Deferred<u64> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for z in members {
            cmd.arg(z.score).arg(&z.member);
        }
        self.push("ZADD", cmd)
    }

    pub fn publish(&mut self, channel: &str, message: &str) -> Deferred<u64> {
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(channel).arg(message);
        self.push("PUBLISH", cmd)
    }

    /// Send every recorded command in one round trip and fill the handles.
    ///
    /// For a transactional pipeline the batch is wrapped in MULTI/EXEC. The
    /// pipeline is empty afterwards and can be reused. When the server
    /// rejected some commands every handle is still filled and the first
    /// rejection is returned.
    pub async fn exec(&mut self) -> CacheResult<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let commands = std::mem::take(&mut self.commands);
        let mut pipe = redis::pipe();
        if self.atomic {
            pipe.atomic();
        }
        for (_, cmd, _) in &commands {
            pipe.add_command(cmd.clone());
        }

        let op = if self.atomic { "TX_PIPELINE" } else { "PIPELINE" };
        let replies = self.executor.exec_pipeline(op, pipe).await?;
        fill(commands, replies)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("atomic", &self.atomic)
            .field("queued", &self.commands.len())
            .finish()
    }
}

fn fill(commands: Vec<(&'static str, Cmd, Slot)>, replies: Vec<Value>) -> CacheResult<()> {
    if replies.len() != commands.len() {
        return Err(CacheError::InvalidArgument(format!(
            "pipeline returned {} replies for {} commands",
            replies.len(),
            commands.len()
        )));
    }

    let mut first_error = None;
    for ((op, _, slot), reply) in commands.into_iter().zip(replies) {
        if first_error.is_none() {
            if let Value::ServerError(err) = &reply {
                first_error = Some(CacheError::command(op, err.clone().into()));
            }
        }
        let _ = slot.set(reply);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
