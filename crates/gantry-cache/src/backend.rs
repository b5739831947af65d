//! The one backend type behind every [`crate::Client`]
//!
//! `Backend<T>` pairs a [`Topology`] with the tracer and deadlines taken from
//! the configuration. Every command funnels through [`Shared::traced`], which
//! opens the span, applies the exec deadline when one is configured, classifies
//! the error and closes the span, so the command modules only describe what to
//! send. Without an exec timeout a command may block as long as the server
//! holds it (BLPOP with a long timeout, for instance); read and write timeouts
//! only bound connection setup and pool recycling.

use async_trait::async_trait;
use gantry_observability::CommandTracer;
use redis::aio::ConnectionLike;
use redis::{Cmd, FromRedisValue, RedisError, RedisResult, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Instrument, debug};

use crate::config::{CacheConfig, Mode};
use crate::error::{CacheError, CacheResult, ErrorKind};
use crate::pipeline::PipelineExecutor;
use crate::topology::{Access, Conn, Topology};

pub(crate) struct Backend<T: Topology> {
    pub(crate) shared: Arc<Shared<T>>,
}

pub(crate) struct Shared<T: Topology> {
    pub(crate) topology: T,
    tracer: CommandTracer,
    exec_timeout: Option<Duration>,
    io_timeout: Duration,
    closed: AtomicBool,
}

impl<T: Topology> Backend<T> {
    pub(crate) fn new(topology: T, config: &CacheConfig, tracer: CommandTracer) -> Self {
        Self {
            shared: Arc::new(Shared {
                topology,
                tracer,
                exec_timeout: config.exec_timeout(),
                io_timeout: config.response_timeout(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Run one command and decode its reply.
    pub(crate) async fn run<R>(
        &self,
        op: &'static str,
        key: Option<&str>,
        access: Access,
        cmd: &Cmd,
    ) -> CacheResult<R>
    where
        R: FromRedisValue + Send,
    {
        self.shared
            .execute(op, key, access, |mut conn| async move {
                cmd.query_async(&mut conn).await
            })
            .await
    }

    pub(crate) fn mode(&self) -> Mode {
        self.shared.topology.mode()
    }

    pub(crate) async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.topology.close().await;
        debug!(mode = %self.mode(), "cache client closed");
    }
}

impl<T: Topology> Shared<T> {
    /// Deadline applied to one operation, `None` when commands are unbounded
    pub(crate) fn deadline(&self) -> Option<Duration> {
        self.exec_timeout
    }

    /// Timeout reported when the native client gives up on its own
    pub(crate) fn report_timeout(&self) -> Duration {
        self.exec_timeout.unwrap_or(self.io_timeout)
    }

    /// Map a native error raised by `op` to the cache taxonomy.
    pub(crate) fn classify(&self, op: &str, access: Access, err: redis::RedisError) -> CacheError {
        CacheError::from_redis(
            op,
            &self.topology.describe(access),
            err,
            self.report_timeout(),
        )
    }

    /// Trace, bound and classify one operation.
    pub(crate) async fn traced<R, Fut>(
        &self,
        op: &'static str,
        key: Option<&str>,
        access: Access,
        call: Fut,
    ) -> CacheResult<R>
    where
        Fut: Future<Output = CacheResult<R>>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }

        let mut span = self.tracer.start(op, key);
        let call = call.instrument(span.span().clone());

        let result = match self.deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::timeout(op, deadline)),
            },
            None => call.await,
        };

        if let Err(err) = &result {
            if matches!(err.kind(), ErrorKind::ConnectionFailed | ErrorKind::Timeout) {
                self.topology.on_failure(access, err.kind()).await;
            }
            span.record_error(err.kind().as_str(), err);
        }
        span.end();

        result
    }

    /// Check out a connection for `access` and hand it to `f`.
    pub(crate) async fn execute<R, F, Fut>(
        &self,
        op: &'static str,
        key: Option<&str>,
        access: Access,
        f: F,
    ) -> CacheResult<R>
    where
        F: FnOnce(Conn) -> Fut,
        Fut: Future<Output = RedisResult<R>>,
    {
        self.traced(op, key, access, async {
            let conn = self.topology.connection(access).await?;
            f(conn).await.map_err(|e| self.classify(op, access, e))
        })
        .await
    }
}

#[async_trait]
impl<T: Topology> PipelineExecutor for Shared<T> {
    async fn exec_pipeline(
        &self,
        op: &'static str,
        pipe: redis::Pipeline,
    ) -> CacheResult<Vec<Value>> {
        // raw replies, so one rejected command does not discard the others
        let count = pipe.len();
        let replies = self
            .execute(op, None, Access::Write, |mut conn| async move {
                if !pipe.is_transaction() {
                    return conn.req_packed_commands(&pipe, 0, count).await.map(Some);
                }
                // skip MULTI and the QUEUED acknowledgements, keep EXEC's reply
                let mut reply = conn.req_packed_commands(&pipe, count + 1, 1).await?;
                match reply.pop() {
                    Some(Value::Array(items)) => Ok(Some(items)),
                    Some(Value::Nil) => Ok(None),
                    _ => Err(RedisError::from((
                        redis::ErrorKind::ResponseError,
                        "unexpected EXEC reply",
                    ))),
                }
            })
            .await?;
        replies.ok_or(CacheError::TxFailed)
    }
}
