use async_trait::async_trait;
use redis::Value;

use super::require_args;
use crate::backend::Backend;
use crate::client::TransactionCommands;
use crate::error::{CacheError, CacheResult};
use crate::pipeline::Pipeline;
use crate::topology::{Access, Topology};
use crate::transaction::{Tx, WatchFn};

const WATCH: &str = "WATCH";

#[async_trait]
impl<T: Topology> TransactionCommands for Backend<T> {
    fn tx_pipeline(&self) -> Pipeline {
        Pipeline::new(self.shared.clone(), true)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.shared.clone(), false)
    }

    async fn watch(&self, keys: &[&str], f: WatchFn) -> CacheResult<()> {
        require_args(WATCH, keys)?;
        let shared = &self.shared;
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let addr = shared.topology.describe(Access::Write);

        shared
            .traced(WATCH, keys.first().map(String::as_str), Access::Write, async {
                let mut conn = shared.topology.watch_connection(&keys).await?;
                redis::cmd("WATCH")
                    .arg(&keys)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| shared.classify(WATCH, Access::Write, e))?;

                let tx = Tx::new(conn, addr, shared.report_timeout());
                let outcome = f(tx.clone()).await;
                let (mut conn, queued) = tx.finish().await?;

                // the dedicated connection is dropped on return, which ends the WATCH
                outcome?;
                if queued.is_empty() {
                    return Ok(());
                }

                let mut pipe = redis::pipe();
                pipe.atomic();
                for cmd in queued {
                    pipe.add_command(cmd);
                }
                let committed: Option<Vec<Value>> = pipe
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| shared.classify("EXEC", Access::Write, e))?;

                committed.map(|_| ()).ok_or(CacheError::TxFailed)
            })
            .await
    }
}
