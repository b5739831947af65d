use async_trait::async_trait;
use redis::Value;

use super::require_args;
use crate::backend::Backend;
use crate::client::CacheClient;
use crate::config::Mode;
use crate::error::CacheResult;
use crate::topology::{Access, Topology};

const DO: &str = "DO";
const PING: &str = "PING";

#[async_trait]
impl<T: Topology> CacheClient for Backend<T> {
    async fn do_command(&self, args: &[&str]) -> CacheResult<Value> {
        require_args(DO, args)?;
        let mut cmd = redis::cmd(args[0]);
        cmd.arg(&args[1..]);
        self.run(DO, args.get(1).copied(), Access::Write, &cmd)
            .await
    }

    async fn ping(&self) -> CacheResult<()> {
        let _: String = self
            .run(PING, None, Access::Write, &redis::cmd("PING"))
            .await?;
        Ok(())
    }

    fn mode(&self) -> Mode {
        Backend::mode(self)
    }

    async fn close(&self) {
        Backend::close(self).await
    }
}
