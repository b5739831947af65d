use async_trait::async_trait;

use super::require_args;
use crate::backend::Backend;
use crate::client::ListCommands;
use crate::error::{CacheError, CacheResult};
use crate::topology::{Access, Topology};

const LPUSH: &str = "LPUSH";
const RPUSH: &str = "RPUSH";
const LPOP: &str = "LPOP";
const RPOP: &str = "RPOP";
const LRANGE: &str = "LRANGE";
const LLEN: &str = "LLEN";
const LTRIM: &str = "LTRIM";
const LREM: &str = "LREM";

#[async_trait]
impl<T: Topology> ListCommands for Backend<T> {
    async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        require_args(LPUSH, values)?;
        self.run(LPUSH, Some(key), Access::Write, redis::cmd("LPUSH").arg(key).arg(values))
            .await
    }

    async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        require_args(RPUSH, values)?;
        self.run(RPUSH, Some(key), Access::Write, redis::cmd("RPUSH").arg(key).arg(values))
            .await
    }

    async fn lpop(&self, key: &str) -> CacheResult<String> {
        self.lpop_with_exists(key)
            .await?
            .ok_or(CacheError::KeyNotExists)
    }

    async fn lpop_with_exists(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(LPOP, Some(key), Access::Write, redis::cmd("LPOP").arg(key))
            .await
    }

    async fn rpop(&self, key: &str) -> CacheResult<String> {
        self.rpop_with_exists(key)
            .await?
            .ok_or(CacheError::KeyNotExists)
    }

    async fn rpop_with_exists(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(RPOP, Some(key), Access::Write, redis::cmd("RPOP").arg(key))
            .await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
        self.run(
            LRANGE,
            Some(key),
            Access::Read,
            redis::cmd("LRANGE").arg(key).arg(start).arg(stop),
        )
        .await
    }

    async fn llen(&self, key: &str) -> CacheResult<u64> {
        self.run(LLEN, Some(key), Access::Read, redis::cmd("LLEN").arg(key))
            .await
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
        self.run(
            LTRIM,
            Some(key),
            Access::Write,
            redis::cmd("LTRIM").arg(key).arg(start).arg(stop),
        )
        .await
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> CacheResult<u64> {
        self.run(
            LREM,
            Some(key),
            Access::Write,
            redis::cmd("LREM").arg(key).arg(count).arg(value),
        )
        .await
    }
}
