use async_trait::async_trait;

use super::require_args;
use crate::backend::Backend;
use crate::client::SetCommands;
use crate::error::CacheResult;
use crate::topology::{Access, Topology};

const SADD: &str = "SADD";
const SMEMBERS: &str = "SMEMBERS";
const SREM: &str = "SREM";
const SISMEMBER: &str = "SISMEMBER";
const SCARD: &str = "SCARD";
const SDIFF: &str = "SDIFF";
const SINTER: &str = "SINTER";
const SUNION: &str = "SUNION";

impl<T: Topology> Backend<T> {
    async fn set_algebra(&self, op: &'static str, keys: &[&str]) -> CacheResult<Vec<String>> {
        require_args(op, keys)?;
        self.run(op, keys.first().copied(), Access::Read, redis::cmd(op).arg(keys))
            .await
    }
}

#[async_trait]
impl<T: Topology> SetCommands for Backend<T> {
    async fn sadd(&self, key: &str, members: &[&str]) -> CacheResult<u64> {
        require_args(SADD, members)?;
        self.run(SADD, Some(key), Access::Write, redis::cmd("SADD").arg(key).arg(members))
            .await
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        self.run(SMEMBERS, Some(key), Access::Read, redis::cmd("SMEMBERS").arg(key))
            .await
    }

    async fn srem(&self, key: &str, members: &[&str]) -> CacheResult<u64> {
        require_args(SREM, members)?;
        self.run(SREM, Some(key), Access::Write, redis::cmd("SREM").arg(key).arg(members))
            .await
    }

    async fn sismember(&self, key: &str, member: &str) -> CacheResult<bool> {
        self.run(
            SISMEMBER,
            Some(key),
            Access::Read,
            redis::cmd("SISMEMBER").arg(key).arg(member),
        )
        .await
    }

    async fn scard(&self, key: &str) -> CacheResult<u64> {
        self.run(SCARD, Some(key), Access::Read, redis::cmd("SCARD").arg(key))
            .await
    }

    async fn sdiff(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.set_algebra(SDIFF, keys).await
    }

    async fn sinter(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.set_algebra(SINTER, keys).await
    }

    async fn sunion(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        self.set_algebra(SUNION, keys).await
    }
}
