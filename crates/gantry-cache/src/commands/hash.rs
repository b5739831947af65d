use async_trait::async_trait;
use std::collections::HashMap;

use super::require_args;
use crate::backend::Backend;
use crate::client::HashCommands;
use crate::error::{CacheError, CacheResult};
use crate::topology::{Access, Topology};

const HGET: &str = "HGET";
const HSET: &str = "HSET";
const HGETALL: &str = "HGETALL";
const HDEL: &str = "HDEL";
const HEXISTS: &str = "HEXISTS";
const HKEYS: &str = "HKEYS";
const HVALS: &str = "HVALS";
const HLEN: &str = "HLEN";

#[async_trait]
impl<T: Topology> HashCommands for Backend<T> {
    async fn hget(&self, key: &str, field: &str) -> CacheResult<String> {
        self.hget_with_exists(key, field)
            .await?
            .ok_or(CacheError::KeyNotExists)
    }

    async fn hget_with_exists(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        self.run(HGET, Some(key), Access::Read, redis::cmd("HGET").arg(key).arg(field))
            .await
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<u64> {
        require_args(HSET, fields)?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(*value);
        }
        self.run(HSET, Some(key), Access::Write, &cmd).await
    }

    async fn hget_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        self.run(HGETALL, Some(key), Access::Read, redis::cmd("HGETALL").arg(key))
            .await
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> CacheResult<u64> {
        require_args(HDEL, fields)?;
        self.run(HDEL, Some(key), Access::Write, redis::cmd("HDEL").arg(key).arg(fields))
            .await
    }

    async fn hexists(&self, key: &str, field: &str) -> CacheResult<bool> {
        self.run(HEXISTS, Some(key), Access::Read, redis::cmd("HEXISTS").arg(key).arg(field))
            .await
    }

    async fn hkeys(&self, key: &str) -> CacheResult<Vec<String>> {
        self.run(HKEYS, Some(key), Access::Read, redis::cmd("HKEYS").arg(key))
            .await
    }

    async fn hvals(&self, key: &str) -> CacheResult<Vec<String>> {
        self.run(HVALS, Some(key), Access::Read, redis::cmd("HVALS").arg(key))
            .await
    }

    async fn hlen(&self, key: &str) -> CacheResult<u64> {
        self.run(HLEN, Some(key), Access::Read, redis::cmd("HLEN").arg(key))
            .await
    }
}
