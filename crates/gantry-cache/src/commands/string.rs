use async_trait::async_trait;
use std::time::Duration;

use super::{require_args, ttl_millis};
use crate::backend::Backend;
use crate::client::StringCommands;
use crate::error::{CacheError, CacheResult};
use crate::topology::{Access, Topology};
use crate::types::{KeyTtl, KeyValue};

const GET: &str = "GET";
const SET: &str = "SET";
const SETNX: &str = "SETNX";
const MGET: &str = "MGET";
const MSET: &str = "MSET";
const DEL: &str = "DEL";
const EXISTS: &str = "EXISTS";
const EXPIRE: &str = "EXPIRE";
const TTL: &str = "TTL";

#[async_trait]
impl<T: Topology> StringCommands for Backend<T> {
    async fn get(&self, key: &str) -> CacheResult<String> {
        self.get_with_exists(key)
            .await?
            .ok_or(CacheError::KeyNotExists)
    }

    async fn get_with_exists(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(GET, Some(key), Access::Read, redis::cmd("GET").arg(key))
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        self.run(SET, Some(key), Access::Write, &cmd).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        let stored: Option<String> = self.run(SETNX, Some(key), Access::Write, &cmd).await?;
        Ok(stored.is_some())
    }

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        require_args(MGET, keys)?;
        self.run(MGET, keys.first().copied(), Access::Read, redis::cmd("MGET").arg(keys))
            .await
    }

    async fn mset(&self, pairs: &[KeyValue]) -> CacheResult<()> {
        require_args(MSET, pairs)?;
        let mut cmd = redis::cmd("MSET");
        for pair in pairs {
            cmd.arg(&pair.key).arg(&pair.value);
        }
        self.run(MSET, Some(&pairs[0].key), Access::Write, &cmd).await
    }

    async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
        require_args(DEL, keys)?;
        self.run(DEL, keys.first().copied(), Access::Write, redis::cmd("DEL").arg(keys))
            .await
    }

    async fn exists(&self, keys: &[&str]) -> CacheResult<u64> {
        require_args(EXISTS, keys)?;
        self.run(EXISTS, keys.first().copied(), Access::Read, redis::cmd("EXISTS").arg(keys))
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let ms = ttl_millis(Some(ttl)).ok_or_else(|| {
            CacheError::InvalidArgument("expire requires a non-zero ttl".to_string())
        })?;
        self.run(EXPIRE, Some(key), Access::Write, redis::cmd("PEXPIRE").arg(key).arg(ms))
            .await
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.run(TTL, Some(key), Access::Read, redis::cmd("PTTL").arg(key))
            .await
    }
}
