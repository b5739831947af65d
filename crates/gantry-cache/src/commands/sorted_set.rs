use async_trait::async_trait;

use super::require_args;
use crate::backend::Backend;
use crate::client::SortedSetCommands;
use crate::error::{CacheError, CacheResult};
use crate::topology::{Access, Topology};
use crate::types::{Z, zs_from_pairs};

const ZADD: &str = "ZADD";
const ZRANGE: &str = "ZRANGE";
const ZRANGE_WITHSCORES: &str = "ZRANGE WITHSCORES";
const ZREM: &str = "ZREM";
const ZCARD: &str = "ZCARD";
const ZSCORE: &str = "ZSCORE";
const ZRANK: &str = "ZRANK";
const ZREVRANK: &str = "ZREVRANK";

impl<T: Topology> Backend<T> {
    async fn rank(&self, op: &'static str, key: &str, member: &str) -> CacheResult<u64> {
        let rank: Option<u64> = self
            .run(op, Some(key), Access::Read, redis::cmd(op).arg(key).arg(member))
            .await?;
        rank.ok_or(CacheError::KeyNotExists)
    }
}

#[async_trait]
impl<T: Topology> SortedSetCommands for Backend<T> {
    async fn zadd(&self, key: &str, members: &[Z]) -> CacheResult<u64> {
        require_args(ZADD, members)?;
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for z in members {
            cmd.arg(z.score).arg(&z.member);
        }
        self.run(ZADD, Some(key), Access::Write, &cmd).await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
        self.run(
            ZRANGE,
            Some(key),
            Access::Read,
            redis::cmd("ZRANGE").arg(key).arg(start).arg(stop),
        )
        .await
    }

    async fn zrange_with_scores(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Z>> {
        let pairs: Vec<(String, f64)> = self
            .run(
                ZRANGE_WITHSCORES,
                Some(key),
                Access::Read,
                redis::cmd("ZRANGE")
                    .arg(key)
                    .arg(start)
                    .arg(stop)
                    .arg("WITHSCORES"),
            )
            .await?;
        Ok(zs_from_pairs(pairs))
    }

    async fn zrem(&self, key: &str, members: &[&str]) -> CacheResult<u64> {
        require_args(ZREM, members)?;
        self.run(ZREM, Some(key), Access::Write, redis::cmd("ZREM").arg(key).arg(members))
            .await
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        self.run(ZCARD, Some(key), Access::Read, redis::cmd("ZCARD").arg(key))
            .await
    }

    async fn zscore(&self, key: &str, member: &str) -> CacheResult<f64> {
        let score: Option<f64> = self
            .run(ZSCORE, Some(key), Access::Read, redis::cmd("ZSCORE").arg(key).arg(member))
            .await?;
        score.ok_or(CacheError::KeyNotExists)
    }

    async fn zrank(&self, key: &str, member: &str) -> CacheResult<u64> {
        self.rank(ZRANK, key, member).await
    }

    async fn zrevrank(&self, key: &str, member: &str) -> CacheResult<u64> {
        self.rank(ZREVRANK, key, member).await
    }
}
