//! Value types shared by the command surface

use redis::{FromRedisValue, RedisResult, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sorted-set member with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Z {
    pub score: f64,
    pub member: String,
}

impl Z {
    pub fn new(score: f64, member: impl Into<String>) -> Self {
        Self {
            score,
            member: member.into(),
        }
    }
}

/// Key/value pair for multi-key writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValue {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    Persistent,
    /// The key expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Interpret a PTTL reply
    pub fn from_millis(pttl: i64) -> Self {
        match pttl {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms as u64)),
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, KeyTtl::Missing)
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromRedisValue for KeyTtl {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        i64::from_redis_value(v).map(KeyTtl::from_millis)
    }
}

/// Decode a flat `member, score, member, score, ...` reply
pub(crate) fn zs_from_pairs(pairs: Vec<(String, f64)>) -> Vec<Z> {
    pairs
        .into_iter()
        .map(|(member, score)| Z { score, member })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_from_pttl() {
        assert_eq!(KeyTtl::from_millis(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_millis(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_millis(1500),
            KeyTtl::Expires(Duration::from_millis(1500))
        );
        assert!(!KeyTtl::Missing.exists());
        assert!(KeyTtl::Persistent.exists());
        assert_eq!(KeyTtl::Persistent.remaining(), None);
    }

    #[test]
    fn test_key_ttl_from_value() {
        let ttl = KeyTtl::from_redis_value(&Value::Int(250)).unwrap();
        assert_eq!(ttl.remaining(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_pairs_to_z() {
        let zs = zs_from_pairs(vec![("a".into(), 1.0), ("b".into(), 2.5)]);
        assert_eq!(zs, vec![Z::new(1.0, "a"), Z::new(2.5, "b")]);
    }

    #[test]
    fn test_key_value_from_tuple() {
        let kv: KeyValue = ("k", "v").into();
        assert_eq!(kv, KeyValue::new("k", "v"));
    }
}
