//! Cache client configuration
//!
//! One [`CacheConfig`] describes all three deployment modes; [`Mode`] selects
//! which address block is meaningful. Numeric knobs use zero for "unset" and
//! are filled by [`CacheConfig::apply_defaults`].
//!
//! ## Environment Variables
//!
//! [`CacheConfig::from_env`] reads:
//! - `GANTRY_CACHE_MODE` - `single`, `cluster` or `sentinel` (default: single)
//! - `GANTRY_CACHE_ADDR` - single node address, `host:port`
//! - `GANTRY_CACHE_CLUSTER_ADDRS` - comma separated cluster seed nodes
//! - `GANTRY_CACHE_SENTINEL_MASTER` - sentinel master set name
//! - `GANTRY_CACHE_SENTINEL_ADDRS` - comma separated sentinel addresses
//! - `GANTRY_CACHE_SENTINEL_PASSWORD` - password of the sentinel processes
//! - `GANTRY_CACHE_USERNAME` / `GANTRY_CACHE_PASSWORD` / `GANTRY_CACHE_DB`
//! - `GANTRY_CACHE_POOL_SIZE` / `GANTRY_CACHE_MIN_IDLE_CONNS` / `GANTRY_CACHE_IDLE_TIMEOUT_SECS`
//! - `GANTRY_CACHE_CONN_TIMEOUT_MS` / `GANTRY_CACHE_READ_TIMEOUT_MS` /
//!   `GANTRY_CACHE_WRITE_TIMEOUT_MS` / `GANTRY_CACHE_EXEC_TIMEOUT_MS`
//! - `GANTRY_CACHE_MAX_RETRIES` / `GANTRY_CACHE_RETRY_DELAY_MS` /
//!   `GANTRY_CACHE_MIN_RETRY_BACKOFF_MS` / `GANTRY_CACHE_MAX_RETRY_BACKOFF_MS`
//! - `GANTRY_CACHE_ENABLE_TRACE` / `GANTRY_CACHE_ENABLE_READ_WRITE`

use crate::error::{CacheError, CacheResult};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MIN_IDLE_CONNS: usize = 5;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONN_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
pub const DEFAULT_MIN_RETRY_BACKOFF_MS: u64 = 8;
pub const DEFAULT_MAX_RETRY_BACKOFF_MS: u64 = 512;

/// Cache deployment topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Mode {
    /// One standalone node
    #[default]
    Single,
    /// Sharded cluster with client-side slot routing
    Cluster,
    /// Primary/replica set discovered through sentinel processes
    Sentinel,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::Cluster => "cluster",
            Mode::Sentinel => "sentinel",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "standalone" => Ok(Mode::Single),
            "cluster" => Ok(Mode::Cluster),
            "sentinel" | "failover" => Ok(Mode::Sentinel),
            _ => Err(CacheError::InvalidMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Single node address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleConfig {
    pub addr: String,
}

/// Cluster seed nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub addrs: Vec<String>,
}

/// Sentinel discovery settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub master_name: String,
    pub addrs: Vec<String>,
    /// Password of the sentinel processes themselves (not of the data nodes)
    pub password: Option<String>,
}

/// How to reach a cache backend. Read-only once handed to [`crate::new_client`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub mode: Mode,
    pub single: SingleConfig,
    pub cluster: ClusterConfig,
    pub sentinel: SentinelConfig,

    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database, ignored in cluster mode
    pub db: i64,

    pub pool_size: usize,
    pub min_idle_conns: usize,
    pub idle_timeout_secs: u64,

    pub conn_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Per-command deadline; zero means none
    pub exec_timeout_ms: u64,

    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub min_retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,

    pub enable_trace: bool,
    /// Route read-only commands to a replica (sentinel mode only)
    pub enable_read_write: bool,
}

impl CacheConfig {
    /// Config for one standalone node
    pub fn single(addr: impl Into<String>) -> Self {
        Self {
            mode: Mode::Single,
            single: SingleConfig { addr: addr.into() },
            ..Default::default()
        }
    }

    /// Config for a cluster reachable through `addrs`
    pub fn cluster<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::Cluster,
            cluster: ClusterConfig {
                addrs: addrs.into_iter().map(Into::into).collect(),
            },
            ..Default::default()
        }
    }

    /// Config for a sentinel-managed master set
    pub fn sentinel<I, S>(master_name: impl Into<String>, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::Sentinel,
            sentinel: SentinelConfig {
                master_name: master_name.into(),
                addrs: addrs.into_iter().map(Into::into).collect(),
                password: None,
            },
            ..Default::default()
        }
    }

    /// Set authentication credentials
    #[must_use]
    pub fn with_auth(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    /// Select the logical database
    #[must_use]
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set connection pool size
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the per-command deadline
    #[must_use]
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable per-command spans
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_trace = enabled;
        self
    }

    /// Enable replica reads (sentinel mode)
    #[must_use]
    pub fn with_read_write(mut self, enabled: bool) -> Self {
        self.enable_read_write = enabled;
        self
    }

    /// Check that the address block required by `mode` is populated.
    pub fn validate(&self) -> CacheResult<()> {
        match self.mode {
            Mode::Single => {
                if self.single.addr.trim().is_empty() {
                    return Err(CacheError::EmptyAddrs(Mode::Single));
                }
            }
            Mode::Cluster => {
                if self.cluster.addrs.is_empty() {
                    return Err(CacheError::EmptyAddrs(Mode::Cluster));
                }
            }
            Mode::Sentinel => {
                if self.sentinel.addrs.is_empty() {
                    return Err(CacheError::EmptyAddrs(Mode::Sentinel));
                }
                if self.sentinel.master_name.trim().is_empty() {
                    return Err(CacheError::EmptyMasterSet);
                }
            }
        }

        Ok(())
    }

    /// Fill every zero-valued knob with its default. Never overwrites a set value.
    pub fn apply_defaults(&mut self) {
        fn fill<T: PartialEq + Default>(field: &mut T, default: T) {
            if *field == T::default() {
                *field = default;
            }
        }

        fill(&mut self.pool_size, DEFAULT_POOL_SIZE);
        fill(&mut self.min_idle_conns, DEFAULT_MIN_IDLE_CONNS);
        fill(&mut self.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        fill(&mut self.conn_timeout_ms, DEFAULT_CONN_TIMEOUT_MS);
        fill(&mut self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        fill(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        fill(&mut self.max_retries, DEFAULT_MAX_RETRIES);
        fill(&mut self.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        fill(&mut self.min_retry_backoff_ms, DEFAULT_MIN_RETRY_BACKOFF_MS);
        fill(&mut self.max_retry_backoff_ms, DEFAULT_MAX_RETRY_BACKOFF_MS);
    }

    /// Owned variant of [`CacheConfig::apply_defaults`]
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.apply_defaults();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.conn_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Native response timeout: the longer of the read and write timeouts
    pub fn response_timeout(&self) -> Duration {
        self.read_timeout().max(self.write_timeout())
    }

    /// Per-command deadline, `None` when unset
    pub fn exec_timeout(&self) -> Option<Duration> {
        (self.exec_timeout_ms > 0).then(|| Duration::from_millis(self.exec_timeout_ms))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            min_backoff: Duration::from_millis(self.min_retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_retry_backoff_ms),
        }
    }

    /// Addresses of the selected mode, for logging
    pub fn endpoints(&self) -> Vec<String> {
        match self.mode {
            Mode::Single => vec![self.single.addr.clone()],
            Mode::Cluster => self.cluster.addrs.clone(),
            Mode::Sentinel => self.sentinel.addrs.clone(),
        }
    }

    /// Parse a YAML document with the same shape as the struct.
    ///
    /// An unrecognised `mode` is reported as [`CacheError::InvalidMode`];
    /// any other malformed content as [`CacheError::InvalidArgument`].
    pub fn from_yaml_str(yaml: &str) -> CacheResult<Self> {
        let invalid = |e: serde_yaml::Error| CacheError::InvalidArgument(e.to_string());
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(invalid)?;

        if let Some(mode) = doc.get("mode") {
            match mode.as_str() {
                Some(name) => {
                    name.parse::<Mode>()?;
                }
                None => {
                    let shown = serde_yaml::to_string(mode).unwrap_or_default();
                    return Err(CacheError::InvalidMode(shown.trim().to_string()));
                }
            }
        }

        serde_yaml::from_value(doc).map_err(invalid)
    }

    /// Load configuration from `GANTRY_CACHE_*` environment variables
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("GANTRY_CACHE_MODE") {
            config.mode = mode.parse()?;
        }
        if let Some(addr) = lookup("GANTRY_CACHE_ADDR") {
            config.single.addr = addr;
        }
        if let Some(addrs) = get_env_list(&lookup, "GANTRY_CACHE_CLUSTER_ADDRS") {
            config.cluster.addrs = addrs;
        }
        if let Some(master) = lookup("GANTRY_CACHE_SENTINEL_MASTER") {
            config.sentinel.master_name = master;
        }
        if let Some(addrs) = get_env_list(&lookup, "GANTRY_CACHE_SENTINEL_ADDRS") {
            config.sentinel.addrs = addrs;
        }
        config.sentinel.password = lookup("GANTRY_CACHE_SENTINEL_PASSWORD");
        config.username = lookup("GANTRY_CACHE_USERNAME");
        config.password = lookup("GANTRY_CACHE_PASSWORD");

        if let Some(db) = get_env_parsed(&lookup, "GANTRY_CACHE_DB")? {
            config.db = db;
        }
        if let Some(size) = get_env_parsed(&lookup, "GANTRY_CACHE_POOL_SIZE")? {
            config.pool_size = size;
        }
        if let Some(idle) = get_env_parsed(&lookup, "GANTRY_CACHE_MIN_IDLE_CONNS")? {
            config.min_idle_conns = idle;
        }
        if let Some(secs) = get_env_parsed(&lookup, "GANTRY_CACHE_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout_secs = secs;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_CONN_TIMEOUT_MS")? {
            config.conn_timeout_ms = ms;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_READ_TIMEOUT_MS")? {
            config.read_timeout_ms = ms;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_WRITE_TIMEOUT_MS")? {
            config.write_timeout_ms = ms;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_EXEC_TIMEOUT_MS")? {
            config.exec_timeout_ms = ms;
        }
        if let Some(retries) = get_env_parsed(&lookup, "GANTRY_CACHE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_RETRY_DELAY_MS")? {
            config.retry_delay_ms = ms;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_MIN_RETRY_BACKOFF_MS")? {
            config.min_retry_backoff_ms = ms;
        }
        if let Some(ms) = get_env_parsed(&lookup, "GANTRY_CACHE_MAX_RETRY_BACKOFF_MS")? {
            config.max_retry_backoff_ms = ms;
        }
        if let Some(enabled) = get_env_bool(&lookup, "GANTRY_CACHE_ENABLE_TRACE")? {
            config.enable_trace = enabled;
        }
        if let Some(enabled) = get_env_bool(&lookup, "GANTRY_CACHE_ENABLE_READ_WRITE")? {
            config.enable_read_write = enabled;
        }

        Ok(config)
    }
}

// Environment variable helper functions

fn get_env_list<F>(lookup: &F, key: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

fn get_env_bool<F>(lookup: &F, key: &str) -> CacheResult<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(CacheError::InvalidEnvVar {
                key: key.to_string(),
                message: format!(
                    "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                ),
            }),
        },
        None => Ok(None),
    }
}

fn get_env_parsed<F, T>(lookup: &F, key: &str) -> CacheResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CacheError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid numeric value '{val}': {e}"),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("single".parse::<Mode>().unwrap(), Mode::Single);
        assert_eq!("Standalone".parse::<Mode>().unwrap(), Mode::Single);
        assert_eq!("CLUSTER".parse::<Mode>().unwrap(), Mode::Cluster);
        assert_eq!("failover".parse::<Mode>().unwrap(), Mode::Sentinel);
        assert!(matches!(
            "ring".parse::<Mode>(),
            Err(CacheError::InvalidMode(m)) if m == "ring"
        ));
    }

    #[test]
    fn test_defaults_fill_zero_values() {
        let config = CacheConfig::single("127.0.0.1:6379").with_defaults();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.min_idle_conns, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.read_timeout(), Duration::from_millis(3000));
        assert_eq!(config.write_timeout(), Duration::from_millis(3000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.min_retry_backoff_ms, 8);
        assert_eq!(config.max_retry_backoff_ms, 512);
        assert_eq!(config.exec_timeout(), None);
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut config = CacheConfig::single("127.0.0.1:6379").with_pool_size(42);
        config.read_timeout_ms = 250;
        config.apply_defaults();
        assert_eq!(config.pool_size, 42);
        assert_eq!(config.read_timeout_ms, 250);
    }

    #[test]
    fn test_response_timeout_is_longest_io_timeout() {
        let mut config = CacheConfig::single("127.0.0.1:6379").with_defaults();
        config.write_timeout_ms = 7000;
        assert_eq!(config.response_timeout(), Duration::from_millis(7000));
    }

    #[test]
    fn test_from_lookup() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("GANTRY_CACHE_MODE", "sentinel"),
            ("GANTRY_CACHE_SENTINEL_MASTER", "mymaster"),
            ("GANTRY_CACHE_SENTINEL_ADDRS", "10.0.0.1:26379, 10.0.0.2:26379,"),
            ("GANTRY_CACHE_PASSWORD", "s3cret"),
            ("GANTRY_CACHE_DB", "2"),
            ("GANTRY_CACHE_EXEC_TIMEOUT_MS", "1500"),
            ("GANTRY_CACHE_ENABLE_READ_WRITE", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.mode, Mode::Sentinel);
        assert_eq!(config.sentinel.master_name, "mymaster");
        assert_eq!(config.sentinel.addrs, vec!["10.0.0.1:26379", "10.0.0.2:26379"]);
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert_eq!(config.db, 2);
        assert_eq!(config.exec_timeout(), Some(Duration::from_millis(1500)));
        assert!(config.enable_read_write);
        assert!(!config.enable_trace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = CacheConfig::from_lookup(lookup_from(&[("GANTRY_CACHE_POOL_SIZE", "ten")]))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidEnvVar { ref key, .. } if key == "GANTRY_CACHE_POOL_SIZE"));

        let err = CacheConfig::from_lookup(lookup_from(&[("GANTRY_CACHE_ENABLE_TRACE", "maybe")]))
            .unwrap_err();
        assert!(err.is_config_error());

        let err =
            CacheConfig::from_lookup(lookup_from(&[("GANTRY_CACHE_MODE", "ring")])).unwrap_err();
        assert!(matches!(err, CacheError::InvalidMode(_)));
    }

    #[test]
    fn test_from_yaml() {
        let config = CacheConfig::from_yaml_str(
            r#"
mode: cluster
cluster:
  addrs: ["10.0.0.1:7000", "10.0.0.2:7000"]
pool_size: 20
enable_trace: true
"#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Cluster);
        assert_eq!(config.cluster.addrs.len(), 2);
        assert_eq!(config.pool_size, 20);
        assert!(config.enable_trace);
        assert_eq!(config.min_idle_conns, 0);
    }

    #[test]
    fn test_from_yaml_rejects_unknown_mode() {
        let err = CacheConfig::from_yaml_str("mode: ring\n").unwrap_err();
        assert!(matches!(&err, CacheError::InvalidMode(m) if m == "ring"));
    }

    #[test]
    fn test_endpoints_follow_mode() {
        let config = CacheConfig::cluster(["a:1", "b:2"]);
        assert_eq!(config.endpoints(), vec!["a:1", "b:2"]);
        let config = CacheConfig::single("c:3");
        assert_eq!(config.endpoints(), vec!["c:3"]);
    }
}
