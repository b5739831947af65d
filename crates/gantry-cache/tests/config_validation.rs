//! Configuration validation and defaulting

use gantry_cache::{CacheConfig, CacheError, Mode};
use proptest::prelude::*;
use rstest::rstest;

#[rstest]
#[case::single_empty(CacheConfig::single(""), Mode::Single)]
#[case::single_blank(CacheConfig::single("   "), Mode::Single)]
#[case::cluster_empty(CacheConfig::cluster(Vec::<String>::new()), Mode::Cluster)]
#[case::sentinel_no_addrs(CacheConfig::sentinel("mymaster", Vec::<String>::new()), Mode::Sentinel)]
fn empty_addresses_are_rejected(#[case] config: CacheConfig, #[case] mode: Mode) {
    match config.validate() {
        Err(CacheError::EmptyAddrs(m)) => assert_eq!(m, mode),
        other => panic!("expected EmptyAddrs, got {other:?}"),
    }
}

#[test]
fn empty_master_name_is_rejected() {
    let config = CacheConfig::sentinel("", ["10.0.0.1:26379"]);
    assert!(matches!(config.validate(), Err(CacheError::EmptyMasterSet)));
}

#[rstest]
#[case(CacheConfig::single("127.0.0.1:6379"))]
#[case(CacheConfig::cluster(["10.0.0.1:7000", "10.0.0.2:7000"]))]
#[case(CacheConfig::sentinel("mymaster", ["10.0.0.1:26379"]))]
fn populated_configs_are_valid(#[case] config: CacheConfig) {
    assert!(config.validate().is_ok());
}

#[rstest]
#[case("ring")]
#[case("")]
#[case("clustered")]
fn unknown_modes_are_rejected(#[case] mode: &str) {
    assert!(matches!(mode.parse::<Mode>(), Err(CacheError::InvalidMode(_))));

    let yaml = format!("mode: \"{mode}\"\nsingle:\n  addr: 127.0.0.1:6379\n");
    assert!(matches!(
        CacheConfig::from_yaml_str(&yaml),
        Err(CacheError::InvalidMode(_))
    ));
}

#[test]
fn non_string_mode_in_yaml_is_an_invalid_mode() {
    let err = CacheConfig::from_yaml_str("mode: 3\n").unwrap_err();
    assert!(matches!(&err, CacheError::InvalidMode(m) if m == "3"));
    assert!(err.is_config_error());
}

#[test]
fn malformed_yaml_is_an_invalid_argument() {
    let yaml = "mode: cluster\npool_size: many\n";
    assert!(matches!(
        CacheConfig::from_yaml_str(yaml),
        Err(CacheError::InvalidArgument(_))
    ));
}

#[test]
fn config_errors_are_flagged() {
    let err = CacheConfig::single("").validate().unwrap_err();
    assert!(err.is_config_error());
}

fn arb_config() -> impl Strategy<Value = CacheConfig> {
    (
        (0usize..64, 0usize..16, 0u64..1000),
        (0u64..10_000, 0u64..10_000, 0u64..10_000),
        (0u32..10, 0u64..1000, 0u64..100, 0u64..2000),
    )
        .prop_map(|(pool, timeouts, retries)| {
            let mut config = CacheConfig::single("127.0.0.1:6379");
            (config.pool_size, config.min_idle_conns, config.idle_timeout_secs) = pool;
            (config.conn_timeout_ms, config.read_timeout_ms, config.write_timeout_ms) = timeouts;
            (
                config.max_retries,
                config.retry_delay_ms,
                config.min_retry_backoff_ms,
                config.max_retry_backoff_ms,
            ) = retries;
            config
        })
}

proptest! {
    #[test]
    fn defaulting_is_idempotent(config in arb_config()) {
        let once = config.clone().with_defaults();
        let twice = once.clone().with_defaults();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn defaulting_never_overwrites(config in arb_config()) {
        let filled = config.clone().with_defaults();

        let pairs = [
            (config.pool_size as u64, filled.pool_size as u64),
            (config.min_idle_conns as u64, filled.min_idle_conns as u64),
            (config.idle_timeout_secs, filled.idle_timeout_secs),
            (config.conn_timeout_ms, filled.conn_timeout_ms),
            (config.read_timeout_ms, filled.read_timeout_ms),
            (config.write_timeout_ms, filled.write_timeout_ms),
            (config.max_retries as u64, filled.max_retries as u64),
            (config.retry_delay_ms, filled.retry_delay_ms),
            (config.min_retry_backoff_ms, filled.min_retry_backoff_ms),
            (config.max_retry_backoff_ms, filled.max_retry_backoff_ms),
        ];
        for (before, after) in pairs {
            prop_assert_ne!(after, 0);
            if before != 0 {
                prop_assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn defaulting_leaves_exec_timeout_unset(config in arb_config()) {
        prop_assert_eq!(config.with_defaults().exec_timeout(), None);
    }
}
