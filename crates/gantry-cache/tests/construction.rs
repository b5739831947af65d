//! Client construction failures never hand back a client

use gantry_cache::prelude::*;
use rstest::rstest;
use std::time::Duration;

/// Nothing listens on port 1; keep the retry budget small so refusal is fast.
fn unreachable(mut config: CacheConfig) -> CacheConfig {
    config.max_retries = 1;
    config.retry_delay_ms = 1;
    config.min_retry_backoff_ms = 1;
    config.max_retry_backoff_ms = 2;
    config.conn_timeout_ms = 500;
    config
}

#[rstest]
#[case::single(CacheConfig::single("127.0.0.1:1"))]
#[case::cluster(CacheConfig::cluster(["127.0.0.1:1"]))]
#[case::sentinel(CacheConfig::sentinel("mymaster", ["127.0.0.1:1"]))]
#[tokio::test]
async fn unreachable_endpoints_yield_connection_errors(#[case] config: CacheConfig) {
    let result = tokio::time::timeout(Duration::from_secs(30), new_client(unreachable(config)))
        .await
        .expect("construction should give up on its own");

    match result {
        Err(e) => assert!(is_connection_error(&e), "unexpected error: {e}"),
        Ok(_) => panic!("no client should be returned for an unreachable endpoint"),
    }
}

#[tokio::test]
async fn config_errors_precede_any_io() {
    let err = match new_client(CacheConfig::cluster(Vec::<String>::new())).await {
        Err(e) => e,
        Ok(_) => panic!("empty cluster config must be rejected"),
    };
    assert!(matches!(err, CacheError::EmptyAddrs(Mode::Cluster)));
    assert!(!is_connection_error(&err));

    let err = match new_client(CacheConfig::sentinel(" ", ["127.0.0.1:26379"])).await {
        Err(e) => e,
        Ok(_) => panic!("blank master name must be rejected"),
    };
    assert!(matches!(err, CacheError::EmptyMasterSet));
}

#[tokio::test]
async fn malformed_address_is_an_argument_error() {
    let err = match new_client(unreachable(CacheConfig::single("127.0.0.1:notaport"))).await {
        Err(e) => e,
        Ok(_) => panic!("malformed address must be rejected"),
    };
    assert!(matches!(err, CacheError::InvalidArgument(_)), "got {err:?}");
}
