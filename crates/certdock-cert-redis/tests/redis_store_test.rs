//! Integration tests against a real Redis server
//!
//! These tests use testcontainers to start Redis.
//!
//! To run these tests:
//! ```
//! # Requires Docker to be running
//! cargo test -p certdock-cert-redis --test redis_store_test -- --ignored
//! ```

use std::sync::Arc;

use certdock_cert::{
    CertificateResolver, Generator, MemoryStore, SelfSignedGenerator, Store, StoreError,
    TieredStore,
};
use certdock_cert_redis::RedisStore;
use redis::Commands;
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage,
};

const REDIS_PORT: u16 = 6379;

async fn start_redis() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .with_exposed_port(ContainerPort::Tcp(REDIS_PORT))
        .start()
        .await
        .expect("Failed to start Redis container");

    let port = container
        .get_host_port_ipv4(REDIS_PORT)
        .await
        .expect("Failed to get Redis port");

    (container, format!("redis://127.0.0.1:{}/0", port))
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "Requires Docker"]
async fn test_set_then_get_round_trips() {
    let (_container, url) = start_redis().await;

    tokio::task::spawn_blocking(move || {
        let store = RedisStore::open(&url).unwrap().with_prefix("test:");
        let cert = SelfSignedGenerator::new().generate("example.com").unwrap();

        assert!(store.get("example.com").unwrap().is_none());

        store.set("example.com", &cert).unwrap();
        let fetched = store.get("example.com").unwrap().unwrap();
        assert_eq!(fetched, cert);

        // Stored under the prefixed key as a compact JSON record
        let client = redis::Client::open(url.as_str()).unwrap();
        let mut conn = client.get_connection().unwrap();
        let raw: String = conn.get("test:example.com").unwrap();
        assert!(raw.starts_with("{\"c\":\"-----BEGIN CERTIFICATE-----"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "Requires Docker"]
async fn test_malformed_record_is_encoding_error() {
    let (_container, url) = start_redis().await;

    tokio::task::spawn_blocking(move || {
        let client = redis::Client::open(url.as_str()).unwrap();
        let mut conn = client.get_connection().unwrap();
        let _: () = conn.set("certdock:broken.example", "{\"c\":\"garbage\"}").unwrap();

        let store = RedisStore::open(&url).unwrap();
        assert!(matches!(
            store.get("broken.example"),
            Err(StoreError::Encoding(_))
        ));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "Requires Docker"]
async fn test_resolver_over_memory_and_redis_tiers() {
    let (_container, url) = start_redis().await;

    tokio::task::spawn_blocking(move || {
        let memory = Arc::new(MemoryStore::new());
        let redis_tier = Arc::new(RedisStore::open(&url).unwrap());
        let tiers: Vec<Arc<dyn Store>> = vec![memory.clone(), redis_tier.clone()];
        let store = Arc::new(TieredStore::new(tiers).unwrap());

        let resolver = CertificateResolver::new(Arc::new(SelfSignedGenerator::new()), store);
        let first = resolver.resolve("example.com").unwrap();
        assert_eq!(redis_tier.get("example.com").unwrap().unwrap(), first);

        // A cold memory tier is refilled from Redis without regenerating
        memory.remove("example.com").unwrap();
        let second = resolver.resolve("example.com").unwrap();
        assert_eq!(second, first);
        assert_eq!(memory.get("example.com").unwrap().unwrap(), first);
    })
    .await
    .unwrap();
}
