//! Redis-backed certificate store
//!
//! Each host lives under a plain string key, `prefix + host`, holding an
//! encoded certificate record. Every call is one blocking round trip on a
//! fresh connection from the client, bounded by the configured connect and
//! I/O timeouts; concurrent writers race and the last `SET` wins.

use std::time::Duration;

use certdock_cert::{
    decode_from_slice, encode_to_vec, Certificate, CertificateCodec, JsonCodec, Store,
    StoreError,
};
use redis::Commands;
use tracing::{debug, trace};

/// Key prefix used when none is configured
pub const DEFAULT_KEY_PREFIX: &str = "certdock:";

/// Time allowed to establish a connection, including the client handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for a single command to be written or answered
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prepended verbatim to the host name; hosts are not escaped
    pub prefix: String,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Certificate store tier backed by Redis
///
/// # Example
/// ```no_run
/// use certdock_cert::Store;
/// use certdock_cert_redis::RedisStore;
///
/// let store = RedisStore::open("redis://127.0.0.1:6379/0")
///     .unwrap()
///     .with_prefix("mycerts:");
///
/// let cert = store.get("example.com").unwrap();
/// ```
pub struct RedisStore<C = JsonCodec> {
    client: redis::Client,
    prefix: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    codec: C,
}

impl RedisStore<JsonCodec> {
    pub fn new(client: redis::Client) -> Self {
        Self::with_config(client, RedisStoreConfig::default())
    }

    pub fn with_config(client: redis::Client, config: RedisStoreConfig) -> Self {
        Self {
            client,
            prefix: config.prefix,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
            codec: JsonCodec,
        }
    }

    /// Build from a connection URL; no connection is made until first use
    pub fn open(url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self::new(redis::Client::open(url)?))
    }
}

impl<C: CertificateCodec> RedisStore<C> {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Zero durations are rejected by the client, so they are clamped to 1ms
    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        let floor = Duration::from_millis(1);
        self.connect_timeout = connect_timeout.max(floor);
        self.io_timeout = io_timeout.max(floor);
        self
    }

    /// Swap the record codec
    pub fn with_codec<D: CertificateCodec>(self, codec: D) -> RedisStore<D> {
        RedisStore {
            client: self.client,
            prefix: self.prefix,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            codec,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, host: &str) -> String {
        format!("{}{}", self.prefix, host)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(StoreError::backend)?;

        conn.set_read_timeout(Some(self.io_timeout))
            .map_err(StoreError::backend)?;
        conn.set_write_timeout(Some(self.io_timeout))
            .map_err(StoreError::backend)?;

        Ok(conn)
    }
}

impl<C> std::fmt::Debug for RedisStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl<C: CertificateCodec> Store for RedisStore<C> {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        let key = self.key(host);
        trace!(host = %host, key = %key, "Retrieving certificate from redis");

        let mut conn = self.connection()?;
        let value: Option<Vec<u8>> = conn.get(&key).map_err(StoreError::backend)?;

        match value {
            Some(bytes) => Ok(Some(decode_from_slice(&self.codec, &bytes)?)),
            None => Ok(None),
        }
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        let key = self.key(host);
        let bytes = encode_to_vec(&self.codec, cert)?;
        debug!(host = %host, key = %key, "Storing certificate in redis");

        let mut conn = self.connection()?;
        conn.set::<_, _, ()>(&key, bytes)
            .map_err(StoreError::backend)?;

        Ok(())
    }
}
