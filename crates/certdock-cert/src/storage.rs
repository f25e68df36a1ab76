//! Certificate storage

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, trace};

use crate::encoding::EncodingError;
use crate::Certificate;

/// Default pre-allocated capacity of a [`MemoryStore`]
pub const DEFAULT_MEMORY_STORE_CAPACITY: usize = 100;

/// Certificate storage errors
///
/// A missing entry is not an error: [`Store::get`] reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Stored certificate encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Storage lock poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    pub fn backend<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(error.into())
    }
}

/// Get/set capability over certificates keyed by host name
///
/// `get` has three outcomes: `Ok(Some(cert))` (found), `Ok(None)` (not
/// found) and `Err(_)` (the backend failed). Implementations must never
/// report a backend failure as `Ok(None)`.
///
/// `set` overwrites any existing entry for the host unconditionally.
pub trait Store: Send + Sync {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError>;

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        (**self).get(host)
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        (**self).set(host, cert)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        (**self).get(host)
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        (**self).set(host, cert)
    }
}

/// In-memory store configuration
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Number of hosts to pre-allocate room for. Not an eviction bound.
    pub capacity: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEMORY_STORE_CAPACITY,
        }
    }
}

/// In-memory certificate store
///
/// Reads share the lock, writes take it exclusively; every lock is held for
/// a single map access.
#[derive(Debug)]
pub struct MemoryStore {
    certificates: RwLock<HashMap<String, Certificate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Zero capacity falls back to [`DEFAULT_MEMORY_STORE_CAPACITY`]
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let capacity = if config.capacity == 0 {
            DEFAULT_MEMORY_STORE_CAPACITY
        } else {
            config.capacity
        };

        Self {
            certificates: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(MemoryStoreConfig { capacity })
    }

    /// Delete a certificate, returning it if present
    pub fn remove(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        debug!(host = %host, "Removing certificate from memory store");
        Ok(self.write()?.remove(host))
    }

    pub fn contains(&self, host: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(host))
    }

    /// List all hosts with certificates
    pub fn hosts(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.is_empty())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Certificate>>, StoreError> {
        self.certificates
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Certificate>>, StoreError> {
        self.certificates
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        trace!(host = %host, "Retrieving certificate from memory store");
        Ok(self.read()?.get(host).cloned())
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        debug!(host = %host, "Storing certificate in memory store");
        let cert = cert.clone();
        self.write()?.insert(host.to_string(), cert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Generator, SelfSignedGenerator};
    use std::thread;

    fn create_test_cert(host: &str) -> Certificate {
        SelfSignedGenerator::new().generate(host).unwrap()
    }

    #[test]
    fn test_certificate_store() {
        let store = MemoryStore::new();
        let cert = create_test_cert("example.com");

        store.set("example.com", &cert).unwrap();
        assert_eq!(store.len().unwrap(), 1);

        let retrieved = store.get("example.com").unwrap().unwrap();
        assert_eq!(retrieved, cert);

        assert!(store.remove("example.com").unwrap().is_some());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_certificate_not_found() {
        let store = MemoryStore::new();
        assert!(store.get("nonexistent.com").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let store = MemoryStore::new();
        let first = create_test_cert("example.com");
        let second = create_test_cert("example.com");

        store.set("example.com", &first).unwrap();
        store.set("example.com", &second).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("example.com").unwrap().unwrap(), second);
    }

    #[test]
    fn test_list_hosts() {
        let store = MemoryStore::with_capacity(0);
        let cert = create_test_cert("example1.com");

        store.set("example1.com", &cert).unwrap();
        store.set("example2.com", &cert).unwrap();
        store.set("example3.com", &cert).unwrap();

        let hosts = store.hosts().unwrap();
        assert_eq!(hosts.len(), 3);
        assert!(hosts.contains(&"example1.com".to_string()));
        assert!(hosts.contains(&"example2.com".to_string()));
        assert!(hosts.contains(&"example3.com".to_string()));
        assert!(store.contains("example2.com").unwrap());
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(MemoryStore::new());
        let cert = create_test_cert("shared.example");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let cert = cert.clone();
                thread::spawn(move || {
                    let host = format!("host-{}.example", i % 4);
                    for _ in 0..50 {
                        store.set(&host, &cert).unwrap();
                        assert!(store.get(&host).unwrap().is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let poisoner = store.clone();

        let _ = thread::spawn(move || {
            let _guard = poisoner.certificates.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(
            store.get("example.com"),
            Err(StoreError::Poisoned(_))
        ));
    }
}
