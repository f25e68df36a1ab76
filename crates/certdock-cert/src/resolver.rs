//! Get-or-generate certificate resolution
//!
//! Looks a host up in a store, generates a certificate on a miss and writes
//! the result back before handing it to the caller.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::generator::{GenerateError, Generator};
use crate::storage::{Store, StoreError};
use crate::Certificate;

/// Host used when a client sends no server name
pub const FALLBACK_HOST: &str = "localhost";

/// Setup errors, raised once at construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Certificate generator is not configured")]
    MissingGenerator,

    #[error("Certificate store is not configured")]
    MissingStore,

    #[error("Tiered store needs at least one tier")]
    NoTiers,
}

/// Per-call resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to get certificate for {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to generate certificate for {host}: {source}")]
    Generate {
        host: String,
        #[source]
        source: GenerateError,
    },

    #[error("Failed to store certificate for {host}: {source}")]
    Persist {
        host: String,
        #[source]
        source: StoreError,
    },
}

impl ResolveError {
    /// Host the failed resolution was for, after fallback substitution
    pub fn host(&self) -> &str {
        match self {
            ResolveError::Lookup { host, .. }
            | ResolveError::Generate { host, .. }
            | ResolveError::Persist { host, .. } => host,
        }
    }
}

/// Callback form of a resolver, for per-handshake certificate selection hooks
pub type GetCertificateFn = Arc<dyn Fn(&str) -> Result<Certificate, ResolveError> + Send + Sync>;

/// Get-or-generate-and-persist policy
///
/// Stateless beyond its two dependencies: every call goes to the store, so
/// concurrent calls for the same missing host may each generate, and the
/// last write wins per tier.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use certdock_cert::{CertificateResolver, MemoryStore, SelfSignedGenerator};
///
/// let resolver = CertificateResolver::builder()
///     .generator(Arc::new(SelfSignedGenerator::new()))
///     .store(Arc::new(MemoryStore::new()))
///     .build()
///     .unwrap();
///
/// let cert = resolver.resolve("example.com").unwrap();
/// ```
#[derive(Clone)]
pub struct CertificateResolver {
    generator: Arc<dyn Generator>,
    store: Arc<dyn Store>,
}

impl CertificateResolver {
    pub fn new(generator: Arc<dyn Generator>, store: Arc<dyn Store>) -> Self {
        Self { generator, store }
    }

    pub fn builder() -> CertificateResolverBuilder {
        CertificateResolverBuilder::default()
    }

    /// Return a certificate for `host`, generating and storing one if needed
    ///
    /// 1. An empty host becomes [`FALLBACK_HOST`]
    /// 2. Store lookup; a miss triggers generation, any other failure aborts
    /// 3. The certificate is written back whether it was found or generated
    /// 4. A failed write fails the call
    pub fn resolve(&self, host: &str) -> Result<Certificate, ResolveError> {
        let host = if host.is_empty() { FALLBACK_HOST } else { host };

        let cert = match self.store.get(host) {
            Ok(Some(cert)) => {
                trace!(host = %host, "Certificate found in store");
                cert
            }
            Ok(None) => {
                debug!(host = %host, "No stored certificate, generating");
                self.generator
                    .generate(host)
                    .map_err(|source| ResolveError::Generate {
                        host: host.to_string(),
                        source,
                    })?
            }
            Err(source) => {
                return Err(ResolveError::Lookup {
                    host: host.to_string(),
                    source,
                })
            }
        };

        self.store
            .set(host, &cert)
            .map_err(|source| ResolveError::Persist {
                host: host.to_string(),
                source,
            })?;

        Ok(cert)
    }

    pub fn into_callback(self) -> GetCertificateFn {
        Arc::new(move |host: &str| self.resolve(host))
    }
}

impl std::fmt::Debug for CertificateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateResolver").finish_non_exhaustive()
    }
}

/// Builder that refuses to produce a resolver with a missing dependency
#[derive(Default)]
pub struct CertificateResolverBuilder {
    generator: Option<Arc<dyn Generator>>,
    store: Option<Arc<dyn Store>>,
}

impl CertificateResolverBuilder {
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<CertificateResolver, ConfigError> {
        let generator = self.generator.ok_or(ConfigError::MissingGenerator)?;
        let store = self.store.ok_or(ConfigError::MissingStore)?;
        Ok(CertificateResolver::new(generator, store))
    }
}
