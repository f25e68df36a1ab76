//! rustls handshake integration
//!
//! Plugs a [`CertificateResolver`] into rustls' per-handshake certificate
//! selection. A failed resolution yields no certificate, which aborts the
//! handshake; there is no fallback identity.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use thiserror::Error;
use tracing::warn;

use crate::resolver::{CertificateResolver, ResolveError};
use crate::CertificateError;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Resolved certificate is unusable: {0}")]
    Certificate(#[from] CertificateError),
}

/// `ResolvesServerCert` backed by a [`CertificateResolver`]
#[derive(Debug)]
pub struct HandshakeResolver {
    resolver: CertificateResolver,
    provider: Arc<CryptoProvider>,
}

impl HandshakeResolver {
    /// Uses the ring crypto provider to load keys
    pub fn new(resolver: CertificateResolver) -> Self {
        Self::with_provider(resolver, Arc::new(rustls::crypto::ring::default_provider()))
    }

    pub fn with_provider(resolver: CertificateResolver, provider: Arc<CryptoProvider>) -> Self {
        Self { resolver, provider }
    }

    /// Resolve the signing bundle for a requested server name
    ///
    /// A missing server name resolves like an empty one.
    pub fn certified_key(
        &self,
        server_name: Option<&str>,
    ) -> Result<Arc<CertifiedKey>, HandshakeError> {
        let cert = self.resolver.resolve(server_name.unwrap_or_default())?;
        Ok(Arc::new(cert.to_certified_key(&self.provider)?))
    }
}

impl ResolvesServerCert for HandshakeResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name();
        match self.certified_key(server_name) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(
                    server_name = server_name.unwrap_or_default(),
                    error = %e,
                    "Certificate resolution failed, aborting handshake"
                );
                None
            }
        }
    }
}

/// Server config that picks certificates through `resolver`
///
/// No client authentication; protocol versions are the ring provider's safe
/// defaults.
pub fn server_config(resolver: CertificateResolver) -> Result<ServerConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(HandshakeResolver::with_provider(
            resolver, provider,
        )));

    Ok(config)
}
