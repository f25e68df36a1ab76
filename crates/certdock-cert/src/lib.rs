//! On-demand TLS certificate provisioning
//!
//! Resolves a certificate for a requested host name from a (possibly tiered)
//! store, generating and persisting a self-signed one when none exists.

pub mod encoding;
pub mod generator;
pub mod handshake;
pub mod resolver;
pub mod self_signed;
pub mod storage;
pub mod tiered;

pub use encoding::{
    decode_from_slice, encode_to_vec, CertificateCodec, CertificateRecord, EncodingError,
    JsonCodec,
};
pub use generator::{GenerateError, Generator};
pub use handshake::{server_config, HandshakeError, HandshakeResolver};
pub use resolver::{
    CertificateResolver, CertificateResolverBuilder, ConfigError, GetCertificateFn, ResolveError,
    FALLBACK_HOST,
};
pub use self_signed::{GeneratorConfig, KeyAlgorithm, SelfSignedGenerator, DEFAULT_VALIDITY_DAYS};
pub use storage::{
    MemoryStore, MemoryStoreConfig, Store, StoreError, DEFAULT_MEMORY_STORE_CAPACITY,
};
pub use tiered::TieredStore;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use thiserror::Error;

/// Certificate invariant violations
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Certificate chain is empty")]
    EmptyChain,

    #[error("Private key is unusable or does not match the leaf certificate: {0}")]
    KeyMismatch(#[source] rustls::Error),
}

/// Certificate chain (leaf first) with the private key of the leaf
///
/// Immutable once built. Each store tier keeps its own clone.
pub struct Certificate {
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl Certificate {
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Result<Self, CertificateError> {
        if cert_chain.is_empty() {
            return Err(CertificateError::EmptyChain);
        }

        Ok(Self {
            cert_chain,
            private_key,
        })
    }

    /// Full chain, leaf first
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        // Non-empty is enforced by `new`
        &self.cert_chain[0]
    }

    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.private_key
    }

    pub fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.cert_chain, self.private_key)
    }

    /// Build the rustls signing bundle for this certificate
    ///
    /// Fails when the provider cannot load the key or when the key's public
    /// half differs from the leaf's subject public key.
    pub fn to_certified_key(
        &self,
        provider: &CryptoProvider,
    ) -> Result<CertifiedKey, CertificateError> {
        CertifiedKey::from_der(
            self.cert_chain.clone(),
            self.private_key.clone_key(),
            provider,
        )
        .map_err(CertificateError::KeyMismatch)
    }

    /// Check that the private key pairs with the leaf certificate
    pub fn verify_key_pair(&self) -> Result<(), CertificateError> {
        self.to_certified_key(&rustls::crypto::ring::default_provider())
            .map(|_| ())
    }
}

impl Clone for Certificate {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.cert_chain == other.cert_chain
            && self.private_key.secret_der() == other.private_key.secret_der()
    }
}

impl Eq for Certificate {}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key_kind = match &self.private_key {
            PrivateKeyDer::Pkcs1(_) => "pkcs1",
            PrivateKeyDer::Sec1(_) => "sec1",
            PrivateKeyDer::Pkcs8(_) => "pkcs8",
            _ => "unknown",
        };
        f.debug_struct("Certificate")
            .field("chain_len", &self.cert_chain.len())
            .field("leaf_len", &self.leaf().len())
            .field("private_key", &key_kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;

    fn generated() -> Certificate {
        SelfSignedGenerator::new().generate("example.com").unwrap()
    }

    #[test]
    fn test_empty_chain_rejected() {
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![1, 2, 3]));
        let result = Certificate::new(Vec::new(), key);
        assert!(matches!(result, Err(CertificateError::EmptyChain)));
    }

    #[test]
    fn test_clone_is_equal() {
        let cert = generated();
        let copy = cert.clone();
        assert_eq!(cert, copy);
        assert_eq!(copy.leaf(), &copy.cert_chain()[0]);
    }

    #[test]
    fn test_debug_hides_key_material() {
        let cert = generated();
        let rendered = format!("{:?}", cert);
        assert!(rendered.contains("chain_len: 1"));
        assert!(rendered.contains("pkcs8"));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let first = generated();
        let second = generated();

        let (chain, _) = first.into_parts();
        let (_, other_key) = second.into_parts();
        let mixed = Certificate::new(chain, other_key).unwrap();

        assert!(matches!(
            mixed.verify_key_pair(),
            Err(CertificateError::KeyMismatch(_))
        ));
    }

    #[test]
    fn test_certified_key_for_generated_cert() {
        let cert = generated();
        let provider = rustls::crypto::ring::default_provider();
        let certified = cert.to_certified_key(&provider).unwrap();
        assert_eq!(certified.cert.len(), 1);
    }
}
