//! Self-signed certificate generation
//!
//! Issues a fresh self-signed certificate per host name. Meant for origins
//! sitting behind a terminating proxy, private networks and development;
//! nothing produced here chains to a public trust root.

use std::sync::atomic::{AtomicU64, Ordering};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber, SignatureAlgorithm,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::generator::{GenerateError, Generator};
use crate::Certificate;

/// Default validity window of a generated certificate
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Key pair algorithm for generated certificates
///
/// Every option is at least as strong as 2048-bit RSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256
    #[default]
    EcdsaP256,
    /// ECDSA over P-384 with SHA-384
    EcdsaP384,
    Ed25519,
}

impl KeyAlgorithm {
    fn signature_algorithm(self) -> &'static SignatureAlgorithm {
        match self {
            KeyAlgorithm::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeyAlgorithm::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
            KeyAlgorithm::Ed25519 => &rcgen::PKCS_ED25519,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "ecdsa-p256",
            KeyAlgorithm::EcdsaP384 => "ecdsa-p384",
            KeyAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-signed generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub key_algorithm: KeyAlgorithm,
    /// Length of the validity window starting at generation time
    pub validity: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            key_algorithm: KeyAlgorithm::default(),
            validity: Duration::days(DEFAULT_VALIDITY_DAYS),
        }
    }
}

/// Generates self-signed, CA-capable server certificates
///
/// # Certificate shape
/// - Subject CN and SAN equal the requested host name (IP SAN for IP literals)
/// - Valid from now for [`GeneratorConfig::validity`]
/// - Key usages: digital signature, key encipherment; extended: server auth
/// - Serial number: nanosecond timestamp, strictly increasing per generator
///
/// # Example
/// ```no_run
/// use certdock_cert::{Generator, SelfSignedGenerator};
///
/// let cert = SelfSignedGenerator::new().generate("example.com").unwrap();
/// assert_eq!(cert.cert_chain().len(), 1);
/// ```
#[derive(Debug)]
pub struct SelfSignedGenerator {
    config: GeneratorConfig,
    last_serial: AtomicU64,
}

impl SelfSignedGenerator {
    pub fn new() -> Self {
        Self::with_config(GeneratorConfig::default())
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        Self {
            config,
            last_serial: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Current time in nanoseconds, bumped past the last serial handed out
    fn next_serial(&self) -> u64 {
        let now = OffsetDateTime::now_utc().unix_timestamp_nanos().max(0) as u64;
        let previous = match self.last_serial.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last + 1)),
        ) {
            Ok(last) | Err(last) => last,
        };
        now.max(previous + 1)
    }

    fn params_for(&self, host: &str, serial: u64) -> Result<CertificateParams, GenerateError> {
        let mut params = CertificateParams::new(vec![host.to_string()])
            .map_err(|_| GenerateError::InvalidHostName(host.to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + self.config.validity;

        params.serial_number = Some(SerialNumber::from(serial));

        Ok(params)
    }
}

impl Default for SelfSignedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SelfSignedGenerator {
    fn generate(&self, host: &str) -> Result<Certificate, GenerateError> {
        if host.is_empty() {
            return Err(GenerateError::InvalidHostName(host.to_string()));
        }

        let params = self.params_for(host, self.next_serial())?;

        let key_pair = KeyPair::generate_for(self.config.key_algorithm.signature_algorithm())
            .map_err(GenerateError::KeyGeneration)?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(GenerateError::Signing)?;

        let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        debug!(
            host = %host,
            algorithm = %self.config.key_algorithm,
            "Generated self-signed certificate"
        );

        Ok(Certificate::new(vec![cert.der().clone()], private_key)?)
    }
}
