//! Certificate generator capability

use thiserror::Error;

use crate::{Certificate, CertificateError};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Invalid host name for certificate: {0:?}")]
    InvalidHostName(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(#[source] rcgen::Error),

    #[error("Certificate signing failed: {0}")]
    Signing(#[source] rcgen::Error),

    #[error("Certificate encoding failed: {0}")]
    Encoding(#[from] CertificateError),

    #[error("Certificate generation failed: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Produces a new certificate for a host name on demand
///
/// Implementations never retry internally; the caller owns the retry policy.
///
/// Any `Fn(&str) -> Result<Certificate, GenerateError>` closure is a generator:
///
/// ```no_run
/// use certdock_cert::{Generator, GenerateError};
///
/// let refuse = |host: &str| -> Result<certdock_cert::Certificate, GenerateError> {
///     Err(GenerateError::InvalidHostName(host.to_string()))
/// };
/// assert!(refuse.generate("example.com").is_err());
/// ```
pub trait Generator: Send + Sync {
    fn generate(&self, host: &str) -> Result<Certificate, GenerateError>;
}

impl<F> Generator for F
where
    F: Fn(&str) -> Result<Certificate, GenerateError> + Send + Sync,
{
    fn generate(&self, host: &str) -> Result<Certificate, GenerateError> {
        self(host)
    }
}
