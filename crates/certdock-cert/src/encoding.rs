//! Wire encoding for persisted certificates
//!
//! A certificate travels as a compact JSON object with two PEM strings:
//! `{"c":"<chain, leaf first>","k":"<private key>"}`.

use std::io::{Read, Write};

use pem::{EncodeConfig, LineEnding, Pem};
use rustls::pki_types::PrivateKeyDer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Certificate, CertificateError};

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse PEM: {0}")]
    Pem(String),

    #[error("No certificate found in record")]
    MissingCertificate,

    #[error("No private key found in record")]
    MissingPrivateKey,

    #[error("Unsupported private key format")]
    UnsupportedKey,

    #[error("Invalid certificate: {0}")]
    Certificate(#[from] CertificateError),
}

const PEM_CONFIG: EncodeConfig = EncodeConfig::new().set_line_ending(LineEnding::LF);

/// Serialized form of a [`Certificate`]
///
/// Empty fields are omitted on output and read back as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Concatenated `CERTIFICATE` PEM blocks, leaf first
    #[serde(rename = "c", default, skip_serializing_if = "String::is_empty")]
    pub cert_pem: String,

    /// PEM private key, `PRIVATE KEY` (PKCS#8) for generated certificates
    #[serde(rename = "k", default, skip_serializing_if = "String::is_empty")]
    pub key_pem: String,
}

impl CertificateRecord {
    pub fn from_certificate(cert: &Certificate) -> Result<Self, EncodingError> {
        let cert_pem = cert
            .cert_chain()
            .iter()
            .map(|der| pem::encode_config(&Pem::new("CERTIFICATE", der.to_vec()), PEM_CONFIG))
            .collect::<String>();

        let key = cert.private_key();
        let key_pem = pem::encode_config(
            &Pem::new(key_label(key)?, key.secret_der().to_vec()),
            PEM_CONFIG,
        );

        Ok(Self { cert_pem, key_pem })
    }

    /// Parse the PEM fields back into a certificate
    ///
    /// The private key must pair with the leaf.
    pub fn to_certificate(&self) -> Result<Certificate, EncodingError> {
        let cert_chain = rustls_pemfile::certs(&mut self.cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EncodingError::Pem(format!("certificate chain: {}", e)))?;

        if cert_chain.is_empty() {
            return Err(EncodingError::MissingCertificate);
        }

        let private_key = rustls_pemfile::private_key(&mut self.key_pem.as_bytes())
            .map_err(|e| EncodingError::Pem(format!("private key: {}", e)))?
            .ok_or(EncodingError::MissingPrivateKey)?;

        let cert = Certificate::new(cert_chain, private_key)?;
        cert.verify_key_pair()?;

        Ok(cert)
    }
}

fn key_label(key: &PrivateKeyDer<'_>) -> Result<&'static str, EncodingError> {
    match key {
        PrivateKeyDer::Pkcs8(_) => Ok("PRIVATE KEY"),
        PrivateKeyDer::Pkcs1(_) => Ok("RSA PRIVATE KEY"),
        PrivateKeyDer::Sec1(_) => Ok("EC PRIVATE KEY"),
        _ => Err(EncodingError::UnsupportedKey),
    }
}

/// Serializes certificates to and from byte streams
pub trait CertificateCodec: Send + Sync {
    fn encode(&self, cert: &Certificate, writer: &mut dyn Write) -> Result<(), EncodingError>;

    fn decode(&self, reader: &mut dyn Read) -> Result<Certificate, EncodingError>;
}

/// Compact single-line JSON codec for [`CertificateRecord`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl CertificateCodec for JsonCodec {
    fn encode(&self, cert: &Certificate, writer: &mut dyn Write) -> Result<(), EncodingError> {
        let record = CertificateRecord::from_certificate(cert)?;
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Certificate, EncodingError> {
        let record: CertificateRecord = serde_json::from_reader(reader)?;
        record.to_certificate()
    }
}

pub fn encode_to_vec<C>(codec: &C, cert: &Certificate) -> Result<Vec<u8>, EncodingError>
where
    C: CertificateCodec + ?Sized,
{
    let mut buf = Vec::new();
    codec.encode(cert, &mut buf)?;
    Ok(buf)
}

pub fn decode_from_slice<C>(codec: &C, mut bytes: &[u8]) -> Result<Certificate, EncodingError>
where
    C: CertificateCodec + ?Sized,
{
    codec.decode(&mut bytes)
}
