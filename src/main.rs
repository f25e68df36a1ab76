//! Certdock CLI - on-demand self-signed certificates
//!
//! Generate a single certificate, or resolve one through the same
//! get-or-generate pipeline a TLS server would use.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use certdock_cert::{
    encode_to_vec, Certificate, CertificateRecord, CertificateResolver, Generator,
    GeneratorConfig, JsonCodec, KeyAlgorithm, MemoryStore, MemoryStoreConfig,
    SelfSignedGenerator, Store, TieredStore, DEFAULT_MEMORY_STORE_CAPACITY,
    DEFAULT_VALIDITY_DAYS,
};
use certdock_cert_redis::{RedisStore, DEFAULT_KEY_PREFIX};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Certdock - self-signed certificates on demand
#[derive(Parser, Debug)]
#[command(name = "certdock")]
#[command(about = "Certdock - self-signed certificates on demand")]
#[command(version = VERSION)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one self-signed certificate for a host
    #[command(long_about = r#"
Generate a self-signed certificate for a host name. Without --out-dir the
certificate is printed as a JSON record on stdout.

EXAMPLES:
  # Print a record for example.com
  certdock generate --host example.com

  # Write example.com.crt.pem and example.com.key.pem
  certdock generate --host example.com --out-dir ./certs --key-algorithm ecdsa-p384
    "#)]
    Generate {
        /// Host name to put in the subject and SAN
        #[arg(long)]
        host: String,

        /// Days the certificate stays valid
        #[arg(long, default_value_t = DEFAULT_VALIDITY_DAYS)]
        validity_days: i64,

        /// Key algorithm for the generated key pair
        #[arg(long, value_enum, default_value_t = KeyAlgorithmArg::EcdsaP256)]
        key_algorithm: KeyAlgorithmArg,

        /// Directory to write PEM files into
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Resolve a certificate through the store tiers, generating on a miss
    #[command(long_about = r#"
Look the host up in an in-memory tier, then in Redis when --redis-url is
set. A certificate is generated and written to every tier on a miss.

EXAMPLES:
  certdock resolve --host example.com
  certdock resolve --host example.com --redis-url redis://127.0.0.1:6379/0

ENVIRONMENT VARIABLES:
  CERTDOCK_REDIS_URL     Redis connection URL
  CERTDOCK_REDIS_PREFIX  Key prefix for Redis entries
    "#)]
    Resolve {
        /// Host name to resolve; empty resolves the fallback host
        #[arg(long, default_value = "")]
        host: String,

        /// Redis connection URL (e.g., redis://127.0.0.1:6379/0)
        #[arg(long, env = "CERTDOCK_REDIS_URL")]
        redis_url: Option<String>,

        /// Key prefix for Redis entries
        #[arg(long, env = "CERTDOCK_REDIS_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
        redis_prefix: String,

        /// Initial capacity of the in-memory tier
        #[arg(long, default_value_t = DEFAULT_MEMORY_STORE_CAPACITY)]
        memory_capacity: usize,

        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyAlgorithmArg {
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

impl From<KeyAlgorithmArg> for KeyAlgorithm {
    fn from(arg: KeyAlgorithmArg) -> Self {
        match arg {
            KeyAlgorithmArg::EcdsaP256 => KeyAlgorithm::EcdsaP256,
            KeyAlgorithmArg::EcdsaP384 => KeyAlgorithm::EcdsaP384,
            KeyAlgorithmArg::Ed25519 => KeyAlgorithm::Ed25519,
        }
    }
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout carries only the certificate record
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn print_record(cert: &Certificate) -> Result<()> {
    let encoded = encode_to_vec(&JsonCodec, cert).context("Failed to encode certificate")?;
    let text = String::from_utf8(encoded).context("Encoded record is not UTF-8")?;
    print!("{}", text);
    Ok(())
}

/// Host names become file names, so anything that could leave the directory is refused
fn pem_file_stem(host: &str) -> Result<&str> {
    let unsafe_name = host.is_empty()
        || host == "."
        || host == ".."
        || host.contains(['/', '\\', '\0']);

    if unsafe_name {
        anyhow::bail!("Host {:?} cannot be used as a file name", host);
    }
    Ok(host)
}

fn write_pem_files(out_dir: &Path, host: &str, cert: &Certificate) -> Result<()> {
    let stem = pem_file_stem(host)?;
    let record = CertificateRecord::from_certificate(cert).context("Failed to encode PEM")?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let cert_path = out_dir.join(format!("{}.crt.pem", stem));
    let key_path = out_dir.join(format!("{}.key.pem", stem));

    std::fs::write(&cert_path, &record.cert_pem)
        .with_context(|| format!("Failed to write {}", cert_path.display()))?;
    std::fs::write(&key_path, &record.key_pem)
        .with_context(|| format!("Failed to write {}", key_path.display()))?;

    info!("Certificate written to {}", cert_path.display());
    info!("Private key written to {}", key_path.display());
    Ok(())
}

fn run_generate(
    host: String,
    validity_days: i64,
    key_algorithm: KeyAlgorithmArg,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    if validity_days <= 0 {
        anyhow::bail!("--validity-days must be positive, got {}", validity_days);
    }

    if out_dir.is_some() {
        pem_file_stem(&host)?;
    }

    let config = GeneratorConfig {
        key_algorithm: key_algorithm.into(),
        validity: time::Duration::days(validity_days),
    };
    debug!(key_algorithm = %config.key_algorithm, validity_days, "Generator configured");

    let cert = SelfSignedGenerator::with_config(config)
        .generate(&host)
        .with_context(|| format!("Failed to generate certificate for {}", host))?;

    match out_dir {
        Some(dir) => write_pem_files(&dir, &host, &cert),
        None => print_record(&cert),
    }
}

fn build_resolver(
    redis_url: Option<&str>,
    redis_prefix: &str,
    memory_capacity: usize,
) -> Result<CertificateResolver> {
    let mut tiers: Vec<Arc<dyn Store>> = vec![Arc::new(MemoryStore::with_config(
        MemoryStoreConfig {
            capacity: memory_capacity,
        },
    ))];

    if let Some(url) = redis_url {
        let redis = RedisStore::open(url)
            .context("Invalid Redis URL")?
            .with_prefix(redis_prefix);
        info!("Using Redis tier with prefix {:?}", redis.prefix());
        tiers.push(Arc::new(redis));
    }

    let store = TieredStore::new(tiers).context("Failed to build store tiers")?;

    CertificateResolver::builder()
        .generator(Arc::new(SelfSignedGenerator::new()))
        .store(Arc::new(store))
        .build()
        .context("Failed to build resolver")
}

async fn run_resolve(
    host: String,
    redis_url: Option<String>,
    redis_prefix: String,
    memory_capacity: usize,
    timeout_secs: u64,
) -> Result<()> {
    let resolver = build_resolver(redis_url.as_deref(), &redis_prefix, memory_capacity)?;

    // Store backends block, so resolution runs off the async workers
    let task = tokio::task::spawn_blocking(move || resolver.resolve(&host));

    let cert = tokio::time::timeout(Duration::from_secs(timeout_secs), task)
        .await
        .with_context(|| format!("Resolution timed out after {}s", timeout_secs))?
        .context("Resolution task panicked")??;

    print_record(&cert)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            host,
            validity_days,
            key_algorithm,
            out_dir,
        } => run_generate(host, validity_days, key_algorithm, out_dir),
        Commands::Resolve {
            host,
            redis_url,
            redis_prefix,
            memory_capacity,
            timeout_secs,
        } => {
            run_resolve(
                host,
                redis_url,
                redis_prefix,
                memory_capacity,
                timeout_secs,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_file_stem_accepts_host_names() {
        assert_eq!(pem_file_stem("example.com").unwrap(), "example.com");
        assert_eq!(pem_file_stem("127.0.0.1").unwrap(), "127.0.0.1");
        assert_eq!(pem_file_stem("..example.com").unwrap(), "..example.com");
    }

    #[test]
    fn test_pem_file_stem_rejects_path_components() {
        for host in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0byte"] {
            assert!(pem_file_stem(host).is_err(), "accepted {:?}", host);
        }
    }

    #[test]
    fn test_write_pem_files_stays_inside_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cert = SelfSignedGenerator::new().generate("example.com").unwrap();

        write_pem_files(dir.path(), "example.com", &cert).unwrap();
        assert!(dir.path().join("example.com.crt.pem").exists());
        assert!(dir.path().join("example.com.key.pem").exists());

        let nested = dir.path().join("nested");
        assert!(write_pem_files(&nested, "../escape", &cert).is_err());
        assert!(!dir.path().join("escape.crt.pem").exists());
        assert!(!nested.exists());
    }
}
