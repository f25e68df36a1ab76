//! Tiered certificate storage
//!
//! Composes stores in priority order: reads stop at the first hit or the
//! first real error, writes fan out to every tier.

use std::sync::Arc;
use tracing::trace;

use crate::resolver::ConfigError;
use crate::storage::{Store, StoreError};
use crate::Certificate;

/// Store over an ordered, fixed list of tiers, highest priority first
///
/// # Reads
/// Tiers are tried in order. The first hit is returned as is; lower tiers
/// are neither consulted nor populated, so a hit in tier 2 does not promote
/// the entry into tier 1. A tier error aborts the read immediately. Only
/// when every tier misses is the result `Ok(None)`.
///
/// # Writes
/// Every tier is written even when an earlier one fails. The first error is
/// returned once all tiers were attempted.
pub struct TieredStore {
    tiers: Vec<Arc<dyn Store>>,
}

impl TieredStore {
    pub fn new(tiers: Vec<Arc<dyn Store>>) -> Result<Self, ConfigError> {
        if tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        Ok(Self { tiers })
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("tiers", &self.tiers.len())
            .finish()
    }
}

impl Store for TieredStore {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        for (tier, store) in self.tiers.iter().enumerate() {
            if let Some(cert) = store.get(host)? {
                trace!(host = %host, tier, "Tiered store hit");
                return Ok(Some(cert));
            }
        }
        Ok(None)
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        let mut first_error = None;
        for (tier, store) in self.tiers.iter().enumerate() {
            if let Err(e) = store.set(host, cert) {
                trace!(host = %host, tier, error = %e, "Tiered store write failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
