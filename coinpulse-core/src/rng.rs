//! Filler volume generation.
//!
//! The observations table carries a `volume` column that no upstream field
//! feeds. Rows get a uniform draw from [`FILLER_VOLUME_RANGE`] instead. The
//! draw sits behind [`VolumeSource`] so a real signal can replace it without
//! touching row construction.
//!
//! With a master seed, each row's draw comes from a sub-seed derived via
//! BLAKE3 over `(seed, batch instant, symbol)`, so a replayed batch gets the
//! same filler regardless of the order rows are built in.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

/// Range the filler volume is drawn from.
pub const FILLER_VOLUME_RANGE: Range<f64> = 1_000.0..10_000.0;

/// Produces the `volume` value for one observation row.
pub trait VolumeSource {
    fn volume_for(&mut self, batch: DateTime<Utc>, symbol: &str) -> f64;
}

/// Uniform filler volume. Non-authoritative.
#[derive(Debug, Clone)]
pub enum FillerVolume {
    /// Reproducible per-row draws from a master seed.
    Seeded { master_seed: u64 },
    /// A single entropy-seeded stream.
    Entropy(StdRng),
}

impl FillerVolume {
    pub fn seeded(master_seed: u64) -> Self {
        Self::Seeded { master_seed }
    }

    pub fn from_entropy() -> Self {
        Self::Entropy(StdRng::from_entropy())
    }

    /// Seeded when a seed is configured, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Deterministic sub-seed for one `(batch, symbol)` row.
    pub fn sub_seed(master_seed: u64, batch: DateTime<Utc>, symbol: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&master_seed.to_le_bytes());
        hasher.update(&batch.timestamp_millis().to_le_bytes());
        hasher.update(symbol.as_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

impl VolumeSource for FillerVolume {
    fn volume_for(&mut self, batch: DateTime<Utc>, symbol: &str) -> f64 {
        match self {
            Self::Seeded { master_seed } => {
                let seed = Self::sub_seed(*master_seed, batch, symbol);
                StdRng::seed_from_u64(seed).gen_range(FILLER_VOLUME_RANGE)
            }
            Self::Entropy(rng) => rng.gen_range(FILLER_VOLUME_RANGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn batch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let mut a = FillerVolume::seeded(42);
        let mut b = FillerVolume::seeded(42);
        assert_eq!(a.volume_for(batch(), "BITCOIN"), b.volume_for(batch(), "BITCOIN"));
    }

    #[test]
    fn seeded_draws_are_order_independent() {
        let mut v = FillerVolume::seeded(7);
        let btc_first = v.volume_for(batch(), "BITCOIN");
        let _ = v.volume_for(batch(), "ETHEREUM");
        let btc_again = v.volume_for(batch(), "BITCOIN");
        assert_eq!(btc_first, btc_again);
    }

    #[test]
    fn different_symbols_different_sub_seeds() {
        assert_ne!(
            FillerVolume::sub_seed(42, batch(), "BITCOIN"),
            FillerVolume::sub_seed(42, batch(), "ETHEREUM")
        );
    }

    #[test]
    fn draws_stay_in_range() {
        let mut seeded = FillerVolume::seeded(1);
        let mut entropy = FillerVolume::from_entropy();
        for i in 0..500 {
            let symbol = format!("COIN{i}");
            for v in [
                seeded.volume_for(batch(), &symbol),
                entropy.volume_for(batch(), &symbol),
            ] {
                assert!(FILLER_VOLUME_RANGE.contains(&v), "{v} out of range");
            }
        }
    }
}
