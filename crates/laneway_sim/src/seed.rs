//! Seed management for reproducible simulations.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a simulation seed comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedSource {
    /// A literal value
    Literal(u64),
    /// A string, hashed
    FromString(String),
    /// Wall clock nanoseconds; not reproducible
    Random,
}

impl SeedSource {
    /// Seed value for this source
    #[must_use]
    pub fn to_seed(&self) -> u64 {
        match self {
            Self::Literal(seed) => *seed,
            Self::FromString(s) => {
                let mut hasher = fnv::FnvHasher::default();
                hasher.write(s.as_bytes());
                hasher.finish()
            }
            Self::Random => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos() as u64),
        }
    }
}

/// Simulation seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSeed {
    /// Seed value
    pub seed: u64,
    /// Where it came from
    pub source: SeedSource,
}

impl SimSeed {
    /// Seed from a source
    #[must_use]
    pub fn new(source: SeedSource) -> Self {
        Self {
            seed: source.to_seed(),
            source,
        }
    }

    /// Seed from a literal value
    #[must_use]
    pub fn from_literal(seed: u64) -> Self {
        Self::new(SeedSource::Literal(seed))
    }

    /// Seed from a string
    #[must_use]
    pub fn from_string(s: &str) -> Self {
        Self::new(SeedSource::FromString(s.to_string()))
    }

    /// Independent seed for a named context, e.g. one endpoint
    #[must_use]
    pub fn derive(&self, context: &str) -> Self {
        let mut hasher = fnv::FnvHasher::default();
        hasher.write_u64(self.seed);
        hasher.write(context.as_bytes());
        Self::from_literal(hasher.finish())
    }

    /// RNG seeded with this seed
    #[must_use]
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

impl Default for SimSeed {
    fn default() -> Self {
        Self::from_literal(42)
    }
}
