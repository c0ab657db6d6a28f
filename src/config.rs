use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::Fingerprint;

pub const DEFAULT_PROJECTIONS: usize = 300;
pub const DEFAULT_DISTANCE_LIMIT: u32 = 30;
pub const DEFAULT_SEED: u64 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one projection is required")]
    NoProjections,

    #[error("distance limit {limit} exceeds the {max}-bit fingerprint")]
    DistanceLimitTooLarge { limit: u32, max: usize },

    #[error("window radius must be positive and finite, got {radius}")]
    InvalidRadius { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Query the random-projection index for a small candidate window.
    Projections,
    /// Compare every pair directly.
    Exhaustive,
}

/// Tunable parameters of the duplicate search. None of these guarantee
/// exact recall in projection mode; they trade candidates checked against
/// the chance of missing a near pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub projections: usize,
    pub distance_limit: u32,
    /// Half-width of a candidate window in projected units. Defaults to
    /// `distance_limit / 2` when unset.
    pub radius: Option<f32>,
    pub seed: u64,
    pub strategy: SearchStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            projections: DEFAULT_PROJECTIONS,
            distance_limit: DEFAULT_DISTANCE_LIMIT,
            radius: None,
            seed: DEFAULT_SEED,
            strategy: SearchStrategy::Projections,
        }
    }
}

impl SearchConfig {
    pub fn window_radius(&self) -> f32 {
        self.radius.unwrap_or((self.distance_limit / 2) as f32)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.projections == 0 && self.strategy == SearchStrategy::Projections {
            return Err(ConfigError::NoProjections);
        }
        if self.distance_limit as usize > Fingerprint::BITS {
            return Err(ConfigError::DistanceLimitTooLarge {
                limit: self.distance_limit,
                max: Fingerprint::BITS,
            });
        }
        let radius = self.window_radius();
        if self.strategy == SearchStrategy::Projections && !(radius.is_finite() && radius > 0.0) {
            return Err(ConfigError::InvalidRadius { radius });
        }
        Ok(())
    }
}
