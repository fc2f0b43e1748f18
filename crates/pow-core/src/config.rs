//! Search configuration.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::block::BlockHeader;
use crate::difficulty::Target;
use crate::error::{PowError, Result};

/// Options for a (possibly partitioned) nonce search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// First nonce to try.
    pub start_nonce: u32,
    /// Last nonce to try (inclusive).
    pub end_nonce: u32,
    /// Number of partitions searched in parallel; 0 means one per core.
    pub workers: usize,
    /// Nonces evaluated between checks of the stop signal.
    pub stop_check_interval: u32,
    /// Search against this difficulty instead of the header's `bits`
    /// (pool-style shares).
    pub share_difficulty: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_nonce: 0,
            end_nonce: u32::MAX,
            workers: 0,
            stop_check_interval: 65_536,
            share_difficulty: None,
        }
    }
}

impl SearchConfig {
    /// Load from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SearchConfig =
            serde_json::from_str(json).map_err(|e| PowError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_nonce > self.end_nonce {
            return Err(PowError::InvalidConfig(format!(
                "start_nonce {} is past end_nonce {}",
                self.start_nonce, self.end_nonce
            )));
        }
        if self.stop_check_interval == 0 {
            return Err(PowError::InvalidConfig(
                "stop_check_interval must be at least 1".to_string(),
            ));
        }
        if let Some(difficulty) = self.share_difficulty {
            Target::from_difficulty(difficulty)?;
        }
        Ok(())
    }

    pub fn nonce_range(&self) -> RangeInclusive<u32> {
        self.start_nonce..=self.end_nonce
    }

    /// Effective number of workers.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Target a solution must meet for `header`.
    pub fn target_for(&self, header: &BlockHeader) -> Result<Target> {
        match self.share_difficulty {
            Some(difficulty) => Target::from_difficulty(difficulty),
            None => header.target(),
        }
    }
}
