//! Experiment configuration loaded from JSON.
//!
//! Every field has a default, so a config file only needs the fields it
//! changes. The CLI overrides individual fields with its flags.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::ExecutionMode;
use crate::chain::{Chain, IBM_SHERBROOKE};
use crate::error::{QkdError, Result};
use crate::protocol::Protocol;

/// Routing distances swept when none are given.
pub const DEFAULT_LENGTHS: [usize; 6] = [1, 2, 4, 8, 16, 32];

/// Repetitions per routing distance when none are given.
pub const DEFAULT_RUNS: usize = 1000;

/// Parameters of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub protocol: Protocol,
    pub topology: String,
    pub lengths: Vec<usize>,
    pub runs: usize,
    pub mode: ExecutionMode,
    /// Also write a human-readable rendering of the circuits.
    pub draw: bool,
    /// Seed for the trace generator; `None` draws one from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Bb84,
            topology: IBM_SHERBROOKE.to_string(),
            lengths: DEFAULT_LENGTHS.to_vec(),
            runs: DEFAULT_RUNS,
            mode: ExecutionMode::Local,
            draw: false,
            seed: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Resolve the topology identifier to its chain.
    pub fn chain(&self) -> Result<Chain> {
        Chain::for_topology(&self.topology)
    }

    /// Reject configurations no generator could accept, before any work.
    ///
    /// Chain-dependent bounds are checked by the generator itself.
    pub fn validate(&self) -> Result<()> {
        if self.lengths.is_empty() {
            return Err(QkdError::NoLengths);
        }
        if self.lengths.contains(&0) {
            return Err(QkdError::ZeroLength);
        }
        if self.runs == 0 {
            return Err(QkdError::ZeroRuns);
        }
        Ok(())
    }
}
