//! Per-step-count consensus thresholds.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Voting settings for one step count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProfile {
    /// Step count this profile applies to.
    pub steps: usize,
    /// Percentage of votes a cell needs to be live.
    pub threshold: u32,
    /// Reject the consensus when the best final end mismatch exceeds this.
    #[serde(default)]
    pub max_final_mismatch: Option<usize>,
    /// Reject the consensus when the best search used more generations.
    #[serde(default)]
    pub max_generations: Option<usize>,
}

impl StepProfile {
    pub fn new(steps: usize, threshold: u32) -> Self {
        Self {
            steps,
            threshold,
            max_final_mismatch: None,
            max_generations: None,
        }
    }
}

/// Profiles keyed by step count, with a fallback threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusTable {
    #[serde(default = "default_profiles")]
    pub profiles: Vec<StepProfile>,
    /// Threshold for step counts without a profile.
    #[serde(default = "default_threshold")]
    pub default_threshold: u32,
}

impl Default for ConsensusTable {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            default_threshold: default_threshold(),
        }
    }
}

fn default_profiles() -> Vec<StepProfile> {
    vec![
        StepProfile::new(1, 50),
        StepProfile::new(2, 50),
        StepProfile::new(3, 65),
        StepProfile::new(4, 65),
        StepProfile::new(5, 65),
    ]
}
fn default_threshold() -> u32 {
    50
}

impl ConsensusTable {
    /// Profile for `steps`, falling back to the default threshold.
    pub fn profile_for(&self, steps: usize) -> StepProfile {
        self.profiles
            .iter()
            .find(|profile| profile.steps == steps)
            .cloned()
            .unwrap_or_else(|| StepProfile::new(steps, self.default_threshold))
    }

    /// Validate thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = self
            .profiles
            .iter()
            .map(|profile| profile.threshold)
            .chain(std::iter::once(self.default_threshold));
        for threshold in thresholds {
            if threshold > 100 {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }
        Ok(())
    }
}
