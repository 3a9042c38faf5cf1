//! Job configuration.

use buildsync_core::ValidationError;
use serde::{Deserialize, Serialize};

use crate::region::ResourceKey;

/// Progress units given to each phase of a synchronization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseWeights {
    /// Initializer step
    pub initialize: u32,
    /// Waiting for the exclusive region; consumed at once when it is free
    pub wait: u32,
    /// Forced model reload
    pub fetch: u32,
    /// Workspace synchronization
    pub synchronize: u32,
}

impl Default for PhaseWeights {
    fn default() -> Self {
        Self {
            initialize: 10,
            wait: 0,
            fetch: 40,
            synchronize: 50,
        }
    }
}

impl PhaseWeights {
    /// Create weights with no slice reserved for the region wait.
    pub fn new(initialize: u32, fetch: u32, synchronize: u32) -> Self {
        Self {
            initialize,
            wait: 0,
            fetch,
            synchronize,
        }
    }

    /// Reserve units for waiting on the region.
    pub fn with_wait(mut self, units: u32) -> Self {
        self.wait = units;
        self
    }

    /// Root budget: the sum of all phases.
    pub fn total(&self) -> u32 {
        self.initialize
            .saturating_add(self.wait)
            .saturating_add(self.fetch)
            .saturating_add(self.synchronize)
    }

    /// Reject budgets that cannot be reported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let total = self
            .initialize
            .checked_add(self.wait)
            .and_then(|t| t.checked_add(self.fetch))
            .and_then(|t| t.checked_add(self.synchronize));
        match total {
            None => Err(ValidationError::Invalid(
                "phase weights overflow".to_string(),
            )),
            Some(0) => Err(ValidationError::Invalid(
                "phase weights must not all be zero".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Configuration for synchronization jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Progress split between phases
    pub weights: PhaseWeights,
    /// Resource serialized by the job
    pub region_key: ResourceKey,
}

impl JobConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set phase weights.
    pub fn with_weights(mut self, weights: PhaseWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the region key.
    pub fn with_region_key(mut self, key: ResourceKey) -> Self {
        self.region_key = key;
        self
    }

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = PhaseWeights::default();
        assert_eq!(weights.total(), 100);
        assert_eq!(weights.wait, 0);
        assert!(weights.validate().is_ok());
        assert_eq!(weights.with_wait(5).total(), 105);
    }

    #[test]
    fn test_invalid_weights() {
        assert!(PhaseWeights::new(0, 0, 0).validate().is_err());
        assert!(PhaseWeights::new(u32::MAX, 1, 0).validate().is_err());
        assert!(PhaseWeights::new(u32::MAX, 0, 0).with_wait(1).validate().is_err());
        assert!(PhaseWeights::new(0, 0, 0).with_wait(1).validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = JobConfig::new()
            .with_weights(PhaseWeights::new(5, 70, 25))
            .with_region_key(ResourceKey::new("project:/repo/proj"));

        assert_eq!(config.weights.total(), 100);
        assert_eq!(config.region_key.as_str(), "project:/repo/proj");
        assert_eq!(JobConfig::default().region_key, ResourceKey::workspace_root());
    }
}
