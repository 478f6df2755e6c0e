use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

/// How the split threshold of an isolation tree node grows with depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthCriterion {
    /// Every node splits once it holds `max_leaf_samples` points.
    Fixed,
    /// A node at depth `d` needs `max_leaf_samples * 2^d` points to split.
    Adaptive,
}

impl GrowthCriterion {
    pub fn multiplier(self, depth: usize) -> usize {
        match self {
            GrowthCriterion::Fixed => 1,
            GrowthCriterion::Adaptive => 1usize << depth.min(usize::BITS as usize - 1),
        }
    }
}

/// Tunables for the whole detection engine.
///
/// Missing fields in a configuration document fall back to the defaults, so
/// `{"contamination": 0.05}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // isolation detector
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_leaf_samples: usize,
    pub branching_factor: usize,
    pub growth: GrowthCriterion,
    pub subsample: f64,
    pub window_size: usize,

    // centroid-distance detector
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub distance_percentile: f64,

    // density detector
    pub eps: f64,
    pub min_samples: usize,

    // significance filter and history
    pub zscore_threshold: f64,
    pub history_capacity: usize,
    pub min_history: usize,

    // online adaptation
    pub refit_probability: f64,

    pub random_state: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            contamination: 0.1,
            n_estimators: 100,
            max_leaf_samples: 32,
            branching_factor: 2,
            growth: GrowthCriterion::Adaptive,
            subsample: 1.0,
            window_size: 2048,
            min_clusters: 2,
            max_clusters: 10,
            distance_percentile: 95.0,
            eps: 0.5,
            min_samples: 5,
            zscore_threshold: 2.5,
            history_capacity: 1000,
            min_history: 10,
            refit_probability: 0.1,
            random_state: None,
        }
    }
}

impl DetectorConfig {
    /// Parse a JSON document and validate the result.
    pub fn from_json_str(doc: &str) -> Result<Self> {
        let config: DetectorConfig = serde_json::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(DetectorError::InvalidConfig(msg))
        }

        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return invalid(format!("contamination must be in (0, 0.5], got {}", self.contamination));
        }
        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1".into());
        }
        if self.max_leaf_samples == 0 {
            return invalid("max_leaf_samples must be at least 1".into());
        }
        if self.branching_factor < 2 {
            return invalid(format!("branching_factor must be at least 2, got {}", self.branching_factor));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid(format!("subsample must be in (0, 1], got {}", self.subsample));
        }
        if self.window_size == 0 {
            return invalid("window_size must be at least 1".into());
        }
        if self.min_clusters < 2 || self.min_clusters > self.max_clusters {
            return invalid(format!(
                "cluster range must satisfy 2 <= min <= max, got [{}, {}]",
                self.min_clusters, self.max_clusters
            ));
        }
        if !(0.0..=100.0).contains(&self.distance_percentile) {
            return invalid(format!("distance_percentile must be in [0, 100], got {}", self.distance_percentile));
        }
        if !(self.eps > 0.0) {
            return invalid(format!("eps must be positive, got {}", self.eps));
        }
        if self.min_samples < 2 {
            return invalid(format!("min_samples must be at least 2, got {}", self.min_samples));
        }
        if !(self.zscore_threshold > 0.0) {
            return invalid(format!("zscore_threshold must be positive, got {}", self.zscore_threshold));
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.refit_probability) {
            return invalid(format!("refit_probability must be in [0, 1], got {}", self.refit_probability));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.history_capacity, 1000);
        assert_eq!(config.zscore_threshold, 2.5);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = DetectorConfig::from_json_str(r#"{"contamination": 0.05, "growth": "fixed"}"#).unwrap();
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.growth, GrowthCriterion::Fixed);
        assert_eq!(config.max_clusters, 10);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = DetectorConfig::from_json_str(r#"{"contamination": 0.9}"#).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidConfig(_)));

        let config = DetectorConfig { min_clusters: 5, max_clusters: 3, ..Default::default() };
        assert!(config.validate().is_err());

        let config = DetectorConfig { refit_probability: 1.5, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = DetectorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, DetectorError::Config(_)));
    }

    #[test]
    fn adaptive_growth_doubles_per_level() {
        assert_eq!(GrowthCriterion::Adaptive.multiplier(0), 1);
        assert_eq!(GrowthCriterion::Adaptive.multiplier(3), 8);
        assert_eq!(GrowthCriterion::Fixed.multiplier(3), 1);
    }
}
