//! Ensemble anomaly detection for network-flow feature vectors.
//!
//! An [`AnomalyDetector`] normalizes each batch, runs three outlier detectors
//! (online isolation forest, nearest-centroid distance, DBSCAN noise), ORs
//! their flags and then demotes positives that are not statistically extreme
//! relative to a bounded history of past anomalies.

pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use config::{DetectorConfig, GrowthCriterion};
pub use detector::{AnomalyDetector, DetectionReport};
pub use error::{DetectorError, Result};
pub use models::base_model::OutlierDetector;
pub use utils::evaluation::{ClassificationReport, ConfusionMatrix};
pub use utils::history::{HistoryBuffer, SignificanceFilter};
pub use utils::scaler::StandardScaler;
pub use utils::stats::matrix_from_rows;
