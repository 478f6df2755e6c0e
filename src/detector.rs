use ndarray::{ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::models::base_model::OutlierDetector;
use crate::models::dbscan::DbscanDetector;
use crate::models::kmeans::KMeansDetector;
use crate::models::oif::IsolationForest;
use crate::utils::history::{HistoryBuffer, SignificanceFilter};
use crate::utils::scaler::StandardScaler;

/// Everything produced by one `detect` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    /// Raw flags of each ensemble member, in ensemble order.
    pub per_detector: Vec<(&'static str, Vec<bool>)>,
    /// Logical OR of the member flags.
    pub ensemble: Vec<bool>,
    /// Ensemble flags after the significance filter.
    pub flags: Vec<bool>,
    pub demoted: usize,
}

/// Fitted normalizer and ensemble.
struct ModelState {
    scaler: StandardScaler,
    detectors: Vec<Box<dyn OutlierDetector>>,
    n_features: usize,
    n_clusters: usize,
}

impl ModelState {
    fn train(config: &DetectorConfig, features: ArrayView2<'_, f64>, rng: &mut StdRng) -> Result<Self> {
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(features)?;

        let mut isolation = IsolationForest::new(config, rng.gen());
        let mut centroid = KMeansDetector::new(config, rng.gen());
        let mut density = DbscanDetector::new(config);
        isolation.fit(scaled.view())?;
        centroid.fit(scaled.view())?;
        density.fit(scaled.view())?;
        let n_clusters = centroid.n_clusters().unwrap_or(1);

        let detectors: Vec<Box<dyn OutlierDetector>> =
            vec![Box::new(isolation), Box::new(centroid), Box::new(density)];
        Ok(ModelState {
            scaler,
            detectors,
            n_features: features.ncols(),
            n_clusters,
        })
    }
}

/// Ensemble anomaly detector with an adaptive significance filter.
///
/// The engine owns its model and its anomaly history; all operations take
/// `&mut self` and run to completion. Hosts that share one instance between
/// threads must serialize access themselves.
pub struct AnomalyDetector {
    config: DetectorConfig,
    rng: StdRng,
    state: Option<ModelState>,
    history: HistoryBuffer,
    filter: SignificanceFilter,
    generation: u64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        let config = DetectorConfig::default();
        AnomalyDetector {
            rng: StdRng::from_entropy(),
            history: HistoryBuffer::new(config.history_capacity),
            filter: SignificanceFilter::new(config.zscore_threshold, config.min_history),
            config,
            state: None,
            generation: 0,
        }
    }
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(AnomalyDetector {
            rng,
            history: HistoryBuffer::new(config.history_capacity),
            filter: SignificanceFilter::new(config.zscore_threshold, config.min_history),
            config,
            state: None,
            generation: 0,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.n_features)
    }

    pub fn n_clusters(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.n_clusters)
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Rows held in the incremental window of the named ensemble member.
    pub fn training_window(&self, detector: &str) -> Option<usize> {
        self.state
            .as_ref()?
            .detectors
            .iter()
            .find(|d| d.name() == detector)?
            .window_len()
    }

    /// Number of successful full fits, including refits from `partial_fit`.
    pub fn model_generation(&self) -> u64 {
        self.generation
    }

    /// Train normalizer and ensemble from scratch, replacing any prior model.
    pub fn fit(&mut self, features: ArrayView2<'_, f64>) -> Result<()> {
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(DetectorError::EmptyInput);
        }
        let state = ModelState::train(&self.config, features, &mut self.rng)?;

        // vectors of another width cannot be compared with the new model
        if self.history.n_features().map_or(false, |w| w != state.n_features) {
            self.history.clear();
        }
        self.generation += 1;
        info!(
            rows = features.nrows(),
            features = state.n_features,
            n_clusters = state.n_clusters,
            generation = self.generation,
            "model fitted"
        );
        self.state = Some(state);
        Ok(())
    }

    pub fn detect(&mut self, features: ArrayView2<'_, f64>) -> Result<Vec<bool>> {
        self.detect_detailed(features).map(|report| report.flags)
    }

    /// Run the ensemble, record its positives in the history and apply the
    /// significance filter.
    pub fn detect_detailed(&mut self, features: ArrayView2<'_, f64>) -> Result<DetectionReport> {
        let state = self.state.as_ref().ok_or(DetectorError::NotFitted)?;
        let scaled = state.scaler.transform(features)?;
        let n = features.nrows();
        if n == 0 {
            return Ok(DetectionReport::default());
        }

        let per_detector: Vec<(&'static str, Vec<bool>)> = state
            .detectors
            .par_iter()
            .map(|detector| (detector.name(), detector.flag(scaled.view())))
            .collect();

        let mut ensemble = vec![false; n];
        for (name, flags) in &per_detector {
            debug!(detector = *name, positives = flags.iter().filter(|&&f| f).count(), "detector evaluated");
            for (acc, &flagged) in ensemble.iter_mut().zip(flags) {
                *acc |= flagged;
            }
        }

        self.history.extend_flagged(features, &ensemble);
        let flags = self.filter.apply(&self.history, features, &ensemble);
        let demoted = ensemble.iter().zip(&flags).filter(|(&e, &f)| e && !f).count();
        debug!(
            rows = n,
            ensemble = ensemble.iter().filter(|&&f| f).count(),
            demoted,
            history = self.history.len(),
            "batch evaluated"
        );

        Ok(DetectionReport { per_detector, ensemble, flags, demoted })
    }

    /// Incrementally update the model with rows confirmed normal by `flags`,
    /// and occasionally refit everything on the batch to absorb drift.
    pub fn partial_fit(&mut self, features: ArrayView2<'_, f64>, flags: &[bool]) -> Result<()> {
        let state = self.state.as_mut().ok_or(DetectorError::NotFitted)?;
        if flags.len() != features.nrows() {
            return Err(DetectorError::ShapeMismatch { rows: features.nrows(), flags: flags.len() });
        }
        let scaled = state.scaler.transform(features)?;
        if features.nrows() == 0 {
            return Ok(());
        }

        let normal: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter(|(_, &flagged)| !flagged)
            .map(|(i, _)| i)
            .collect();
        if !normal.is_empty() {
            let normal_rows = scaled.select(Axis(0), &normal);
            for detector in state.detectors.iter_mut() {
                detector.partial_fit(normal_rows.view())?;
            }
        }
        debug!(rows = features.nrows(), normal = normal.len(), "incremental update applied");

        if self.rng.gen::<f64>() < self.config.refit_probability {
            info!(rows = features.nrows(), "periodic full refit");
            self.fit(features)?;
        }
        Ok(())
    }
}
