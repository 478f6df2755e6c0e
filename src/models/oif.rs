use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{DetectorConfig, GrowthCriterion};
use crate::error::{DetectorError, Result};
use crate::models::base_model::OutlierDetector;
use crate::models::oif_tree::{random_path_length, OnlineIsolationTree};
use crate::utils::stats::percentile;

/// Online isolation forest with a contamination-calibrated decision threshold.
///
/// The forest keeps a sliding window of the rows it has learned; rows that fall
/// out of the window are unlearned so the model tracks recent normal traffic.
pub struct IsolationForest {
    n_estimators: usize,
    max_leaf_samples: usize,
    growth: GrowthCriterion,
    subsample: f64,
    branching_factor: usize,
    window_size: usize,
    contamination: f64,
    rng: StdRng,
    trees: Vec<OnlineIsolationTree>,
    window: VecDeque<Array1<f64>>,
    data_size: usize,
    normalization_factor: f64,
    threshold: f64,
}

impl IsolationForest {
    pub fn new(config: &DetectorConfig, seed: u64) -> Self {
        IsolationForest {
            n_estimators: config.n_estimators,
            max_leaf_samples: config.max_leaf_samples,
            growth: config.growth,
            subsample: config.subsample,
            branching_factor: config.branching_factor,
            window_size: config.window_size,
            contamination: config.contamination,
            rng: StdRng::seed_from_u64(seed),
            trees: Vec::new(),
            window: VecDeque::new(),
            data_size: 0,
            normalization_factor: 0.0,
            threshold: f64::INFINITY,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn initialize(&mut self) {
        self.trees = (0..self.n_estimators)
            .map(|_| {
                OnlineIsolationTree::new(
                    self.growth,
                    self.max_leaf_samples,
                    self.subsample,
                    self.branching_factor,
                    self.rng.gen::<u64>(),
                )
            })
            .collect();
        self.window.clear();
        self.data_size = 0;
    }

    fn refresh_normalization(&mut self) {
        self.normalization_factor = random_path_length(
            self.branching_factor,
            self.max_leaf_samples,
            self.data_size as f64 * self.subsample,
        );
    }

    fn learn_batch(&mut self, data: ArrayView2<'_, f64>) {
        self.data_size += data.nrows();
        self.trees.par_iter_mut().for_each(|tree| tree.learn(data));
        self.window.extend(data.rows().into_iter().map(|row| row.to_owned()));

        if self.window.len() > self.window_size {
            let excess = self.window.len() - self.window_size;
            let expired = stack_rows(self.window.drain(..excess));
            self.data_size = self.data_size.saturating_sub(excess);
            self.trees.par_iter_mut().for_each(|tree| tree.unlearn(expired.view()));
        }
        self.refresh_normalization();
        self.refresh_threshold();
    }

    /// Recalibrate the decision threshold on the current window.
    fn refresh_threshold(&mut self) {
        let window = stack_rows(self.window.iter().cloned());
        let scores = self.score(window.view());
        self.threshold = percentile(&scores, 100.0 * (1.0 - self.contamination)).unwrap_or(f64::INFINITY);
        debug!(
            window = self.window.len(),
            threshold = self.threshold,
            "isolation threshold refreshed"
        );
    }

    /// Anomaly score in (0, 1]; higher means easier to isolate.
    pub fn score(&self, data: ArrayView2<'_, f64>) -> Vec<f64> {
        let n = data.nrows();
        if self.trees.is_empty() || n == 0 {
            return vec![0.0; n];
        }

        let depths: Vec<Vec<f64>> = self.trees.par_iter().map(|tree| tree.predict(data)).collect();
        let mut mean_depths = vec![0.0; n];
        for tree_depths in &depths {
            for (acc, d) in mean_depths.iter_mut().zip(tree_depths) {
                *acc += d;
            }
        }

        let norm = if self.normalization_factor > 0.0 { self.normalization_factor } else { 1.0 };
        mean_depths
            .iter()
            .map(|&sum| 2f64.powf(-(sum / self.trees.len() as f64) / norm))
            .collect()
    }
}

fn stack_rows<I: IntoIterator<Item = Array1<f64>>>(rows: I) -> Array2<f64> {
    let rows: Vec<Array1<f64>> = rows.into_iter().collect();
    let n_features = rows.first().map_or(0, Array1::len);
    let mut out = Array2::zeros((rows.len(), n_features));
    for (mut dst, src) in out.rows_mut().into_iter().zip(rows.iter()) {
        dst.assign(src);
    }
    out
}

impl OutlierDetector for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn fit(&mut self, xs: ArrayView2<'_, f64>) -> Result<()> {
        if xs.nrows() == 0 {
            return Err(DetectorError::EmptyInput);
        }
        self.initialize();
        self.learn_batch(xs);
        Ok(())
    }

    fn flag(&self, xs: ArrayView2<'_, f64>) -> Vec<bool> {
        self.score(xs).into_iter().map(|s| s > self.threshold).collect()
    }

    fn partial_fit(&mut self, xs: ArrayView2<'_, f64>) -> Result<()> {
        if xs.nrows() == 0 {
            return Ok(());
        }
        if !self.is_fitted() {
            return self.fit(xs);
        }
        self.learn_batch(xs);
        Ok(())
    }

    fn window_len(&self) -> Option<usize> {
        Some(self.window.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blob(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        // sum of uniforms: bell-shaped with sparse tails
        Array2::from_shape_fn((n, 3), |_| (0..4).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>())
    }

    fn config() -> DetectorConfig {
        DetectorConfig { n_estimators: 50, max_leaf_samples: 8, ..Default::default() }
    }

    #[test]
    fn unfitted_forest_flags_nothing() {
        let forest = IsolationForest::new(&config(), 1);
        assert_eq!(forest.flag(blob(5, 0).view()), vec![false; 5]);
    }

    #[test]
    fn distant_point_scores_higher_than_the_bulk() {
        let mut forest = IsolationForest::new(&config(), 1);
        forest.fit(blob(500, 2).view()).unwrap();

        let probe = array![[0.0, 0.0, 0.0], [25.0, -25.0, 25.0]];
        let scores = forest.score(probe.view());
        assert!(scores[1] > scores[0]);
        assert!(forest.flag(probe.view())[1]);
    }

    #[test]
    fn training_flag_rate_follows_contamination() {
        let mut forest = IsolationForest::new(&config(), 3);
        let data = blob(400, 4);
        forest.fit(data.view()).unwrap();
        let flagged = forest.flag(data.view()).iter().filter(|&&f| f).count();
        assert!(flagged <= 40, "flagged {flagged} of 400");
    }

    #[test]
    fn partial_fit_respects_window() {
        let cfg = DetectorConfig { window_size: 300, ..config() };
        let mut forest = IsolationForest::new(&cfg, 5);
        forest.fit(blob(200, 6).view()).unwrap();
        assert_eq!(forest.window_len(), Some(200));

        forest.partial_fit(blob(200, 7).view()).unwrap();
        assert_eq!(forest.window_len(), Some(300));
        assert!(forest.threshold().is_finite());

        forest.partial_fit(Array2::zeros((0, 3)).view()).unwrap();
        assert_eq!(forest.window_len(), Some(300));
    }

    #[test]
    fn empty_fit_is_rejected() {
        let mut forest = IsolationForest::new(&config(), 1);
        assert_eq!(forest.fit(Array2::zeros((0, 3)).view()), Err(DetectorError::EmptyInput));
    }
}
