use std::cmp::Ordering;

use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::models::base_model::OutlierDetector;
use crate::utils::stats::{euclidean_distance, percentile};

const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;

/// Outcome of the cluster-count scan.
#[derive(Debug, Clone)]
pub struct ClusterSelection {
    pub n_clusters: usize,
    /// Silhouette score of the winner; `None` for the single-centroid fallback.
    pub silhouette: Option<f64>,
    pub centroids: Array2<f64>,
}

/// Scan `k` over `min_k..=max_k` and keep the assignment with the best
/// silhouette score. Candidates that cannot be fitted or scored are skipped.
pub fn select_cluster_count(
    data: ArrayView2<'_, f64>,
    min_k: usize,
    max_k: usize,
    rng: &mut StdRng,
) -> ClusterSelection {
    let n = data.nrows();
    let distinct = distinct_rows(data);
    let mut best: Option<ClusterSelection> = None;

    for k in min_k..=max_k {
        // k-means++ seeding needs k distinct points, silhouette needs k < n
        if k > distinct || k >= n {
            break;
        }
        let seed = rng.gen::<u64>();
        match fit_candidate(data, k, seed) {
            Ok((score, centroids)) => {
                debug!(k, score, "cluster candidate scored");
                if best.as_ref().and_then(|b| b.silhouette).map_or(true, |s| score > s) {
                    best = Some(ClusterSelection { n_clusters: k, silhouette: Some(score), centroids });
                }
            }
            Err(reason) => debug!(k, %reason, "cluster candidate skipped"),
        }
    }

    best.unwrap_or_else(|| {
        warn!(rows = n, "no cluster candidate could be scored, falling back to a single centroid");
        let centroid = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| ndarray::Array1::zeros(data.ncols()));
        ClusterSelection {
            n_clusters: 1,
            silhouette: None,
            centroids: centroid.insert_axis(Axis(0)),
        }
    })
}

fn distinct_rows(data: ArrayView2<'_, f64>) -> usize {
    let mut rows: Vec<Vec<f64>> = data.rows().into_iter().map(|r| r.to_vec()).collect();
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows.dedup();
    rows.len()
}

fn fit_candidate(data: ArrayView2<'_, f64>, k: usize, seed: u64) -> std::result::Result<(f64, Array2<f64>), String> {
    let dataset = DatasetBase::from(data.to_owned());
    let model = KMeans::params_with_rng(k, StdRng::seed_from_u64(seed))
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| e.to_string())?;

    let centroids = model.centroids().to_owned();
    let labelled = model.predict(dataset);
    let score = labelled.silhouette_score().map_err(|e| e.to_string())?;
    if !score.is_finite() {
        return Err(format!("non-finite silhouette {score}"));
    }
    Ok((score, centroids))
}

/// Flags points whose distance to the nearest centroid exceeds a percentile of
/// the nearest-centroid distances of the evaluated batch.
pub struct KMeansDetector {
    min_clusters: usize,
    max_clusters: usize,
    distance_percentile: f64,
    rng: StdRng,
    selection: Option<ClusterSelection>,
}

impl KMeansDetector {
    pub fn new(config: &DetectorConfig, seed: u64) -> Self {
        KMeansDetector {
            min_clusters: config.min_clusters,
            max_clusters: config.max_clusters,
            distance_percentile: config.distance_percentile,
            rng: StdRng::seed_from_u64(seed),
            selection: None,
        }
    }

    pub fn n_clusters(&self) -> Option<usize> {
        self.selection.as_ref().map(|s| s.n_clusters)
    }

    pub fn silhouette(&self) -> Option<f64> {
        self.selection.as_ref().and_then(|s| s.silhouette)
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.selection.as_ref().map(|s| &s.centroids)
    }

    pub fn nearest_distances(&self, xs: ArrayView2<'_, f64>) -> Vec<f64> {
        let centroids = match &self.selection {
            Some(selection) => &selection.centroids,
            None => return vec![0.0; xs.nrows()],
        };
        xs.rows()
            .into_iter()
            .map(|row| {
                centroids
                    .rows()
                    .into_iter()
                    .map(|c| euclidean_distance(row, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    }
}

impl OutlierDetector for KMeansDetector {
    fn name(&self) -> &'static str {
        "kmeans_distance"
    }

    fn fit(&mut self, xs: ArrayView2<'_, f64>) -> Result<()> {
        if xs.nrows() == 0 {
            return Err(DetectorError::EmptyInput);
        }
        let selection = select_cluster_count(xs, self.min_clusters, self.max_clusters, &mut self.rng);
        debug!(n_clusters = selection.n_clusters, silhouette = ?selection.silhouette, "cluster count selected");
        self.selection = Some(selection);
        Ok(())
    }

    fn flag(&self, xs: ArrayView2<'_, f64>) -> Vec<bool> {
        if self.selection.is_none() {
            return vec![false; xs.nrows()];
        }
        let distances = self.nearest_distances(xs);
        let cutoff = match percentile(&distances, self.distance_percentile) {
            Some(cutoff) => cutoff,
            None => return Vec::new(),
        };
        distances.into_iter().map(|d| d > cutoff).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_blobs(per_blob: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let centres = [(0.0, 0.0), (10.0, 10.0), (-10.0, 10.0)];
        let mut rows = Vec::new();
        for &(cx, cy) in &centres {
            for _ in 0..per_blob {
                rows.push(vec![cx + rng.gen_range(-0.5..0.5), cy + rng.gen_range(-0.5..0.5)]);
            }
        }
        crate::utils::stats::matrix_from_rows(&rows).unwrap()
    }

    #[test]
    fn picks_the_natural_cluster_count() {
        let data = three_blobs(30, 1);
        let mut rng = StdRng::seed_from_u64(9);
        let selection = select_cluster_count(data.view(), 2, 10, &mut rng);
        assert_eq!(selection.n_clusters, 3);
        assert!(selection.silhouette.unwrap() > 0.8);
        assert_eq!(selection.centroids.nrows(), 3);
    }

    #[test]
    fn tiny_input_falls_back_to_one_centroid() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let selection = select_cluster_count(data.view(), 2, 10, &mut rng);
        assert_eq!(selection.n_clusters, 1);
        assert_eq!(selection.silhouette, None);
        assert_eq!(selection.centroids, array![[2.0, 3.0]]);
    }

    #[test]
    fn duplicate_rows_limit_the_scan() {
        let data = array![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [5.0, 5.0], [5.0, 5.0]];
        assert_eq!(distinct_rows(data.view()), 2);
        let mut rng = StdRng::seed_from_u64(0);
        let selection = select_cluster_count(data.view(), 2, 10, &mut rng);
        assert_eq!(selection.n_clusters, 2);
    }

    #[test]
    fn flags_points_far_from_every_centroid() {
        let config = DetectorConfig::default();
        let mut detector = KMeansDetector::new(&config, 4);
        let train = three_blobs(30, 2);
        detector.fit(train.view()).unwrap();
        assert_eq!(detector.n_clusters(), Some(3));
        assert!(detector.silhouette().unwrap() > 0.8);
        assert_eq!(detector.centroids().map(|c| c.dim()), Some((3, 2)));

        let mut batch = three_blobs(15, 3);
        batch.push_row(array![40.0, -40.0].view()).unwrap();
        let flags = detector.flag(batch.view());
        assert_eq!(flags.len(), 46);
        assert!(flags[45]);
        assert!(flags.iter().filter(|&&f| f).count() <= 3);
    }

    #[test]
    fn unfitted_detector_flags_nothing() {
        let detector = KMeansDetector::new(&DetectorConfig::default(), 0);
        assert_eq!(detector.flag(array![[1.0], [2.0]].view()), vec![false, false]);
        assert_eq!(detector.n_clusters(), None);
        assert_eq!(detector.silhouette(), None);
        assert!(detector.centroids().is_none());
    }
}
