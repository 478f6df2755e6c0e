use linfa::prelude::*;
use linfa_clustering::Dbscan;
use ndarray::ArrayView2;
use tracing::warn;

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::models::base_model::OutlierDetector;

/// Density-connectivity detector: DBSCAN noise points are anomalous, core and
/// border points are normal.
///
/// Labels are computed on the evaluated batch itself, so fitting only pins
/// the feature width.
pub struct DbscanDetector {
    eps: f64,
    min_samples: usize,
    n_features: Option<usize>,
}

impl DbscanDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        DbscanDetector {
            eps: config.eps,
            min_samples: config.min_samples,
            n_features: None,
        }
    }

    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Cluster membership per row, `None` for noise.
    pub fn labels(&self, xs: ArrayView2<'_, f64>) -> Option<Vec<Option<usize>>> {
        let params = match Dbscan::params(self.min_samples).tolerance(self.eps).check() {
            Ok(params) => params,
            Err(err) => {
                warn!(%err, "invalid density parameters");
                return None;
            }
        };
        let memberships = params.transform(&xs);
        Some(memberships.to_vec())
    }
}

impl OutlierDetector for DbscanDetector {
    fn name(&self) -> &'static str {
        "dbscan_noise"
    }

    fn fit(&mut self, xs: ArrayView2<'_, f64>) -> Result<()> {
        if xs.nrows() == 0 {
            return Err(DetectorError::EmptyInput);
        }
        self.n_features = Some(xs.ncols());
        Ok(())
    }

    fn flag(&self, xs: ArrayView2<'_, f64>) -> Vec<bool> {
        if xs.nrows() == 0 {
            return Vec::new();
        }
        match self.labels(xs) {
            Some(labels) => labels.iter().map(Option::is_none).collect(),
            None => vec![false; xs.nrows()],
        }
    }
}
