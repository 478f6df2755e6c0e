use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::utils::stats::column_mean_std;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bounded FIFO of raw feature vectors that the ensemble flagged as anomalous.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    window: VecDeque<Array1<f64>>,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        HistoryBuffer::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        HistoryBuffer {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Append one vector, evicting the oldest entry once the buffer is full.
    pub fn push(&mut self, x: ArrayView1<'_, f64>) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(x.to_owned());
    }

    /// Append the rows of `data` whose flag is set, in row order.
    pub fn extend_flagged(&mut self, data: ArrayView2<'_, f64>, flags: &[bool]) {
        for (row, &flagged) in data.rows().into_iter().zip(flags) {
            if flagged {
                self.push(row);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Width of the stored vectors, if any are stored.
    pub fn n_features(&self) -> Option<usize> {
        self.window.front().map(Array1::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Array1<f64>> {
        self.window.iter()
    }

    /// Per-dimension mean and population standard deviation of the buffer.
    pub fn statistics(&self) -> Option<HistoryStats> {
        let n_features = self.n_features()?;
        let mut data = Array2::zeros((self.window.len(), n_features));
        for (mut dst, src) in data.rows_mut().into_iter().zip(self.window.iter()) {
            dst.assign(src);
        }
        let (mean, std) = column_mean_std(&data.view())?;
        Some(HistoryStats { mean, std })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl HistoryStats {
    /// Absolute standardized score per dimension. Zero-spread dimensions score 0.
    pub fn z_scores(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut z = Array1::zeros(x.len());
        for i in 0..x.len() {
            let std = self.std[i];
            if std > f64::EPSILON {
                z[i] = ((x[i] - self.mean[i]) / std).abs();
            }
        }
        z
    }

    pub fn is_extreme(&self, x: ArrayView1<'_, f64>, threshold: f64) -> bool {
        self.z_scores(x).iter().any(|&z| z > threshold)
    }
}

/// Demotes ensemble positives that are not statistically extreme relative to
/// the anomaly history.
#[derive(Debug, Clone)]
pub struct SignificanceFilter {
    threshold: f64,
    min_history: usize,
}

impl SignificanceFilter {
    pub fn new(threshold: f64, min_history: usize) -> Self {
        SignificanceFilter { threshold, min_history }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the filtered flags. With `min_history` or fewer buffered vectors
    /// the input flags are returned unchanged.
    pub fn apply(&self, history: &HistoryBuffer, raw: ArrayView2<'_, f64>, flags: &[bool]) -> Vec<bool> {
        if history.len() <= self.min_history {
            return flags.to_vec();
        }
        let stats = match history.statistics() {
            Some(stats) => stats,
            None => return flags.to_vec(),
        };

        raw.rows()
            .into_iter()
            .zip(flags)
            .map(|(row, &flagged)| flagged && stats.is_extreme(row, self.threshold))
            .collect()
    }
}
