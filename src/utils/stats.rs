use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::Quantile1dExt;
use noisy_float::types::N64;

use crate::error::{DetectorError, Result};

/// Build a feature matrix from row vectors, rejecting ragged input.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n_features = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(rows.len() * n_features);
    for row in rows {
        if row.len() != n_features {
            return Err(DetectorError::DimensionMismatch { expected: n_features, actual: row.len() });
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), n_features), flat)
        .map_err(|_| DetectorError::DimensionMismatch { expected: n_features, actual: 0 })
}

pub(crate) fn check_width(data: &ArrayView2<'_, f64>, expected: usize) -> Result<()> {
    if data.ncols() != expected {
        return Err(DetectorError::DimensionMismatch { expected, actual: data.ncols() });
    }
    Ok(())
}

/// Per-column mean and population standard deviation. `None` for zero rows.
pub fn column_mean_std(data: &ArrayView2<'_, f64>) -> Option<(Array1<f64>, Array1<f64>)> {
    let mean = data.mean_axis(Axis(0))?;
    let std = data.std_axis(Axis(0), 0.0);
    Some((mean, std))
}

/// Percentile with linear interpolation between closest ranks (`q` in 0..=100).
/// NaN values are ignored.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut data: Array1<N64> = values.iter().filter_map(|&v| N64::try_new(v)).collect();
    let q = N64::try_new(q.clamp(0.0, 100.0) / 100.0)?;
    data.quantile_mut(q, &Linear).ok().map(N64::raw)
}

pub fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
