use ndarray::ArrayView2;

use crate::error::Result;

/// A common trait for the batch outlier detectors that make up the ensemble.
///
/// Detectors receive normalized data and emit one flag per row.
pub trait OutlierDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Train from scratch on a non-empty matrix.
    fn fit(&mut self, xs: ArrayView2<'_, f64>) -> Result<()>;

    /// Flag each row as anomalous (`true`) or normal.
    fn flag(&self, xs: ArrayView2<'_, f64>) -> Vec<bool>;

    /// Default: incremental updates are ignored.
    fn partial_fit(&mut self, _xs: ArrayView2<'_, f64>) -> Result<()> {
        Ok(())
    }

    /// Rows currently backing an incremental model, `None` for detectors
    /// without one.
    fn window_len(&self) -> Option<usize> {
        None
    }
}
