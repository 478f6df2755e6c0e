use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{DetectorError, Result};
use crate::utils::stats::{check_width, column_mean_std};

/// Zero-mean / unit-variance feature scaling with statistics learned at fit time.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn per-dimension mean and scale. Zero-variance dimensions get scale 1.
    pub fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<()> {
        let (mean, std) = column_mean_std(&data).ok_or(DetectorError::EmptyInput)?;
        let scale = std.mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (mean, scale) = match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => (mean, scale),
            _ => return Err(DetectorError::NotFitted),
        };
        check_width(&data, mean.len())?;

        let mut out = data.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            row -= mean;
            row /= scale;
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.fit(data)?;
        self.transform(data)
    }

    pub fn n_features(&self) -> Option<usize> {
        self.mean.as_ref().map(Array1::len)
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}
