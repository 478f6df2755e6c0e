use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::DetectorConfig;
use crate::detector::AnomalyDetector;
use crate::error::DetectorError;
use crate::utils::evaluation::ConfusionMatrix;

impl From<DetectorError> for PyErr {
    fn from(err: DetectorError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[pyclass(name = "AnomalyDetector", unsendable)]
pub struct PyAnomalyDetector {
    inner: AnomalyDetector,
}

#[pymethods]
impl PyAnomalyDetector {
    #[new]
    #[pyo3(signature = (
        contamination = 0.1,
        n_estimators = 100,
        threshold = 2.5,
        refit_probability = 0.1,
        random_state = None,
        config_json = None
    ))]
    fn new(
        contamination: f64,
        n_estimators: usize,
        threshold: f64,
        refit_probability: f64,
        random_state: Option<u64>,
        config_json: Option<&str>,
    ) -> PyResult<Self> {
        let config = match config_json {
            Some(doc) => DetectorConfig::from_json_str(doc)?,
            None => DetectorConfig {
                contamination,
                n_estimators,
                zscore_threshold: threshold,
                refit_probability,
                random_state,
                ..Default::default()
            },
        };
        Ok(PyAnomalyDetector { inner: AnomalyDetector::new(config)? })
    }

    fn fit(&mut self, features: PyReadonlyArray2<f64>) -> PyResult<()> {
        self.inner.fit(features.as_array())?;
        Ok(())
    }

    fn detect_anomalies<'py>(
        &mut self,
        py: Python<'py>,
        features: PyReadonlyArray2<f64>,
    ) -> PyResult<&'py PyArray1<bool>> {
        let flags = self.inner.detect(features.as_array())?;
        Ok(flags.to_pyarray(py))
    }

    fn partial_fit(&mut self, features: PyReadonlyArray2<f64>, anomalies: PyReadonlyArray1<bool>) -> PyResult<()> {
        let flags = anomalies.as_array().to_vec();
        self.inner.partial_fit(features.as_array(), &flags)?;
        Ok(())
    }

    #[getter]
    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }

    #[getter]
    fn n_features(&self) -> Option<usize> {
        self.inner.n_features()
    }

    #[getter]
    fn n_clusters(&self) -> Option<usize> {
        self.inner.n_clusters()
    }

    #[getter]
    fn history_len(&self) -> usize {
        self.inner.history_len()
    }

    #[getter]
    fn model_generation(&self) -> u64 {
        self.inner.model_generation()
    }
}

/// Precision, recall and F1 of predicted flags against ground truth.
#[pyfunction]
fn evaluate(predicted: PyReadonlyArray1<bool>, truth: PyReadonlyArray1<bool>) -> PyResult<(f64, f64, f64)> {
    let predicted = predicted.as_array().to_vec();
    let truth = truth.as_array().to_vec();
    let cm = ConfusionMatrix::from_flags(&predicted, &truth)?;
    Ok((cm.precision(), cm.recall(), cm.f1()))
}

/// A Python module implemented in Rust.
#[pymodule]
fn adaptive_ids(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyAnomalyDetector>()?;
    m.add_function(wrap_pyfunction!(evaluate, m)?)?;
    Ok(())
}
