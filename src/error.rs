use thiserror::Error;

/// Errors reported by the detection engine and its components.
///
/// Every variant is raised before any state is touched, so a failed call
/// leaves the model and the anomaly history exactly as they were.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    #[error("model is not fitted, call fit() first")]
    NotFitted,

    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot fit on an empty feature matrix")]
    EmptyInput,

    #[error("shape mismatch: {flags} flags for {rows} rows")]
    ShapeMismatch { rows: usize, flags: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed configuration document: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DetectorError {
    fn from(err: serde_json::Error) -> Self {
        DetectorError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
