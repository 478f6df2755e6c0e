use serde::Serialize;

use crate::error::{DetectorError, Result};

/// Binary confusion matrix of predicted anomaly flags against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_flags(predicted: &[bool], truth: &[bool]) -> Result<Self> {
        if predicted.len() != truth.len() {
            return Err(DetectorError::ShapeMismatch { rows: truth.len(), flags: predicted.len() });
        }
        let mut cm = ConfusionMatrix::default();
        for (&p, &t) in predicted.iter().zip(truth) {
            match (p, t) {
                (true, true) => cm.true_positives += 1,
                (true, false) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_negatives += 1,
            }
        }
        Ok(cm)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport {
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
            support: self.true_positives + self.false_negatives,
            confusion: *self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of ground-truth anomalies.
    pub support: usize,
    pub confusion: ConfusionMatrix,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}
