//! Evaluation metrics for semantic segmentation.
//!
//! The central structure is a running confusion matrix accumulated over an
//! entire validation pass, from which per-class IoU and its mean are
//! derived. Deriving the report is a pure read, so it can be called mid-pass
//! for progress display without disturbing the accumulation.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Running confusion matrix over pixel classifications.
///
/// Cell (i, j) counts pixels with true class i predicted as class j. Pixels
/// whose true label equals the ignore id are excluded, as are pairs carrying
/// a class id outside `[0, num_classes)`.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    ignore_index: i64,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize, ignore_index: usize) -> Self {
        Self {
            num_classes,
            ignore_index: ignore_index as i64,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Clears all counts. Called at the start of every evaluation pass; the
    /// matrix never survives across passes.
    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    /// Accumulates one batch of pixel predictions against ground truth.
    ///
    /// Counts only grow, so repeated calls over disjoint pixel sets add up.
    /// The two slices must pair up pixel by pixel.
    pub fn add_batch(&mut self, predicted: &[i64], truth: &[i64]) -> Result<()> {
        if predicted.len() != truth.len() {
            return Err(Error::Metric(format!(
                "prediction/truth length mismatch: {} vs {}",
                predicted.len(),
                truth.len()
            )));
        }

        let classes = self.num_classes as i64;
        for (&pred, &label) in predicted.iter().zip(truth.iter()) {
            if label == self.ignore_index {
                continue;
            }
            if label < 0 || label >= classes || pred < 0 || pred >= classes {
                continue;
            }
            self.counts[label as usize * self.num_classes + pred as usize] += 1;
        }

        Ok(())
    }

    /// Count of pixels with true class `truth` predicted as `predicted`.
    pub fn count(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.num_classes + predicted]
    }

    /// Total number of accumulated pixels.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Derives per-class and mean IoU from the current matrix snapshot.
    ///
    /// A class absent from the pass (all-zero row and column) gets IoU 0.0
    /// and still participates in the mean, so the headline number is always
    /// defined and comparable across runs.
    pub fn evaluate(&self) -> IouReport {
        let c = self.num_classes;
        let mut per_class = Vec::with_capacity(c);

        for i in 0..c {
            let tp = self.counts[i * c + i];
            let row: u64 = (0..c).map(|j| self.counts[i * c + j]).sum();
            let col: u64 = (0..c).map(|j| self.counts[j * c + i]).sum();
            let denominator = row + col - tp;
            let iou = if denominator == 0 {
                0.0
            } else {
                tp as f64 / denominator as f64
            };
            per_class.push(iou);
        }

        let mean = per_class.iter().sum::<f64>() / c as f64;
        IouReport { per_class, mean }
    }
}

/// Per-class IoU vector and its mean, the headline metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IouReport {
    pub per_class: Vec<f64>,
    pub mean: f64,
}
