//! Evaluation loop: one inference pass over the validation set, accumulating
//! a confusion matrix into per-class and mean IoU.

use burn::prelude::*;
use tracing::debug;

use seg_core::{ConfusionMatrix, Error, IouReport, Result};
use seg_dataset::SegBatch;

/// Runs one evaluation pass.
///
/// `forward` maps an image batch to per-pixel class scores; predictions are
/// the per-pixel argmax. The matrix is reset at pass start, so it never
/// carries counts across passes. Batches must arrive in stable, deterministic
/// order; the caller's loader guarantees that. No parameters are mutated.
pub fn evaluate_pass<B, I, F>(
    batches: I,
    forward: F,
    metric: &mut ConfusionMatrix,
) -> Result<IouReport>
where
    B: Backend,
    I: Iterator<Item = Result<SegBatch<B>>>,
    F: Fn(Tensor<B, 4>) -> Tensor<B, 4>,
{
    metric.reset();
    let mut batch_count = 0usize;

    for batch in batches {
        let batch = batch?;

        let scores = forward(batch.images);
        let predicted = scores.argmax(1).squeeze::<3>(1);

        let predicted: Vec<i64> = predicted
            .into_data()
            .to_vec()
            .map_err(|e| Error::Metric(format!("failed to read predictions: {e:?}")))?;
        let truth: Vec<i64> = batch
            .masks
            .into_data()
            .to_vec()
            .map_err(|e| Error::Metric(format!("failed to read masks: {e:?}")))?;

        metric.add_batch(&predicted, &truth)?;
        batch_count += 1;

        if batch_count % 10 == 0 {
            debug!(
                "batch {}: running mIoU = {:.2}",
                batch_count,
                metric.evaluate().mean * 100.0
            );
        }
    }

    Ok(metric.evaluate())
}

/// Prints a per-class IoU table for a finished pass.
pub fn print_report(report: &IouReport) {
    println!("{}", "=".repeat(40));
    println!("{:<10} {:>10}", "Class", "IoU");
    println!("{}", "-".repeat(40));
    for (class_id, iou) in report.per_class.iter().enumerate() {
        println!("{:<10} {:>10.4}", class_id, iou);
    }
    println!("{}", "-".repeat(40));
    println!("{:<10} {:>10.4}", "mean", report.mean);
    println!("{}", "=".repeat(40));
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// Four 2x2 samples over 3 classes. The images are one-hot class scores
    /// themselves, so an identity forward predicts channel argmax directly:
    /// samples 0..2 predict their true class, sample 3 is truth 0 but
    /// predicted 1.
    fn synthetic_batches() -> Vec<Result<SegBatch<TestBackend>>> {
        let device: <TestBackend as Backend>::Device = Default::default();

        let sample = |predicted: usize, truth: i64| {
            let mut image = vec![0.1f32; 3 * 4];
            for pixel in 0..4 {
                image[predicted * 4 + pixel] = 0.9;
            }
            let images = Tensor::<TestBackend, 4>::from_floats(
                TensorData::new(image, [1, 3, 2, 2]),
                &device,
            );
            let masks = Tensor::<TestBackend, 3, Int>::from_data(
                TensorData::new(vec![truth; 4], [1, 2, 2]),
                &device,
            );
            Ok(SegBatch { images, masks })
        };

        vec![sample(0, 0), sample(1, 1), sample(2, 2), sample(1, 0)]
    }

    #[test]
    fn test_identity_model_exact_miou() {
        let mut metric = ConfusionMatrix::new(3, 255);
        let report =
            evaluate_pass(synthetic_batches().into_iter(), |images| images, &mut metric).unwrap();

        // Confusion matrix: m[0][0]=4, m[1][1]=4, m[2][2]=4, m[0][1]=4.
        // IoU: class 0 = 4/8, class 1 = 4/8, class 2 = 4/4.
        assert!((report.per_class[0] - 0.5).abs() < 1e-12);
        assert!((report.per_class[1] - 0.5).abs() < 1e-12);
        assert!((report.per_class[2] - 1.0).abs() < 1e-12);
        assert!((report.mean - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_passes_are_deterministic() {
        let mut metric = ConfusionMatrix::new(3, 255);

        let first =
            evaluate_pass(synthetic_batches().into_iter(), |images| images, &mut metric).unwrap();
        let second =
            evaluate_pass(synthetic_batches().into_iter(), |images| images, &mut metric).unwrap();

        // The reset at pass start keeps passes independent and identical.
        assert_eq!(first.per_class, second.per_class);
        assert_eq!(first.mean, second.mean);
        assert_eq!(metric.total(), 16);
    }

    #[test]
    fn test_ignored_pixels_left_out_of_matrix() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let images = Tensor::<TestBackend, 4>::from_floats(
            TensorData::new(vec![0.9, 0.9, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1], [1, 2, 2, 2]),
            &device,
        );
        let masks = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::new(vec![0i64, 255, 255, 255], [1, 2, 2]),
            &device,
        );
        let batches = vec![Ok(SegBatch { images, masks })];

        let mut metric = ConfusionMatrix::new(2, 255);
        evaluate_pass(batches.into_iter(), |images| images, &mut metric).unwrap();
        assert_eq!(metric.total(), 1);
    }

    #[test]
    fn test_loader_error_propagates() {
        let mut metric = ConfusionMatrix::new(3, 255);
        let batches: Vec<Result<SegBatch<TestBackend>>> =
            vec![Err(Error::Dataset("unreadable image".into()))];
        assert!(evaluate_pass(batches.into_iter(), |images| images, &mut metric).is_err());
    }
}
