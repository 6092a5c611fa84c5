//! Per-pixel cross-entropy with an ignored label value.
//!
//! Pixels whose true label equals the ignore id contribute nothing to the
//! loss: their negative log-likelihoods are weighted to zero and the mean is
//! taken over the valid pixels only.

use burn::prelude::*;
use burn::tensor::activation;

/// Reshapes [batch, classes, height, width] scores into one logit row per
/// pixel: [batch * height * width, classes].
pub fn per_pixel_logits<B: Backend>(scores: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, classes, height, width] = scores.dims();
    scores
        .permute([0, 2, 3, 1])
        .reshape([batch * height * width, classes])
}

/// Flattens [batch, height, width] masks into one label per pixel.
pub fn flatten_mask<B: Backend>(masks: Tensor<B, 3, Int>) -> Tensor<B, 1, Int> {
    let [batch, height, width] = masks.dims();
    masks.reshape([batch * height * width])
}

/// Mean cross-entropy over the pixels whose label is not `ignore_index`.
///
/// Ignored labels are redirected to class 0 before the gather (so the index
/// stays in range) and then zero-weighted. A batch with no valid pixels
/// yields zero loss.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    ignore_index: usize,
) -> Tensor<B, 1> {
    let device = logits.device();
    let [num_pixels, _classes] = logits.dims();

    let valid = targets.clone().not_equal_elem(ignore_index as i64);
    let safe_targets = targets.mask_fill(valid.clone().bool_not(), 0);

    let log_probs = activation::log_softmax(logits, 1);
    let gathered = log_probs.gather(1, safe_targets.reshape([num_pixels, 1]));
    let nll = gathered.squeeze::<1>(1).neg();

    let weights = valid.float();
    let eps = Tensor::<B, 1>::from_floats([1e-8], &device);
    (nll * weights.clone()).sum() / (weights.sum() + eps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type TestBackend = NdArray<f32>;

    fn scalar(loss: Tensor<TestBackend, 1>) -> f64 {
        loss.into_scalar().elem()
    }

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 2, 0], [4]),
            &device,
        );

        let loss = scalar(masked_cross_entropy(logits, targets, 255));
        assert!((loss - 3.0f64.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_ignored_pixels_do_not_affect_loss() {
        let device = Default::default();
        // Second pixel carries extreme logits but an ignored label.
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0, 0.0], [100.0, -50.0, 3.0]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 255], [2]),
            &device,
        );

        let loss = scalar(masked_cross_entropy(logits, targets, 255));
        assert!((loss - 3.0f64.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_all_ignored_batch_is_zero() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([3, 4], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![255i64, 255, 255], [3]),
            &device,
        );

        let loss = scalar(masked_cross_entropy(logits, targets, 255));
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_confident_correct_prediction_has_low_loss() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[10.0, -10.0]], &device);
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64], [1]), &device);

        let loss = scalar(masked_cross_entropy(logits, targets, 255));
        assert!(loss < 1e-3);
    }

    #[test]
    fn test_per_pixel_logits_layout() {
        let device = Default::default();
        // One sample, two classes, 1x2 pixels. scores[0][c][0][x].
        let scores = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 2.0]], [[3.0, 4.0]]]],
            &device,
        );
        let logits = per_pixel_logits(scores);
        assert_eq!(logits.dims(), [2, 2]);

        let values: Vec<f32> = logits.into_data().to_vec().unwrap();
        // Pixel 0 gets (class0, class1) = (1, 3); pixel 1 gets (2, 4).
        assert_eq!(values, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_flatten_mask_layout() {
        let device = Default::default();
        let masks = Tensor::<TestBackend, 3, Int>::from_data(
            TensorData::new(vec![0i64, 1, 2, 3], [1, 2, 2]),
            &device,
        );
        let flat = flatten_mask(masks);
        let values: Vec<i64> = flat.into_data().to_vec().unwrap();
        assert_eq!(values, vec![0, 1, 2, 3]);
    }
}
