//! Burn batcher turning loaded samples into image and mask tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::sample::SegItem;

/// A batch of segmentation samples.
#[derive(Clone, Debug)]
pub struct SegBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width], ImageNet-normalized.
    pub images: Tensor<B, 4>,
    /// Label masks with shape [batch_size, height, width].
    pub masks: Tensor<B, 3, Int>,
}

/// Batcher for segmentation samples.
///
/// All items in a batch must share one resolution; training items are
/// resized to the crop size at load time, and validation batches are sized
/// so this holds (full batches only for single-resolution datasets).
#[derive(Clone, Debug)]
pub struct SegBatcher<B: Backend> {
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> SegBatcher<B> {
    pub fn new() -> Self {
        Self {
            _backend: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegItem, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegItem>, device: &B::Device) -> SegBatch<B> {
        let batch_size = items.len();
        let height = items.first().map(|item| item.height).unwrap_or(0);
        let width = items.first().map(|item| item.width).unwrap_or(0);
        debug_assert!(
            items.iter().all(|i| i.height == height && i.width == width),
            "all items in a batch must share one resolution"
        );

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        // Apply ImageNet normalization: (x - mean) / std
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.485f32, 0.456, 0.406], [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.229f32, 0.224, 0.225], [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let masks_data: Vec<i64> = items.iter().flat_map(|item| item.mask.clone()).collect();
        let masks = Tensor::<B, 3, Int>::from_data(
            TensorData::new(masks_data, [batch_size, height, width]),
            device,
        );

        SegBatch { images, masks }
    }
}
