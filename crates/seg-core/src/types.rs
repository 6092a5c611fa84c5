//! Core type definitions for segmentation training.

use serde::{Deserialize, Serialize};

/// Reserved label value excluded from loss computation and metric
/// accumulation, shared by all supported datasets.
pub const IGNORE_INDEX: usize = 255;

/// Supported segmentation benchmark datasets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatasetKind {
    /// PASCAL VOC 2012
    Pascal,
    /// Cityscapes
    Cityscapes,
    /// COCO
    Coco,
}

impl DatasetKind {
    /// Number of classes, ignore id excluded.
    pub fn num_classes(&self) -> usize {
        match self {
            DatasetKind::Pascal => 21,
            DatasetKind::Cityscapes => 19,
            DatasetKind::Coco => 81,
        }
    }

    /// Default epoch count when none is given on the command line.
    pub fn default_epochs(&self) -> usize {
        match self {
            DatasetKind::Pascal => 80,
            DatasetKind::Cityscapes => 240,
            DatasetKind::Coco => 30,
        }
    }

    /// Default base learning rate, stated for a batch size of 16. The actual
    /// rate follows the linear scaling rule in [`crate::config`].
    pub fn default_base_lr(&self) -> f64 {
        match self {
            DatasetKind::Pascal => 0.001,
            DatasetKind::Cityscapes => 0.004,
            DatasetKind::Coco => 0.004,
        }
    }

    /// Default training crop size in pixels.
    pub fn default_crop_size(&self) -> usize {
        match self {
            DatasetKind::Pascal => 321,
            DatasetKind::Cityscapes => 721,
            DatasetKind::Coco => 321,
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetKind::Pascal => write!(f, "pascal"),
            DatasetKind::Cityscapes => write!(f, "cityscapes"),
            DatasetKind::Coco => write!(f, "coco"),
        }
    }
}

/// Segmentation model architecture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelKind {
    /// DeepLabV3+
    DeepLabV3Plus,
    /// PSPNet
    PspNet,
    /// DeepLabV2
    DeepLabV2,
}

impl ModelKind {
    /// Learning-rate multiplier applied to the task head relative to the
    /// backbone. DeepLabV2 starts from a full pretrained initialization and
    /// keeps both parameter groups at the same rate.
    pub fn head_lr_multiplier(&self) -> f64 {
        match self {
            ModelKind::DeepLabV2 => 1.0,
            _ => 10.0,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::DeepLabV3Plus => write!(f, "deeplabv3plus"),
            ModelKind::PspNet => write!(f, "pspnet"),
            ModelKind::DeepLabV2 => write!(f, "deeplabv2"),
        }
    }
}

/// Feature-extraction backbone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackboneKind {
    /// ResNet-50
    ResNet50,
    /// ResNet-101
    ResNet101,
}

impl std::fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackboneKind::ResNet50 => write!(f, "resnet50"),
            BackboneKind::ResNet101 => write!(f, "resnet101"),
        }
    }
}

/// Training regime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrainMode {
    /// Fully supervised: every training image carries a ground-truth mask.
    Train,
    /// Semi-supervised: a labeled set plus unlabeled ids whose masks come
    /// from an externally generated pseudo-mask directory.
    SemiTrain,
}

impl TrainMode {
    pub fn is_supervised(&self) -> bool {
        matches!(self, TrainMode::Train)
    }
}

impl std::fmt::Display for TrainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainMode::Train => write!(f, "train"),
            TrainMode::SemiTrain => write!(f, "semi_train"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_kind_display() {
        assert_eq!(DatasetKind::Pascal.to_string(), "pascal");
        assert_eq!(DatasetKind::Cityscapes.to_string(), "cityscapes");
        assert_eq!(DatasetKind::Coco.to_string(), "coco");
    }

    #[test]
    fn test_dataset_class_counts() {
        assert_eq!(DatasetKind::Pascal.num_classes(), 21);
        assert_eq!(DatasetKind::Cityscapes.num_classes(), 19);
        assert_eq!(DatasetKind::Coco.num_classes(), 81);
    }

    #[test]
    fn test_model_kind_display() {
        assert_eq!(ModelKind::DeepLabV3Plus.to_string(), "deeplabv3plus");
        assert_eq!(ModelKind::PspNet.to_string(), "pspnet");
        assert_eq!(ModelKind::DeepLabV2.to_string(), "deeplabv2");
    }

    #[test]
    fn test_head_lr_multiplier() {
        assert_eq!(ModelKind::DeepLabV3Plus.head_lr_multiplier(), 10.0);
        assert_eq!(ModelKind::PspNet.head_lr_multiplier(), 10.0);
        assert_eq!(ModelKind::DeepLabV2.head_lr_multiplier(), 1.0);
    }

    #[test]
    fn test_train_mode() {
        assert!(TrainMode::Train.is_supervised());
        assert!(!TrainMode::SemiTrain.is_supervised());
        assert_eq!(TrainMode::SemiTrain.to_string(), "semi_train");
    }
}
