//! Training configuration and defaults resolution.
//!
//! Command-line values that are left unset are filled from a per-dataset
//! defaults table, and the learning rate follows the linear scaling rule
//! (table value is stated per batch size 16). Resolution also enforces the
//! preconditions that must hold before any training starts.

use crate::types::{BackboneKind, DatasetKind, ModelKind, TrainMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Batch size the per-dataset base learning rates are stated for.
const REFERENCE_BATCH_SIZE: f64 = 16.0;

/// Raw training options, typically collected from the command line.
/// `lr`, `epochs`, and `crop_size` may be left unset and are filled from the
/// per-dataset defaults during [`TrainOptions::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOptions {
    pub dataset: DatasetKind,
    pub mode: TrainMode,
    pub data_root: PathBuf,
    pub labeled_id_path: PathBuf,
    pub unlabeled_id_path: Option<PathBuf>,
    pub pseudo_mask_path: Option<PathBuf>,
    pub save_path: PathBuf,
    pub batch_size: usize,
    pub lr: Option<f64>,
    pub epochs: Option<usize>,
    pub crop_size: Option<usize>,
    pub backbone: BackboneKind,
    pub model: ModelKind,
    /// Optional pretrained initialization, loaded before training starts.
    pub pretrained: Option<PathBuf>,
    pub seed: u64,
    /// Worker threads for training data loading.
    pub train_workers: usize,
    /// Worker threads for validation data loading.
    pub eval_workers: usize,
}

impl TrainOptions {
    /// Resolve defaults and validate preconditions.
    ///
    /// All configuration errors surface here, before any dataset or model
    /// work begins.
    pub fn resolve(self) -> Result<TrainConfig> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch size must be greater than 0".to_string(),
            ));
        }

        if self.mode == TrainMode::SemiTrain {
            let pseudo_mask_path = self.pseudo_mask_path.clone().ok_or_else(|| {
                Error::Config(
                    "the pseudo mask path must be specified in semi_train mode".to_string(),
                )
            })?;
            if !pseudo_mask_path.exists() {
                return Err(Error::Config(format!(
                    "the path of pseudo masks does not exist: {}",
                    pseudo_mask_path.display()
                )));
            }
            if self.unlabeled_id_path.is_none() {
                return Err(Error::Config(
                    "the path of unlabeled image ids must be specified in semi_train mode"
                        .to_string(),
                ));
            }
        }

        if self.model == ModelKind::DeepLabV2 && self.backbone != BackboneKind::ResNet101 {
            return Err(Error::Config(format!(
                "deeplabv2 requires the resnet101 backbone, got {}",
                self.backbone
            )));
        }

        let epochs = match self.epochs {
            Some(epochs) if epochs > 0 => epochs,
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "epoch count must be greater than 0".to_string(),
                ))
            }
            None => self.dataset.default_epochs(),
        };

        let lr = self.lr.unwrap_or_else(|| {
            self.dataset.default_base_lr() / REFERENCE_BATCH_SIZE * self.batch_size as f64
        });
        if lr <= 0.0 {
            return Err(Error::InvalidArgument(
                "learning rate must be positive".to_string(),
            ));
        }

        let crop_size = self.crop_size.unwrap_or_else(|| self.dataset.default_crop_size());

        // Validation images keep their native sizes, so only Cityscapes (one
        // uniform resolution) is evaluated in full batches.
        let eval_batch_size = match self.dataset {
            DatasetKind::Cityscapes => self.batch_size,
            _ => 1,
        };

        Ok(TrainConfig {
            dataset: self.dataset,
            mode: self.mode,
            data_root: self.data_root,
            labeled_id_path: self.labeled_id_path,
            unlabeled_id_path: self.unlabeled_id_path,
            pseudo_mask_path: self.pseudo_mask_path,
            save_path: self.save_path,
            batch_size: self.batch_size,
            eval_batch_size,
            lr,
            epochs,
            crop_size,
            backbone: self.backbone,
            model: self.model,
            head_lr_multiplier: self.model.head_lr_multiplier(),
            pretrained: self.pretrained,
            seed: self.seed,
            train_workers: self.train_workers.max(1),
            eval_workers: self.eval_workers.max(1),
        })
    }
}

/// Fully resolved training configuration, ready for the epoch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset: DatasetKind,
    pub mode: TrainMode,
    pub data_root: PathBuf,
    pub labeled_id_path: PathBuf,
    pub unlabeled_id_path: Option<PathBuf>,
    pub pseudo_mask_path: Option<PathBuf>,
    pub save_path: PathBuf,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub lr: f64,
    pub epochs: usize,
    pub crop_size: usize,
    pub backbone: BackboneKind,
    pub model: ModelKind,
    pub head_lr_multiplier: f64,
    pub pretrained: Option<PathBuf>,
    pub seed: u64,
    pub train_workers: usize,
    pub eval_workers: usize,
}

impl TrainConfig {
    pub fn num_classes(&self) -> usize {
        self.dataset.num_classes()
    }
}
