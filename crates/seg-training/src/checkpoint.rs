//! Checkpoint retention: exactly one best file, plus periodic snapshots that
//! accumulate under a `checkpoints/` subdirectory.
//!
//! The manager only ever deletes the file it wrote itself; a missing file at
//! deletion time means the on-disk state is inconsistent with the run and is
//! treated as fatal. Writes go through a staging name and a rename, so a
//! checkpoint is never observable half-written.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::CompactRecorder;
use tracing::info;

use seg_core::{BackboneKind, Error, ModelKind, Result, TrainMode};

const SNAPSHOT_DIR: &str = "checkpoints";
const SNAPSHOT_PERIOD: usize = 10;

/// Tracks the best score seen and enforces the retention policy.
pub struct CheckpointManager {
    save_dir: PathBuf,
    model: ModelKind,
    backbone: BackboneKind,
    previous_best: f64,
    best_file: Option<PathBuf>,
}

impl CheckpointManager {
    /// Creates the save directory and its `checkpoints/` subdirectory
    /// eagerly, so filesystem problems surface before training starts.
    pub fn new(
        save_dir: impl Into<PathBuf>,
        model: ModelKind,
        backbone: BackboneKind,
    ) -> Result<Self> {
        let save_dir = save_dir.into();
        fs::create_dir_all(save_dir.join(SNAPSHOT_DIR))?;

        Ok(Self {
            save_dir,
            model,
            backbone,
            previous_best: 0.0,
            best_file: None,
        })
    }

    pub fn previous_best(&self) -> f64 {
        self.previous_best
    }

    pub fn best_file(&self) -> Option<&Path> {
        self.best_file.as_deref()
    }

    /// Retains `weights` iff `score` beats the previous best.
    ///
    /// The superseded best file is deleted first (skipped on the very first
    /// save), keeping exactly one best file on disk at any time. Returns
    /// whether a new best was written.
    pub fn update_best<B: Backend, M: Module<B>>(
        &mut self,
        weights: &M,
        score: f64,
    ) -> Result<bool> {
        if score <= self.previous_best {
            return Ok(false);
        }

        if let Some(old) = self.best_file.take() {
            fs::remove_file(&old).map_err(|e| {
                Error::Checkpoint(format!(
                    "failed to delete superseded checkpoint {}: {e}",
                    old.display()
                ))
            })?;
        }

        let stem = format!("{}_{}_{:.2}", self.model, self.backbone, score);
        let path = save_atomic(weights, &self.save_dir, &stem)?;
        info!(
            "New best checkpoint {} (previous best {:.2})",
            path.display(),
            self.previous_best
        );

        self.previous_best = score;
        self.best_file = Some(path);
        Ok(true)
    }

    /// Writes a snapshot tagged with epoch and score. Snapshots accumulate
    /// and are never deleted.
    pub fn snapshot<B: Backend, M: Module<B>>(
        &self,
        weights: &M,
        epoch: usize,
        score: f64,
    ) -> Result<PathBuf> {
        let stem = format!(
            "{}_{}_epoch_{}_{:.2}",
            self.model, self.backbone, epoch, score
        );
        let path = save_atomic(weights, &self.save_dir.join(SNAPSHOT_DIR), &stem)?;
        info!("Snapshot saved to {}", path.display());
        Ok(path)
    }
}

/// Snapshot cadence: every 10th epoch (0-indexed), fully-supervised runs
/// only.
pub fn should_snapshot(mode: TrainMode, epoch: usize) -> bool {
    mode.is_supervised() && epoch % SNAPSHOT_PERIOD == SNAPSHOT_PERIOD - 1
}

/// Writes the record under a dot-free staging name (the recorder appends its
/// own extension), then renames it to the final score-tagged name.
fn save_atomic<B: Backend, M: Module<B>>(weights: &M, dir: &Path, stem: &str) -> Result<PathBuf> {
    let staging = dir.join(format!("staging_{}", stem.replace('.', "_")));
    let recorder = CompactRecorder::new();

    weights
        .clone()
        .save_file(&staging, &recorder)
        .map_err(|e| Error::Checkpoint(format!("failed to write checkpoint {stem}: {e:?}")))?;

    let written = staging.with_extension("mpk");
    let target = dir.join(format!("{stem}.mpk"));
    fs::rename(&written, &target).map_err(|e| {
        Error::Checkpoint(format!(
            "failed to finalize checkpoint {}: {e}",
            target.display()
        ))
    })?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    fn test_weights() -> Linear<TestBackend> {
        let device = Default::default();
        LinearConfig::new(2, 2).init(&device)
    }

    fn best_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| {
                let entry = entry.unwrap();
                entry
                    .path()
                    .is_file()
                    .then(|| entry.file_name().to_string_lossy().to_string())
            })
            .filter(|name| name.ends_with(".mpk"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_best_retention_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = CheckpointManager::new(
            dir.path(),
            ModelKind::DeepLabV3Plus,
            BackboneKind::ResNet50,
        )
        .unwrap();
        let weights = test_weights();

        // Epoch 1: first best, nothing to delete.
        assert!(manager.update_best(&weights, 40.0).unwrap());
        assert_eq!(manager.previous_best(), 40.0);
        assert_eq!(
            best_files(dir.path()),
            vec!["deeplabv3plus_resnet50_40.00.mpk"]
        );

        // Epoch 2: worse score, no save, no deletion.
        assert!(!manager.update_best(&weights, 38.0).unwrap());
        assert_eq!(manager.previous_best(), 40.0);
        assert_eq!(
            best_files(dir.path()),
            vec!["deeplabv3plus_resnet50_40.00.mpk"]
        );

        // Epoch 3: new best replaces the old file.
        assert!(manager.update_best(&weights, 45.0).unwrap());
        assert_eq!(manager.previous_best(), 45.0);
        assert_eq!(
            best_files(dir.path()),
            vec!["deeplabv3plus_resnet50_45.00.mpk"]
        );
    }

    #[test]
    fn test_missing_best_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            CheckpointManager::new(dir.path(), ModelKind::PspNet, BackboneKind::ResNet50)
                .unwrap();
        let weights = test_weights();

        manager.update_best(&weights, 30.0).unwrap();
        fs::remove_file(manager.best_file().unwrap()).unwrap();

        let err = manager.update_best(&weights, 35.0).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    #[test]
    fn test_snapshots_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            CheckpointManager::new(dir.path(), ModelKind::DeepLabV2, BackboneKind::ResNet101)
                .unwrap();
        let weights = test_weights();

        let first = manager.snapshot(&weights, 9, 41.5).unwrap();
        let second = manager.snapshot(&weights, 19, 43.25).unwrap();

        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(
            first.file_name().unwrap().to_string_lossy(),
            "deeplabv2_resnet101_epoch_9_41.50.mpk"
        );
        assert_eq!(
            second.file_name().unwrap().to_string_lossy(),
            "deeplabv2_resnet101_epoch_19_43.25.mpk"
        );
        assert!(first.parent().unwrap().ends_with(SNAPSHOT_DIR));
        // Snapshots live outside the best-file directory listing.
        assert!(best_files(dir.path()).is_empty());
    }

    #[test]
    fn test_no_staging_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            CheckpointManager::new(dir.path(), ModelKind::PspNet, BackboneKind::ResNet101)
                .unwrap();
        let weights = test_weights();
        manager.update_best(&weights, 50.0).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| {
                let name = entry.unwrap().file_name().to_string_lossy().to_string();
                name.starts_with("staging_").then_some(name)
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_snapshot_cadence() {
        assert!(should_snapshot(TrainMode::Train, 9));
        assert!(should_snapshot(TrainMode::Train, 19));
        assert!(!should_snapshot(TrainMode::Train, 0));
        assert!(!should_snapshot(TrainMode::Train, 5));
        assert!(!should_snapshot(TrainMode::Train, 10));
        assert!(!should_snapshot(TrainMode::SemiTrain, 9));
        assert!(!should_snapshot(TrainMode::SemiTrain, 19));
    }
}
