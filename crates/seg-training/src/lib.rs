//! Training infrastructure for semi-supervised semantic segmentation.
//!
//! This crate provides:
//! - Model construction with separate backbone/head parameter groups
//! - Poly learning-rate decay with a head multiplier
//! - Masked per-pixel cross-entropy
//! - The per-epoch training and evaluation loops
//! - Checkpoint retention (single best file plus periodic snapshots)

pub mod checkpoint;
pub mod evaluator;
pub mod loss;
pub mod lr_schedule;
pub mod model;
pub mod trainer;

pub use checkpoint::{should_snapshot, CheckpointManager};
pub use evaluator::{evaluate_pass, print_report};
pub use loss::{flatten_mask, masked_cross_entropy, per_pixel_logits};
pub use lr_schedule::{GroupRates, PolyLrSchedule};
pub use model::{Backbone, SegHead, SegModel, SegModelConfig};
pub use trainer::{Trainer, TrainingState};
