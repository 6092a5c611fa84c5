//! Core types and utilities for semi-supervised semantic segmentation
//! training.
//!
//! This crate provides the foundational types shared across the workspace:
//! the error type, dataset/model/backbone identifiers, configuration
//! resolution with per-dataset defaults, and the confusion-matrix based
//! mean-IoU metric.

pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::{TrainConfig, TrainOptions};
pub use error::{Error, Result};
pub use metrics::{ConfusionMatrix, IouReport};
pub use types::{BackboneKind, DatasetKind, ModelKind, TrainMode, IGNORE_INDEX};
