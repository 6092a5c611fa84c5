//! Dataset loading, batching, and parallel prefetch for segmentation
//! training.
//!
//! Samples are addressed by opaque ids from plain-text id lists; each
//! supported benchmark contributes only its on-disk layout. Batches are
//! produced through burn's `Dataset`/`Batcher` integration, with a rayon
//! worker pool doing the image decoding.

pub mod batcher;
pub mod dataset;
pub mod ids;
pub mod loader;
pub mod sample;

pub use batcher::{SegBatch, SegBatcher};
pub use dataset::{layout, DatasetLayout, SegSampleSet};
pub use ids::{oversample_small, read_id_file};
pub use loader::{batch_plan, batch_stream, shuffled_batch_plan, ParallelLoader};
pub use sample::SegItem;
