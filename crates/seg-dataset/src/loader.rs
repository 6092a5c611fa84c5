//! Batch planning and parallel sample loading.
//!
//! The control loop stays single-threaded; only sample loading and decoding
//! run on a fixed-size rayon pool. `par_iter` preserves input order, so the
//! produced batches are deterministic for a given plan regardless of worker
//! count, which evaluation relies on.

use burn::data::dataset::Dataset;
use burn::prelude::Backend;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use seg_core::{Error, Result};

use crate::batcher::{SegBatch, SegBatcher};
use crate::sample::SegItem;

/// Splits `len` samples into index batches in natural order.
///
/// With `drop_last` the final incomplete batch is discarded (training);
/// without it the partial batch is kept (evaluation).
pub fn batch_plan(len: usize, batch_size: usize, drop_last: bool) -> Vec<Vec<usize>> {
    let indices: Vec<usize> = (0..len).collect();
    plan_from_indices(indices, batch_size, drop_last)
}

/// Splits `len` samples into shuffled index batches, dropping the final
/// incomplete batch. Reuses the caller's RNG so successive epochs see
/// different orders while staying reproducible from the seed.
pub fn shuffled_batch_plan(len: usize, batch_size: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    plan_from_indices(indices, batch_size, true)
}

fn plan_from_indices(indices: Vec<usize>, batch_size: usize, drop_last: bool) -> Vec<Vec<usize>> {
    let mut plan: Vec<Vec<usize>> = indices
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    if drop_last {
        if let Some(last) = plan.last() {
            if last.len() < batch_size {
                plan.pop();
            }
        }
    }

    plan
}

/// Fixed-size worker pool for loading batches of samples in parallel.
pub struct ParallelLoader {
    pool: rayon::ThreadPool,
}

impl ParallelLoader {
    pub fn new(num_workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .build()
            .map_err(|e| Error::Dataset(format!("failed to build loader thread pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Loads one batch of samples, preserving the order of `indices`.
    pub fn load_batch<I, D>(&self, dataset: &D, indices: &[usize]) -> Result<Vec<I>>
    where
        D: Dataset<I>,
        I: Send,
    {
        self.pool.install(|| {
            indices
                .par_iter()
                .map(|&index| {
                    dataset.get(index).ok_or_else(|| {
                        Error::Dataset(format!("failed to load sample at index {index}"))
                    })
                })
                .collect()
        })
    }
}

/// Lazily loads and batches samples following `plan`, one tensor batch at a
/// time. Tensor construction happens on the calling thread.
pub fn batch_stream<'a, B, D>(
    loader: &'a ParallelLoader,
    dataset: &'a D,
    plan: &'a [Vec<usize>],
    batcher: &'a SegBatcher<B>,
    device: &'a B::Device,
) -> impl Iterator<Item = Result<SegBatch<B>>> + 'a
where
    B: Backend,
    D: Dataset<SegItem>,
{
    use burn::data::dataloader::batcher::Batcher;

    plan.iter().map(move |indices| {
        loader
            .load_batch(dataset, indices)
            .map(|items| batcher.batch(items, device))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct RangeSet {
        len: usize,
    }

    impl Dataset<usize> for RangeSet {
        fn get(&self, index: usize) -> Option<usize> {
            (index < self.len).then_some(index * 10)
        }

        fn len(&self) -> usize {
            self.len
        }
    }

    #[test]
    fn test_batch_plan_drop_last() {
        let plan = batch_plan(10, 4, true);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|batch| batch.len() == 4));
    }

    #[test]
    fn test_batch_plan_keep_last() {
        let plan = batch_plan(10, 4, false);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2], vec![8, 9]);
    }

    #[test]
    fn test_batch_plan_exact_multiple() {
        assert_eq!(batch_plan(8, 4, true).len(), 2);
        assert_eq!(batch_plan(8, 4, false).len(), 2);
    }

    #[test]
    fn test_shuffled_plan_is_seed_deterministic() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = ChaCha8Rng::seed_from_u64(7);
        let plan_a = shuffled_batch_plan(20, 4, &mut rng_a);
        let plan_b = shuffled_batch_plan(20, 4, &mut rng_b);
        assert_eq!(plan_a, plan_b);

        // Successive plans from one RNG differ (fresh shuffle per epoch).
        let plan_c = shuffled_batch_plan(20, 4, &mut rng_a);
        assert_ne!(plan_a, plan_c);
    }

    #[test]
    fn test_shuffled_plan_covers_all_kept_indices() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = shuffled_batch_plan(10, 4, &mut rng);
        assert_eq!(plan.len(), 2);
        let mut seen: Vec<usize> = plan.into_iter().flatten().collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_parallel_load_preserves_order() {
        let loader = ParallelLoader::new(8).unwrap();
        let dataset = RangeSet { len: 100 };
        let indices: Vec<usize> = (0..100).collect();

        let items = loader.load_batch(&dataset, &indices).unwrap();
        let expected: Vec<usize> = (0..100).map(|i| i * 10).collect();
        assert_eq!(items, expected);
    }

    #[test]
    fn test_parallel_load_missing_sample_is_error() {
        let loader = ParallelLoader::new(2).unwrap();
        let dataset = RangeSet { len: 3 };
        assert!(loader.load_batch(&dataset, &[0, 1, 7]).is_err());
    }
}
