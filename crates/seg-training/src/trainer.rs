//! Training loop: one optimization pass per epoch with per-iteration
//! learning-rate updates for both parameter groups.

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use seg_core::Result;
use seg_dataset::SegBatch;

use crate::loss::{flatten_mask, masked_cross_entropy, per_pixel_logits};
use crate::lr_schedule::{GroupRates, PolyLrSchedule};
use crate::model::{Backbone, SegHead, SegModel};

/// Mutable training bookkeeping, owned by the trainer and threaded through
/// every epoch. The iteration count is global: it advances monotonically
/// across epochs and is never reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingState {
    pub epoch: usize,
    pub iteration: usize,
    pub last_epoch_loss: f64,
}

/// Trainer holding the model and one SGD optimizer per parameter group.
pub struct Trainer<B: AutodiffBackend> {
    model: SegModel<B>,
    backbone_optim: OptimizerAdaptor<Sgd<B::InnerBackend>, Backbone<B>, B>,
    head_optim: OptimizerAdaptor<Sgd<B::InnerBackend>, SegHead<B>, B>,
    schedule: PolyLrSchedule,
    ignore_index: usize,
    pub state: TrainingState,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: SegModel<B>, schedule: PolyLrSchedule, ignore_index: usize) -> Self {
        let sgd = || {
            SgdConfig::new()
                .with_momentum(Some(
                    MomentumConfig::new().with_momentum(0.9).with_dampening(0.0),
                ))
                .with_weight_decay(Some(WeightDecayConfig::new(1e-4)))
        };

        Self {
            model,
            backbone_optim: sgd().init(),
            head_optim: sgd().init(),
            schedule,
            ignore_index,
            state: TrainingState::default(),
        }
    }

    pub fn model(&self) -> &SegModel<B> {
        &self.model
    }

    /// Swaps in different weights, e.g. a pretrained initialization.
    pub fn set_model(&mut self, model: SegModel<B>) {
        self.model = model;
    }

    /// Inference copy of the current weights on the inner backend.
    pub fn valid_model(&self) -> SegModel<B::InnerBackend> {
        self.model.valid()
    }

    /// Group rates at the current global iteration.
    pub fn current_rates(&self) -> GroupRates {
        self.schedule.rates(self.state.iteration)
    }

    /// Runs one epoch of optimization over `batches`.
    ///
    /// Each batch: forward, masked per-pixel cross-entropy, backward, one
    /// optimizer step per parameter group at the rates for the incremented
    /// global iteration. Returns the epoch's mean loss.
    pub fn train_epoch(
        &mut self,
        batches: impl Iterator<Item = Result<SegBatch<B>>>,
    ) -> Result<f64> {
        let mut total_loss = 0.0;
        let mut batch_count = 0usize;

        for batch in batches {
            let batch = batch?;

            let scores = self.model.forward(batch.images);
            let logits = per_pixel_logits(scores);
            let targets = flatten_mask(batch.masks);
            let loss = masked_cross_entropy(logits, targets, self.ignore_index);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let backbone_grads =
                GradientsParams::from_grads(loss.backward(), &self.model.backbone);
            let head_grads = GradientsParams::from_grads(loss.backward(), &self.model.head);

            self.state.iteration += 1;
            let rates = self.schedule.rates(self.state.iteration);

            let backbone = self.backbone_optim.step(
                rates.backbone,
                self.model.backbone.clone(),
                backbone_grads,
            );
            let head = self
                .head_optim
                .step(rates.head, self.model.head.clone(), head_grads);
            self.model = SegModel { backbone, head };

            total_loss += loss_value;
            batch_count += 1;

            if batch_count % 10 == 0 {
                debug!(
                    "batch {}: loss = {:.4}, running mean = {:.4}",
                    batch_count,
                    loss_value,
                    total_loss / batch_count as f64
                );
            }
        }

        self.state.epoch += 1;
        let mean_loss = total_loss / batch_count.max(1) as f64;
        self.state.last_epoch_loss = mean_loss;
        Ok(mean_loss)
    }
}
