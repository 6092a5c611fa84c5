//! Polynomial learning-rate decay with differential backbone/head rates.
//!
//! The rate is recomputed every iteration rather than every epoch:
//! `rate(t) = lr0 * (1 - t/T)^0.9`, starting at `lr0` and reaching exactly
//! zero at the final iteration. The task head runs at a fixed multiple of the
//! backbone rate. No warm-up.

/// Learning rates for the two parameter groups at one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupRates {
    pub backbone: f64,
    pub head: f64,
}

/// Poly decay schedule, a pure function of the completed iteration count.
#[derive(Debug, Clone)]
pub struct PolyLrSchedule {
    base_lr: f64,
    total_iters: usize,
    head_multiplier: f64,
    power: f64,
}

impl PolyLrSchedule {
    /// `total_iters` is epochs × batches-per-epoch (after drop-last); the
    /// driver never asks for rates past it.
    pub fn new(base_lr: f64, total_iters: usize, head_multiplier: f64) -> Self {
        Self {
            base_lr,
            total_iters: total_iters.max(1),
            head_multiplier,
            power: 0.9,
        }
    }

    /// Rates after `completed_iters` optimizer steps.
    pub fn rates(&self, completed_iters: usize) -> GroupRates {
        let t = completed_iters.min(self.total_iters) as f64;
        let factor = (1.0 - t / self.total_iters as f64).powf(self.power);
        let backbone = self.base_lr * factor;
        GroupRates {
            backbone,
            head: backbone * self.head_multiplier,
        }
    }

    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    pub fn total_iters(&self) -> usize {
        self.total_iters
    }

    pub fn head_multiplier(&self) -> f64 {
        self.head_multiplier
    }
}
