//! Learning-rate and temporal-skip schedules.

/// Polynomial decay `base * (1 - iter / total)^power`, refreshed every `update_every` iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyLr {
    pub base: f64,
    pub power: f64,
    pub total_iters: usize,
    pub update_every: usize,
}

impl PolyLr {
    pub fn at(&self, iter: usize) -> f64 {
        let total = self.total_iters.max(1) as f64;
        let progress = (iter as f64 / total).clamp(0.0, 1.0);
        self.base * (1.0 - progress).powf(self.power)
    }

    /// New learning rate when `iter` closes an update window.
    pub fn update(&self, iter: usize) -> Option<f64> {
        let every = self.update_every.max(1);
        ((iter + 1) % every == 0).then(|| self.at(iter))
    }
}

/// Per-dataset skip budgets after a curriculum step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipLevels {
    pub counter: usize,
    pub davis: usize,
    pub youtube: usize,
}

/// Grows the skip counter by one every `step_every` iterations up to `max_skip`.
///
/// DAVIS follows the counter directly. YouTube-VOS is annotated at a coarser
/// frame stride, so it receives a fifth of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipCurriculum {
    pub max_skip: usize,
    pub step_every: usize,
    counter: usize,
}

pub const YOUTUBE_SKIP_DIVISOR: usize = 5;

impl SkipCurriculum {
    pub fn new(max_skip: usize, step_every: usize) -> Self {
        Self {
            max_skip,
            step_every,
            counter: 0,
        }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn levels(&self) -> SkipLevels {
        SkipLevels {
            counter: self.counter,
            davis: self.counter,
            youtube: self.counter / YOUTUBE_SKIP_DIVISOR,
        }
    }

    /// Advance at the end of each window. Returns the levels to apply, even when
    /// the counter is already saturated, so loaders restart on the usual cadence.
    pub fn step(&mut self, iter: usize) -> Option<SkipLevels> {
        let every = self.step_every.max(1);
        if (iter + 1) % every != 0 {
            return None;
        }
        if self.counter < self.max_skip {
            self.counter += 1;
        }
        Some(self.levels())
    }
}
