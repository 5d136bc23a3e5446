//! Alternating draws between the DAVIS and YouTube-VOS loaders.

use crate::schedule::SkipLevels;
use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};
use vos_dataset::{DatasetResult, SampleBatch, SampleLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    Davis,
    Youtube,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Davis => write!(f, "davis"),
            Source::Youtube => write!(f, "youtube"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrawCounts {
    pub davis: usize,
    pub youtube: usize,
}

pub struct DatasetMixer {
    davis: SampleLoader,
    youtube: SampleLoader,
    /// Probability of drawing from DAVIS.
    sample_rate: f64,
    rng: StdRng,
    counts: DrawCounts,
}

impl DatasetMixer {
    pub fn new(davis: SampleLoader, youtube: SampleLoader, sample_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            davis,
            youtube,
            sample_rate: sample_rate.clamp(0.0, 1.0),
            rng,
            counts: DrawCounts::default(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn counts(&self) -> DrawCounts {
        self.counts
    }

    pub fn loader(&self, source: Source) -> &SampleLoader {
        match source {
            Source::Davis => &self.davis,
            Source::Youtube => &self.youtube,
        }
    }

    pub fn choose(&mut self) -> Source {
        if self.rng.random::<f64>() < self.sample_rate {
            Source::Davis
        } else {
            Source::Youtube
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<(Source, SampleBatch<B>)> {
        let source = self.choose();
        let batch = match source {
            Source::Davis => {
                self.counts.davis += 1;
                self.davis.next_batch::<B>(batch_size, device)?
            }
            Source::Youtube => {
                self.counts.youtube += 1;
                self.youtube.next_batch::<B>(batch_size, device)?
            }
        };
        debug!(%source, videos = ?batch.info.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), "drew batch");
        Ok((source, batch))
    }

    /// Push new skip budgets into both datasets and restart their epochs.
    pub fn apply_skip(&mut self, levels: SkipLevels) {
        info!(
            counter = levels.counter,
            davis = levels.davis,
            youtube = levels.youtube,
            "changing skip"
        );
        self.davis.dataset().change_skip(levels.davis);
        self.davis.restart();
        self.youtube.dataset().change_skip(levels.youtube);
        self.youtube.restart();
    }
}
