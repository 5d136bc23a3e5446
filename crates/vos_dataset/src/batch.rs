//! Burn tensor batches and an epoch-restarting sample loader.

use crate::dataset::VosTrainDataset;
use crate::types::{
    DatasetResult, SampleInfo, TrainingSample, VosDatasetError, NUM_CLASSES, TRIPLET_LEN,
};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

pub struct SampleBatch<B: Backend> {
    /// [batch, 3, T, H, W] in [0, 1].
    pub frames: Tensor<B, 5>,
    /// One-hot masks, [batch, K, T, H, W].
    pub masks: Tensor<B, 5>,
    pub num_objects: Tensor<B, 1, Int>,
    pub object_counts: Vec<usize>,
    pub info: Vec<SampleInfo>,
}

impl<B: Backend> SampleBatch<B> {
    pub fn from_samples(samples: &[TrainingSample], device: &B::Device) -> DatasetResult<Self> {
        let Some(first) = samples.first() else {
            return Err(VosDatasetError::Other("cannot collate empty batch".into()));
        };
        let (width, height) = (first.width, first.height);
        if let Some(s) = samples
            .iter()
            .find(|s| s.width != width || s.height != height)
        {
            return Err(VosDatasetError::Other(format!(
                "batch contains varying sample sizes: {} is {}x{}, expected {}x{}",
                s.info.name, s.width, s.height, width, height
            )));
        }

        let batch = samples.len();
        let (h, w) = (height as usize, width as usize);
        let mut frames_buf = Vec::with_capacity(batch * 3 * TRIPLET_LEN * h * w);
        let mut masks_buf = Vec::with_capacity(batch * NUM_CLASSES * TRIPLET_LEN * h * w);
        let mut counts = Vec::with_capacity(batch);
        for sample in samples {
            frames_buf.extend_from_slice(&sample.frames);
            masks_buf.extend(sample.masks.as_raw().iter().map(|v| *v as f32));
            counts.push(sample.num_objects);
        }

        let frames = Tensor::<B, 5>::from_data(
            TensorData::new(frames_buf, [batch, 3, TRIPLET_LEN, h, w]),
            device,
        );
        let masks = Tensor::<B, 5>::from_data(
            TensorData::new(masks_buf, [batch, NUM_CLASSES, TRIPLET_LEN, h, w]),
            device,
        );
        let num_objects = Tensor::<B, 1, Int>::from_data(
            TensorData::new(counts.iter().map(|c| *c as i64).collect::<Vec<_>>(), [batch]),
            device,
        );
        Ok(Self {
            frames,
            masks,
            num_objects,
            object_counts: counts,
            info: samples.iter().map(|s| s.info.clone()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Largest object count in the batch.
    pub fn max_objects(&self) -> usize {
        self.object_counts.iter().copied().max().unwrap_or(1)
    }

    /// Frame `t` as [batch, 3, H, W].
    pub fn frame(&self, t: usize) -> Tensor<B, 4> {
        time_slice(&self.frames, t)
    }

    /// One-hot mask of frame `t` as [batch, K, H, W].
    pub fn mask(&self, t: usize) -> Tensor<B, 4> {
        time_slice(&self.masks, t)
    }

    /// Mask state before propagation: frame 0 carries its ground truth, later frames are zero.
    pub fn initial_mask_state(&self) -> Tensor<B, 5> {
        let [b, k, _, h, w] = self.masks.dims();
        let first = self.masks.clone().slice([0..b, 0..k, 0..1, 0..h, 0..w]);
        Tensor::zeros_like(&self.masks).slice_assign([0..b, 0..k, 0..1, 0..h, 0..w], first)
    }

    /// Class index per pixel of frame `t`, [batch, H, W].
    pub fn target_labels(&self, t: usize) -> Tensor<B, 3, Int> {
        self.mask(t).argmax(1).squeeze::<3>(1)
    }
}

fn time_slice<B: Backend>(tensor: &Tensor<B, 5>, t: usize) -> Tensor<B, 4> {
    let [b, c, _, h, w] = tensor.dims();
    tensor
        .clone()
        .slice([0..b, 0..c, t..t + 1, 0..h, 0..w])
        .squeeze::<4>(2)
}

/// Draws samples in shuffled epochs, restarting transparently when an epoch runs out.
pub struct SampleLoader {
    dataset: Arc<VosTrainDataset>,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
    rng: StdRng,
    permissive_errors: bool,
    log_every_samples: Option<usize>,
    processed_samples: usize,
    processed_batches: usize,
    skipped_errors: usize,
    started: Instant,
    last_log: Instant,
    last_logged_samples: usize,
    total_load_time: Duration,
}

impl SampleLoader {
    pub fn new(dataset: Arc<VosTrainDataset>, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);
        let log_every_samples = match std::env::var("VOS_DATASET_LOG_EVERY") {
            Ok(val) => {
                if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                    None
                } else {
                    val.parse::<usize>().ok().filter(|v| *v > 0)
                }
            }
            Err(_) => Some(DEFAULT_LOG_EVERY_SAMPLES),
        };
        let permissive_errors = std::env::var("VOS_DATASET_PERMISSIVE")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .map(|v| v == "0" || v == "false" || v == "off")
            .map(|strict| !strict)
            .unwrap_or(true);
        let now = Instant::now();
        Self {
            dataset,
            order,
            cursor: 0,
            epoch: 0,
            rng,
            permissive_errors,
            log_every_samples,
            processed_samples: 0,
            processed_batches: 0,
            skipped_errors: 0,
            started: now,
            last_log: now,
            last_logged_samples: 0,
            total_load_time: Duration::ZERO,
        }
    }

    /// Fail on the first sample error instead of logging and skipping it.
    pub fn strict(mut self) -> Self {
        self.permissive_errors = false;
        self
    }

    pub fn dataset(&self) -> &Arc<VosTrainDataset> {
        &self.dataset
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Start a fresh shuffled epoch.
    pub fn restart(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.epoch += 1;
        info!(
            dataset = %self.dataset.name(),
            epoch = self.epoch,
            skip = self.dataset.skip(),
            "restarted sample loader"
        );
    }

    fn next_index(&mut self) -> usize {
        if self.cursor >= self.order.len() {
            self.restart();
        }
        let idx = self.order[self.cursor];
        self.cursor += 1;
        idx
    }

    pub fn next_samples(&mut self, batch_size: usize) -> DatasetResult<Vec<TrainingSample>> {
        if self.dataset.is_empty() {
            return Err(VosDatasetError::Other(format!(
                "dataset {} has no videos",
                self.dataset.name()
            )));
        }
        let batch_size = batch_size.max(1);
        let max_attempts = batch_size * 8;
        let mut attempts = 0;
        let mut samples = Vec::with_capacity(batch_size);
        while samples.len() < batch_size {
            if attempts >= max_attempts {
                return Err(VosDatasetError::Other(format!(
                    "gave up after {attempts} failed samples from {}",
                    self.dataset.name()
                )));
            }
            let need = batch_size - samples.len();
            let jobs: Vec<(usize, u64)> = (0..need)
                .map(|_| (self.next_index(), self.rng.next_u64()))
                .collect();
            attempts += need;

            let t_load = Instant::now();
            let dataset = Arc::clone(&self.dataset);
            let loaded: Vec<_> = jobs
                .par_iter()
                .map(|(idx, seed)| {
                    let mut rng = StdRng::seed_from_u64(*seed);
                    dataset.get_or_skip(*idx, &mut rng)
                })
                .collect();
            self.total_load_time += t_load.elapsed();

            for ((idx, _), res) in jobs.iter().zip(loaded) {
                match res {
                    Ok(sample) => samples.push(sample),
                    Err(e) if self.permissive_errors => {
                        warn!(dataset = %self.dataset.name(), index = idx, error = %e, "skipping sample");
                        self.skipped_errors += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        self.processed_samples += samples.len();
        self.processed_batches += 1;
        self.maybe_log_progress();
        Ok(samples)
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<SampleBatch<B>> {
        let samples = self.next_samples(batch_size)?;
        SampleBatch::from_samples(&samples, device)
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let processed_since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        let should_log =
            processed_since >= threshold || self.last_log.elapsed() >= Duration::from_secs(30);
        if !should_log {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        let avg_load_ms =
            (self.total_load_time.as_secs_f64() * 1000.0) / self.processed_batches.max(1) as f64;
        info!(
            dataset = %self.dataset.name(),
            epoch = self.epoch,
            batches = self.processed_batches,
            samples = self.processed_samples,
            skipped_errors = self.skipped_errors,
            rate = self.processed_samples as f32 / secs,
            avg_load_ms,
            "[dataset] progress"
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }
}
