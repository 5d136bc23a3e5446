//! Iteration loop: schedules, dataset mixing, gradient accumulation, checkpoints.

use crate::config::TrainConfig;
use crate::mixer::{DatasetMixer, DrawCounts};
use crate::schedule::{PolyLr, SkipCurriculum};
use burn::tensor::backend::Backend;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use vos_dataset::SampleBatch;

/// Network plus optimizer state, driven one triplet batch at a time.
pub trait SegmentationModel<B: Backend> {
    /// Forward the triplet, backpropagate, and keep the gradients. Returns the loss.
    fn accumulate(&mut self, batch: &SampleBatch<B>) -> anyhow::Result<f32>;

    /// Optimizer step with the accumulated gradients, then clear them.
    fn apply_update(&mut self, lr: f64) -> anyhow::Result<()>;

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()>;

    fn load_checkpoint(&mut self, path: &Path) -> anyhow::Result<()>;

    fn set_train_mode(&mut self, train: bool);
}

/// Scores a model on held-out data; higher is better.
pub trait Evaluator<M> {
    fn evaluate(&mut self, model: &mut M) -> anyhow::Result<f64>;
}

/// Iteration-level settings pulled from `TrainConfig`.
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub total_iters: usize,
    pub accumulation_steps: usize,
    pub log_iters: usize,
    pub test_iters: usize,
    pub save_after_iter: usize,
    pub batch_size: usize,
    pub lr: PolyLr,
    pub max_skip: usize,
    pub change_skip_step: usize,
    pub save_dir: PathBuf,
    pub checkpoint_prefix: String,
}

impl TrainerSettings {
    pub fn from_config(cfg: &TrainConfig) -> Self {
        Self {
            total_iters: cfg.total_iters,
            accumulation_steps: cfg.accumulation_steps.max(1),
            log_iters: cfg.log_iters.max(1),
            test_iters: cfg.test_iters.max(1),
            save_after_iter: cfg.save_after_iter,
            batch_size: cfg.batch_size.max(1),
            lr: PolyLr {
                base: cfg.base_lr,
                power: cfg.lr_power,
                total_iters: cfg.total_iters,
                update_every: cfg.lr_update_every,
            },
            max_skip: cfg.max_skip,
            change_skip_step: cfg.change_skip_step,
            save_dir: cfg.save_dir.clone(),
            checkpoint_prefix: format!("davis_youtube_{}", cfg.backbone),
        }
    }

    pub fn checkpoint_path(&self, iter: usize) -> PathBuf {
        self.save_dir
            .join(format!("{}_{}.pth", self.checkpoint_prefix, iter))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub iterations: usize,
    pub optimizer_steps: usize,
    pub final_lr: f64,
    pub final_skip: usize,
    pub draws: DrawCounts,
    /// (iteration, score) per evaluation round.
    pub evaluations: Vec<(usize, f64)>,
    pub best_score: Option<f64>,
    pub checkpoints: Vec<PathBuf>,
    /// Mean loss per completed log window.
    pub logged_losses: Vec<f32>,
}

pub struct Trainer<B: Backend, M, E> {
    settings: TrainerSettings,
    mixer: DatasetMixer,
    model: M,
    evaluator: E,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B, M, E> Trainer<B, M, E>
where
    B: Backend,
    M: SegmentationModel<B>,
    E: Evaluator<M>,
{
    pub fn new(
        settings: TrainerSettings,
        mixer: DatasetMixer,
        model: M,
        evaluator: E,
        device: B::Device,
    ) -> Self {
        Self {
            settings,
            mixer,
            model,
            evaluator,
            device,
            _backend: PhantomData,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_parts(self) -> (M, E, DatasetMixer) {
        (self.model, self.evaluator, self.mixer)
    }

    pub fn run(&mut self) -> anyhow::Result<TrainSummary> {
        let s = self.settings.clone();
        let mut curriculum = SkipCurriculum::new(s.max_skip, s.change_skip_step);
        let mut lr = s.lr.base;
        let mut loss_window = 0.0f32;
        let mut summary = TrainSummary::default();
        let started = Instant::now();

        info!(
            total_iters = s.total_iters,
            accumulation_steps = s.accumulation_steps,
            batch_size = s.batch_size,
            sample_rate = self.mixer.sample_rate(),
            "starting training"
        );
        self.model.set_train_mode(true);

        for iter in 0..s.total_iters {
            if let Some(next_lr) = s.lr.update(iter) {
                lr = next_lr;
            }
            if let Some(levels) = curriculum.step(iter) {
                self.mixer.apply_skip(levels);
            }

            let (_, batch) = self.mixer.next_batch::<B>(s.batch_size, &self.device)?;
            let loss = self.model.accumulate(&batch)?;
            loss_window += loss;

            if (iter + 1) % s.accumulation_steps == 0 {
                self.model.apply_update(lr)?;
                summary.optimizer_steps += 1;
            }

            if (iter + 1) % s.log_iters == 0 {
                let mean = loss_window / s.log_iters as f32;
                info!(
                    iteration = iter,
                    loss = mean,
                    remaining = s.total_iters - iter,
                    lr,
                    skip = curriculum.counter(),
                    elapsed_s = started.elapsed().as_secs_f32(),
                    "[train] progress"
                );
                summary.logged_losses.push(mean);
                loss_window = 0.0;
            }

            if (iter + 1) % s.test_iters == 0 && iter + 1 >= s.save_after_iter {
                let path = self.checkpoint(iter)?;
                summary.checkpoints.push(path);

                self.model.set_train_mode(false);
                let score = self.evaluator.evaluate(&mut self.model)?;
                self.model.set_train_mode(true);

                let best = summary.best_score.map_or(score, |b| b.max(score));
                summary.best_score = Some(best);
                summary.evaluations.push((iter, score));
                info!(iteration = iter, score, best, "[eval] finished");
            }
            summary.iterations = iter + 1;
        }

        summary.final_lr = lr;
        summary.final_skip = curriculum.counter();
        summary.draws = self.mixer.counts();
        info!(
            iterations = summary.iterations,
            optimizer_steps = summary.optimizer_steps,
            davis_draws = summary.draws.davis,
            youtube_draws = summary.draws.youtube,
            best_score = ?summary.best_score,
            "training finished"
        );
        Ok(summary)
    }

    fn checkpoint(&mut self, iter: usize) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.settings.save_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to create save dir {}: {e}",
                self.settings.save_dir.display()
            )
        })?;
        let path = self.settings.checkpoint_path(iter);
        self.model.save_checkpoint(&path)?;
        info!(path = %path.display(), "saved checkpoint");
        Ok(path)
    }
}
