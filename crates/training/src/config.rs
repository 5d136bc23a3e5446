//! Command-line and TOML configuration for the training driver.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_DAVIS_ROOT: &str = "~/Downloads/DAVIS/";
pub const DEFAULT_YOUTUBE_ROOT: &str = "~/Downloads/YOUTUBEVOS/";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backbone {
    Resnet50,
    Resnet18,
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backbone::Resnet50 => write!(f, "resnet50"),
            Backbone::Resnet18 => write!(f, "resnet18"),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    NdArray,
    Wgpu,
}

/// Flags left unset fall back to `--config`, then to the built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "train", about = "Train a mask-propagation model on DAVIS + YouTube-VOS")]
pub struct TrainArgs {
    /// TOML file with defaults for any flag below.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// DAVIS-2017 root containing JPEGImages/, Annotations/ and ImageSets/.
    #[arg(long)]
    pub davis_root: Option<PathBuf>,
    /// YouTube-VOS root; training data is read from its train/ directory.
    #[arg(long)]
    pub youtube_root: Option<PathBuf>,
    /// Iterations per optimizer step.
    #[arg(long)]
    pub accumulation_steps: Option<usize>,
    #[arg(long)]
    pub max_skip: Option<usize>,
    /// Iterations between skip increments.
    #[arg(long)]
    pub change_skip_step: Option<usize>,
    #[arg(long)]
    pub total_iters: Option<usize>,
    /// Iterations between checkpoint + evaluation rounds.
    #[arg(long)]
    pub test_iters: Option<usize>,
    #[arg(long)]
    pub log_iters: Option<usize>,
    /// Checkpoint loaded before training.
    #[arg(long)]
    pub resume: Option<PathBuf>,
    #[arg(long)]
    pub save_dir: Option<PathBuf>,
    /// Probability of drawing a DAVIS sample each iteration.
    #[arg(long)]
    pub sample_rate: Option<f64>,
    #[arg(long, value_enum)]
    pub backbone: Option<Backbone>,
    #[arg(long)]
    pub base_lr: Option<f64>,
    #[arg(long)]
    pub lr_power: Option<f64>,
    #[arg(long)]
    pub lr_update_every: Option<usize>,
    /// No checkpoints or evaluation before this many iterations.
    #[arg(long)]
    pub save_after_iter: Option<usize>,
    /// Samples per iteration.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Seed for sampling and augmentation; falls back to VOS_SEED.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainConfigFile {
    davis_root: Option<String>,
    youtube_root: Option<String>,
    accumulation_steps: Option<usize>,
    max_skip: Option<usize>,
    change_skip_step: Option<usize>,
    total_iters: Option<usize>,
    test_iters: Option<usize>,
    log_iters: Option<usize>,
    resume: Option<String>,
    save_dir: Option<String>,
    sample_rate: Option<f64>,
    backbone: Option<Backbone>,
    base_lr: Option<f64>,
    lr_power: Option<f64>,
    lr_update_every: Option<usize>,
    save_after_iter: Option<usize>,
    batch_size: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub davis_root: PathBuf,
    pub youtube_root: PathBuf,
    pub accumulation_steps: usize,
    pub max_skip: usize,
    pub change_skip_step: usize,
    pub total_iters: usize,
    pub test_iters: usize,
    pub log_iters: usize,
    pub resume: Option<PathBuf>,
    pub save_dir: PathBuf,
    pub sample_rate: f64,
    pub backbone: Backbone,
    pub base_lr: f64,
    pub lr_power: f64,
    pub lr_update_every: usize,
    pub save_after_iter: usize,
    pub batch_size: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            davis_root: expand_path(DEFAULT_DAVIS_ROOT),
            youtube_root: expand_path(DEFAULT_YOUTUBE_ROOT),
            accumulation_steps: 4,
            max_skip: 25,
            change_skip_step: 3000,
            total_iters: 800_000,
            test_iters: 10_000,
            log_iters: 500,
            resume: None,
            save_dir: PathBuf::from("../weights"),
            sample_rate: 0.08,
            backbone: Backbone::Resnet50,
            base_lr: 1e-5,
            lr_power: 0.9,
            lr_update_every: 1000,
            save_after_iter: 600_000,
            batch_size: 1,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Merge command-line flags over the optional config file over defaults.
    pub fn resolve(args: &TrainArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => load_file(path)?,
            None => TrainConfigFile::default(),
        };
        let base = Self::default();
        let env_seed = std::env::var("VOS_SEED")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok());

        let cfg = Self {
            davis_root: args
                .davis_root
                .clone()
                .or_else(|| file.davis_root.as_deref().map(expand_path))
                .unwrap_or(base.davis_root),
            youtube_root: args
                .youtube_root
                .clone()
                .or_else(|| file.youtube_root.as_deref().map(expand_path))
                .unwrap_or(base.youtube_root),
            accumulation_steps: args
                .accumulation_steps
                .or(file.accumulation_steps)
                .unwrap_or(base.accumulation_steps),
            max_skip: args.max_skip.or(file.max_skip).unwrap_or(base.max_skip),
            change_skip_step: args
                .change_skip_step
                .or(file.change_skip_step)
                .unwrap_or(base.change_skip_step),
            total_iters: args
                .total_iters
                .or(file.total_iters)
                .unwrap_or(base.total_iters),
            test_iters: args
                .test_iters
                .or(file.test_iters)
                .unwrap_or(base.test_iters),
            log_iters: args.log_iters.or(file.log_iters).unwrap_or(base.log_iters),
            resume: args
                .resume
                .clone()
                .or_else(|| file.resume.as_deref().map(expand_path)),
            save_dir: args
                .save_dir
                .clone()
                .or_else(|| file.save_dir.as_deref().map(expand_path))
                .unwrap_or(base.save_dir),
            sample_rate: args
                .sample_rate
                .or(file.sample_rate)
                .unwrap_or(base.sample_rate),
            backbone: args.backbone.or(file.backbone).unwrap_or(base.backbone),
            base_lr: args.base_lr.or(file.base_lr).unwrap_or(base.base_lr),
            lr_power: args.lr_power.or(file.lr_power).unwrap_or(base.lr_power),
            lr_update_every: args
                .lr_update_every
                .or(file.lr_update_every)
                .unwrap_or(base.lr_update_every),
            save_after_iter: args
                .save_after_iter
                .or(file.save_after_iter)
                .unwrap_or(base.save_after_iter),
            batch_size: args
                .batch_size
                .or(file.batch_size)
                .unwrap_or(base.batch_size),
            seed: args.seed.or(file.seed).or(env_seed),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            anyhow::bail!("sample_rate must be within [0, 1], got {}", self.sample_rate);
        }
        for (name, value) in [
            ("accumulation_steps", self.accumulation_steps),
            ("change_skip_step", self.change_skip_step),
            ("total_iters", self.total_iters),
            ("test_iters", self.test_iters),
            ("log_iters", self.log_iters),
            ("lr_update_every", self.lr_update_every),
            ("batch_size", self.batch_size),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if self.base_lr <= 0.0 {
            anyhow::bail!("base_lr must be positive, got {}", self.base_lr);
        }
        Ok(())
    }

    /// YouTube-VOS training split.
    pub fn youtube_train_root(&self) -> PathBuf {
        self.youtube_root.join("train")
    }
}

fn load_file(path: &Path) -> anyhow::Result<TrainConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_path(raw: &str) -> PathBuf {
    if let Some(stripped) = raw.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{home}{stripped}"));
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_schedule() {
        let cfg = TrainConfig::resolve(&TrainArgs::default()).unwrap();
        assert_eq!(cfg.accumulation_steps, 4);
        assert_eq!(cfg.max_skip, 25);
        assert_eq!(cfg.change_skip_step, 3000);
        assert_eq!(cfg.total_iters, 800_000);
        assert_eq!(cfg.test_iters, 10_000);
        assert_eq!(cfg.log_iters, 500);
        assert_eq!(cfg.save_after_iter, 600_000);
        assert!((cfg.sample_rate - 0.08).abs() < f64::EPSILON);
        assert!(cfg.youtube_train_root().ends_with("YOUTUBEVOS/train"));
    }

    #[test]
    fn file_values_fill_unset_flags_only() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.toml");
        std::fs::write(
            &path,
            "max_skip = 10\nsample_rate = 0.5\nbackbone = \"resnet18\"\nsave_dir = \"/tmp/w\"\n",
        )
        .unwrap();
        let args = TrainArgs {
            config: Some(path),
            max_skip: Some(3),
            ..Default::default()
        };
        let cfg = TrainConfig::resolve(&args).unwrap();
        assert_eq!(cfg.max_skip, 3);
        assert!((cfg.sample_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.backbone, Backbone::Resnet18);
        assert_eq!(cfg.save_dir, PathBuf::from("/tmp/w"));
        assert_eq!(cfg.log_iters, 500);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "max_skp = 10\n").unwrap();
        let args = TrainArgs {
            config: Some(path),
            ..Default::default()
        };
        assert!(TrainConfig::resolve(&args).is_err());

        let args = TrainArgs {
            sample_rate: Some(1.5),
            ..Default::default()
        };
        assert!(TrainConfig::resolve(&args).is_err());
    }

    #[test]
    fn args_parse_from_command_line() {
        let args = TrainArgs::parse_from([
            "train",
            "--davis-root",
            "/data/davis",
            "--total-iters",
            "100",
            "--backbone",
            "resnet18",
        ]);
        let cfg = TrainConfig::resolve(&args).unwrap();
        assert_eq!(cfg.davis_root, PathBuf::from("/data/davis"));
        assert_eq!(cfg.total_iters, 100);
        assert_eq!(cfg.backbone, Backbone::Resnet18);
    }
}
