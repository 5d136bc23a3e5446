use crate::baseline::{baseline_segmenter, PropagationNetConfig};
use crate::config::{BackendKind, TrainArgs, TrainConfig};
use crate::eval::TripletIouEvaluator;
use crate::mixer::DatasetMixer;
use crate::trainer::{SegmentationModel, Trainer, TrainerSettings, TrainSummary};
use crate::TrainBackend;
use burn::backend::Autodiff;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vos_dataset::{
    CatalogLayout, DatasetConfig, SampleLoader, TransformPipeline, VosTrainDataset, TRAIN_SIZE,
};

pub const DAVIS_RESOLUTION: &str = "480p";
pub const DAVIS_TRAIN_SET: &str = "ImageSets/2017/train.txt";
pub const DAVIS_VAL_SET: &str = "ImageSets/2017/val.txt";
/// Triplets scored per evaluation round.
pub const EVAL_BATCHES: usize = 30;

/// Install a `RUST_LOG`-driven subscriber, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed by a test harness.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

fn open_dataset(
    name: &str,
    root: &Path,
    layout: CatalogLayout,
    seed: Option<u64>,
    transform: Option<TransformPipeline>,
) -> anyhow::Result<Arc<VosTrainDataset>> {
    let cfg = DatasetConfig {
        layout,
        seed,
        transform,
        ..Default::default()
    };
    let dataset = VosTrainDataset::open(name, root, cfg)
        .map_err(|e| anyhow::anyhow!("failed to open {name} dataset at {}: {e}", root.display()))?;
    if dataset.is_empty() {
        anyhow::bail!("{name} dataset at {} contains no videos", root.display());
    }
    Ok(Arc::new(dataset))
}

/// DAVIS and YouTube-VOS training loaders behind one mixer.
pub fn build_mixer(cfg: &TrainConfig) -> anyhow::Result<DatasetMixer> {
    let seed_for = |offset: u64| cfg.seed.map(|s| s.wrapping_add(offset));
    let davis = open_dataset(
        "davis",
        &cfg.davis_root,
        CatalogLayout::davis(DAVIS_RESOLUTION, DAVIS_TRAIN_SET),
        seed_for(1),
        None,
    )?;
    let youtube = open_dataset(
        "youtube",
        &cfg.youtube_train_root(),
        CatalogLayout::youtube_vos(),
        seed_for(2),
        None,
    )?;
    Ok(DatasetMixer::new(
        SampleLoader::new(davis, seed_for(3)),
        SampleLoader::new(youtube, seed_for(4)),
        cfg.sample_rate,
        seed_for(5),
    ))
}

/// Center-cropped DAVIS validation loader.
pub fn build_eval_loader(cfg: &TrainConfig) -> anyhow::Result<SampleLoader> {
    let val = open_dataset(
        "davis-val",
        &cfg.davis_root,
        CatalogLayout::davis(DAVIS_RESOLUTION, DAVIS_VAL_SET),
        Some(cfg.seed.unwrap_or(0)),
        Some(TransformPipeline::center_crop((TRAIN_SIZE, TRAIN_SIZE))),
    )?;
    Ok(SampleLoader::new(val, Some(cfg.seed.unwrap_or(0))))
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainSummary> {
    validate_backend_choice(args.backend)?;
    let cfg = TrainConfig::resolve(&args)?;
    info!(?cfg, "resolved training config");

    let mixer = build_mixer(&cfg)?;
    let eval_loader = build_eval_loader(&cfg)?;

    type AdBackend = Autodiff<TrainBackend>;
    let device = <AdBackend as burn::tensor::backend::Backend>::Device::default();
    let mut model = baseline_segmenter::<AdBackend>(&PropagationNetConfig::default(), &device);
    if let Some(path) = &cfg.resume {
        model.load_checkpoint(path)?;
    }
    let evaluator = TripletIouEvaluator::<AdBackend>::new(eval_loader, EVAL_BATCHES, device.clone());

    let mut trainer = Trainer::<AdBackend, _, _>::new(
        TrainerSettings::from_config(&cfg),
        mixer,
        model,
        evaluator,
        device,
    );
    trainer.run()
}
