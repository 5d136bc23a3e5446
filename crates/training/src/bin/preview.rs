use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use training::preview::render_preview;
use training::util::{init_tracing, DAVIS_RESOLUTION, DAVIS_TRAIN_SET};
use vos_dataset::{CatalogLayout, DatasetConfig, VosTrainDataset};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LayoutKind {
    Youtube,
    Davis,
}

#[derive(Parser, Debug)]
#[command(name = "preview", about = "Write frame/mask overlays for sampled training triplets")]
struct Args {
    /// Dataset root (for YouTube-VOS, the train/ directory).
    #[arg(long)]
    root: PathBuf,
    #[arg(long, value_enum, default_value_t = LayoutKind::Youtube)]
    layout: LayoutKind,
    /// Output directory for PNGs.
    #[arg(long, default_value = "preview")]
    out: PathBuf,
    /// Number of samples to render.
    #[arg(long, default_value_t = 8)]
    count: usize,
    /// Skip budget for the temporal sampler.
    #[arg(long, default_value_t = 0)]
    skip: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Mask overlay opacity.
    #[arg(long, default_value_t = 0.5)]
    alpha: f32,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let layout = match args.layout {
        LayoutKind::Youtube => CatalogLayout::youtube_vos(),
        LayoutKind::Davis => CatalogLayout::davis(DAVIS_RESOLUTION, DAVIS_TRAIN_SET),
    };
    let cfg = DatasetConfig {
        layout,
        skip: args.skip,
        seed: Some(args.seed),
        ..Default::default()
    };
    let dataset = VosTrainDataset::open("preview", &args.root, cfg)?;
    if dataset.is_empty() {
        anyhow::bail!("no videos under {}", args.root.display());
    }
    fs::create_dir_all(&args.out)?;

    for i in 0..args.count {
        let index = i % dataset.len();
        let sample = dataset.get(index)?;
        let [n1, n2, n3] = sample.info.frame_indices;
        let path = args
            .out
            .join(format!("{:03}_{}_{n1}_{n2}_{n3}.png", i, sample.info.name));
        render_preview(&sample, args.alpha).save(&path)?;
        info!(
            path = %path.display(),
            objects = sample.num_objects,
            "wrote preview"
        );
    }
    Ok(())
}
