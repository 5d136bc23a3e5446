use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use training::util::{init_tracing, DAVIS_RESOLUTION, DAVIS_TRAIN_SET};
use vos_dataset::{summarize_root_with_thresholds, CatalogLayout, ValidationOutcome, ValidationThresholds};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LayoutKind {
    Youtube,
    Davis,
}

#[derive(Parser, Debug)]
#[command(
    name = "catalog_report",
    about = "Summarize a DAVIS / YouTube-VOS tree and check it against thresholds"
)]
struct Args {
    /// Dataset root (for YouTube-VOS, the train/ directory).
    #[arg(long)]
    root: PathBuf,
    #[arg(long, value_enum, default_value_t = LayoutKind::Youtube)]
    layout: LayoutKind,
    /// DAVIS resolution subdirectory.
    #[arg(long, default_value = DAVIS_RESOLUTION)]
    resolution: String,
    /// DAVIS image-set file relative to the root.
    #[arg(long, default_value = DAVIS_TRAIN_SET)]
    image_set: PathBuf,
    /// Fail when more videos than this are shorter than a triplet (overrides VOS_DATASET_MAX_SHORT).
    #[arg(long)]
    max_short: Option<usize>,
    /// Fail when the unannotated-frame ratio exceeds this (overrides VOS_DATASET_MAX_UNANNOTATED_RATIO).
    #[arg(long)]
    max_unannotated_ratio: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let layout = match args.layout {
        LayoutKind::Youtube => CatalogLayout::youtube_vos(),
        LayoutKind::Davis => CatalogLayout::davis(&args.resolution, args.image_set.clone()),
    };
    let mut thresholds = ValidationThresholds::from_env();
    if args.max_short.is_some() {
        thresholds.max_short_videos = args.max_short;
    }
    if args.max_unannotated_ratio.is_some() {
        thresholds.max_unannotated_ratio = args.max_unannotated_ratio;
    }

    let report = summarize_root_with_thresholds(&args.root, &layout, &thresholds)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.outcome == ValidationOutcome::Fail {
        anyhow::bail!("catalog at {} failed validation", args.root.display());
    }
    Ok(())
}
