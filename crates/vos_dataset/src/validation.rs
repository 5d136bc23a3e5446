//! Catalog quality checks.

use crate::catalog::{CatalogLayout, VideoCatalog};
use crate::types::{
    CatalogSummary, DatasetResult, ValidationOutcome, ValidationReport, ValidationThresholds,
    VideoSummary, TRIPLET_LEN,
};
use std::path::Path;

pub fn summarize_catalog(catalog: &VideoCatalog) -> CatalogSummary {
    let mut summary = CatalogSummary {
        root: catalog.root().to_path_buf(),
        ..Default::default()
    };
    for video in catalog.videos() {
        let frames = video.frame_count();
        let masks = video.annotated_frames();
        summary.total_frames += frames;
        summary.annotated_frames += masks;
        if frames < TRIPLET_LEN {
            summary.short_videos.push(video.name.clone());
        }
        summary.videos.push(VideoSummary {
            name: video.name.clone(),
            frames,
            masks,
        });
    }
    summary
}

fn apply_thresholds(
    label: &str,
    count: usize,
    ratio: f32,
    max_count: Option<usize>,
    max_ratio: Option<f32>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if let Some(max) = max_count {
        if count > max {
            *outcome = ValidationOutcome::Fail;
            reasons.push(format!("{label}: {count} exceeds max {max}"));
        }
    }
    if let Some(max_r) = max_ratio {
        if ratio > max_r {
            *outcome = ValidationOutcome::Fail;
            reasons.push(format!("{label}: ratio {ratio:.3} exceeds max {max_r:.3}"));
        }
    }
    if count > 0 {
        if *outcome == ValidationOutcome::Pass {
            *outcome = ValidationOutcome::Warn;
        }
        reasons.push(format!("{label}: {count} observed"));
    }
}

pub fn validate_summary(
    summary: CatalogSummary,
    thresholds: &ValidationThresholds,
) -> ValidationReport {
    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();

    let short = summary.short_videos.len();
    apply_thresholds(
        "videos shorter than a triplet",
        short,
        short as f32 / summary.videos.len().max(1) as f32,
        thresholds.max_short_videos,
        thresholds.max_short_ratio,
        &mut outcome,
        &mut reasons,
    );
    let unannotated = summary.total_frames - summary.annotated_frames;
    apply_thresholds(
        "unannotated frames",
        unannotated,
        unannotated as f32 / summary.total_frames.max(1) as f32,
        None,
        thresholds.max_unannotated_ratio,
        &mut outcome,
        &mut reasons,
    );

    ValidationReport {
        outcome,
        reasons,
        summary,
    }
}

pub fn summarize_root_with_thresholds(
    root: &Path,
    layout: &CatalogLayout,
    thresholds: &ValidationThresholds,
) -> DatasetResult<ValidationReport> {
    let catalog = VideoCatalog::index(root, layout)?;
    Ok(validate_summary(summarize_catalog(&catalog), thresholds))
}
