//! Core types, error definitions, and data structures for vos_dataset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One-hot class capacity: 10 object slots plus background.
pub const NUM_CLASSES: usize = 11;
/// Cap on distinct objects kept per sample.
pub const MAX_OBJECTS_PER_SAMPLE: usize = 5;
/// Largest raw annotation label scanned in the first frame.
pub const MAX_RAW_LABEL: u8 = 10;
/// Frames per training sample.
pub const TRIPLET_LEN: usize = 3;
/// Shorter side every frame is resized to before augmentation.
pub const REFERENCE_SHORT_SIDE: u32 = 480;
/// Square training resolution produced by augmentation.
pub const TRAIN_SIZE: u32 = 384;
/// Raw mask fill used when a frame has no annotation file.
pub const UNLABELED: u8 = 255;

pub type DatasetResult<T> = Result<T, VosDatasetError>;

pub type Triplet<T> = [T; TRIPLET_LEN];

#[derive(Debug, Error)]
pub enum VosDatasetError {
    #[error("dataset layout error at {path}: {msg}")]
    Layout { path: PathBuf, msg: String },
    #[error("video {video} has {frames} frames, at least {TRIPLET_LEN} required")]
    InsufficientFrames { video: String, frames: usize },
    #[error("corrupt sample file {path}: {msg}")]
    CorruptSample { path: PathBuf, msg: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("video index {index} out of range ({len} videos)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Other(String),
}

impl VosDatasetError {
    pub(crate) fn layout(path: &Path, msg: impl Into<String>) -> Self {
        VosDatasetError::Layout {
            path: path.to_path_buf(),
            msg: msg.into(),
        }
    }

    pub(crate) fn corrupt(path: &Path, msg: impl ToString) -> Self {
        VosDatasetError::CorruptSample {
            path: path.to_path_buf(),
            msg: msg.to_string(),
        }
    }

    /// Errors limited to a single video; the caller may continue with another index.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VosDatasetError::InsufficientFrames { .. } | VosDatasetError::CorruptSample { .. }
        )
    }
}

/// Ordered frame files of one video. Index `i` of both lists refers to the same timestamp;
/// `mask_files[i]` is `None` when frame `i` has no annotation with a matching stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub name: String,
    pub image_files: Vec<PathBuf>,
    pub mask_files: Vec<Option<PathBuf>>,
}

impl VideoRecord {
    pub fn frame_count(&self) -> usize {
        self.image_files.len()
    }

    pub fn image_for(&self, frame: usize) -> Option<&Path> {
        self.image_files.get(frame).map(PathBuf::as_path)
    }

    /// Annotation file of `frame`, if one exists.
    pub fn mask_for(&self, frame: usize) -> Option<&Path> {
        self.mask_files.get(frame).and_then(|m| m.as_deref())
    }

    pub fn annotated_frames(&self) -> usize {
        self.mask_files.iter().flatten().count()
    }
}

/// Strictly increasing frame indices drawn for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTriplet(pub [usize; TRIPLET_LEN]);

impl FrameTriplet {
    pub fn indices(&self) -> [usize; TRIPLET_LEN] {
        self.0
    }
}

/// Per-pixel compact object ids, 0 = background, values always `< NUM_CLASSES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DenseMask {
    pub fn background(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> DatasetResult<Self> {
        if data.len() != width as usize * height as usize {
            return Err(VosDatasetError::Other(format!(
                "dense mask buffer has {} values, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        if let Some(v) = data.iter().find(|v| **v as usize >= NUM_CLASSES) {
            return Err(VosDatasetError::Other(format!(
                "dense mask value {v} outside [0, {})",
                NUM_CLASSES
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn is_background(&self) -> bool {
        self.data.iter().all(|v| *v == 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub name: String,
    pub num_frames: usize,
    pub frame_indices: [usize; TRIPLET_LEN],
}

#[derive(Debug, Clone)]
pub struct TrainingSample {
    /// Frames in (C=3, T, H, W) layout, normalized to [0, 1].
    pub frames: Vec<f32>,
    pub masks: crate::onehot::OneHotTriplet,
    /// Objects present in the first frame, clamped to at least 1.
    pub num_objects: usize,
    pub info: SampleInfo,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSummary {
    pub name: String,
    pub frames: usize,
    pub masks: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub root: PathBuf,
    pub videos: Vec<VideoSummary>,
    pub total_frames: usize,
    pub annotated_frames: usize,
    /// Videos too short to yield a triplet.
    pub short_videos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationThresholds {
    pub max_short_videos: Option<usize>,
    pub max_short_ratio: Option<f32>,
    pub max_unannotated_ratio: Option<f32>,
}

impl ValidationThresholds {
    pub fn from_env() -> Self {
        fn parse_usize(key: &str) -> Option<usize> {
            std::env::var(key).ok()?.parse().ok()
        }
        fn parse_ratio(key: &str) -> Option<f32> {
            std::env::var(key).ok()?.parse().ok()
        }
        ValidationThresholds {
            max_short_videos: parse_usize("VOS_DATASET_MAX_SHORT"),
            max_short_ratio: parse_ratio("VOS_DATASET_MAX_SHORT_RATIO"),
            max_unannotated_ratio: parse_ratio("VOS_DATASET_MAX_UNANNOTATED_RATIO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub summary: CatalogSummary,
}
