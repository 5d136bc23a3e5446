//! Training-sample construction for memory-augmented video object segmentation.
//!
//! This crate provides utilities for:
//! - Indexing DAVIS / YouTube-VOS style frame and annotation trees
//! - Temporally spaced frame-triplet selection with a mutable skip budget
//! - Joint augmentation of frames and masks
//! - Object relabeling with a per-sample cap and fixed-capacity one-hot encoding
//! - Burn-compatible batches and an epoch-restarting loader

pub mod aug;
pub mod catalog;
pub mod dataset;
pub mod loader;
pub mod onehot;
pub mod relabel;
pub mod sampler;
pub mod types;
pub mod validation;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use aug::{AugmentParams, CropMode, JointAugment, TransformPipeline, TransformPipelineBuilder};
pub use catalog::{CatalogLayout, VideoCatalog};
pub use dataset::{DatasetConfig, VosTrainDataset};
pub use onehot::{decode, encode, encode_batch, OneHotMask, OneHotTriplet};
pub use relabel::{MaskRelabeler, ObjectIdentityMap, RelabelState};
pub use sampler::TemporalSampler;
pub use types::*;
pub use validation::{summarize_catalog, summarize_root_with_thresholds, validate_summary};

#[cfg(feature = "burn-runtime")]
pub use batch::{SampleBatch, SampleLoader};
