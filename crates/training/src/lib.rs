#![recursion_limit = "256"]

pub mod baseline;
pub mod config;
pub mod eval;
pub mod mixer;
pub mod preview;
pub mod schedule;
pub mod trainer;
pub mod util;

pub use baseline::{baseline_segmenter, BaselineSegmenter, PropagationNet, PropagationNetConfig};
pub use config::{Backbone, BackendKind, TrainArgs, TrainConfig};
pub use eval::{mean_object_iou, TripletIouEvaluator};
pub use mixer::{DatasetMixer, DrawCounts, Source};
pub use schedule::{PolyLr, SkipCurriculum, SkipLevels};
pub use trainer::{Evaluator, SegmentationModel, TrainSummary, Trainer, TrainerSettings};
pub use util::{init_tracing, run_train};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
