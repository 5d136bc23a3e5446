//! Indexed triplet dataset assembling training samples from a video catalog.

use crate::aug::{JointAugment, TransformPipeline};
use crate::catalog::{CatalogLayout, VideoCatalog};
use crate::loader;
use crate::onehot;
use crate::relabel::MaskRelabeler;
use crate::sampler::TemporalSampler;
use crate::types::{
    DatasetResult, FrameTriplet, SampleInfo, TrainingSample, Triplet, VideoRecord,
    VosDatasetError, MAX_OBJECTS_PER_SAMPLE, REFERENCE_SHORT_SIDE, TRIPLET_LEN,
};
use image::{GrayImage, RgbImage};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub layout: CatalogLayout,
    /// Initial skip budget; change later with `VosTrainDataset::change_skip`.
    pub skip: usize,
    /// Seed for `VosTrainDataset::get`; `None` draws from the thread RNG.
    pub seed: Option<u64>,
    pub max_objects: usize,
    pub reference_short_side: u32,
    /// Augmentation override; defaults to `TransformPipeline::default()`.
    pub transform: Option<TransformPipeline>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            layout: CatalogLayout::youtube_vos(),
            skip: 0,
            seed: None,
            max_objects: MAX_OBJECTS_PER_SAMPLE,
            reference_short_side: REFERENCE_SHORT_SIDE,
            transform: None,
        }
    }
}

pub struct VosTrainDataset {
    name: String,
    catalog: VideoCatalog,
    skip: AtomicUsize,
    seed: Option<u64>,
    draws: AtomicU64,
    relabeler: MaskRelabeler,
    reference_short_side: u32,
    augment: Arc<dyn JointAugment>,
}

impl std::fmt::Debug for VosTrainDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VosTrainDataset")
            .field("name", &self.name)
            .field("videos", &self.catalog.len())
            .field("skip", &self.skip())
            .field("seed", &self.seed)
            .field("augment", &self.augment.describe())
            .finish()
    }
}

impl VosTrainDataset {
    pub fn open(name: &str, root: &Path, cfg: DatasetConfig) -> DatasetResult<Self> {
        let catalog = VideoCatalog::index(root, &cfg.layout)?;
        let dataset = Self::from_catalog(name, catalog, cfg);
        info!(
            dataset = %dataset.name,
            root = %root.display(),
            videos = dataset.len(),
            frames = dataset.catalog.total_frames(),
            augment = %dataset.augment.describe(),
            "opened training dataset"
        );
        Ok(dataset)
    }

    pub fn from_catalog(name: &str, catalog: VideoCatalog, cfg: DatasetConfig) -> Self {
        let augment: Arc<dyn JointAugment> = Arc::new(cfg.transform.unwrap_or_default());
        Self {
            name: name.to_string(),
            catalog,
            skip: AtomicUsize::new(cfg.skip),
            seed: cfg.seed,
            draws: AtomicU64::new(0),
            relabeler: MaskRelabeler::new(cfg.max_objects),
            reference_short_side: cfg.reference_short_side,
            augment,
        }
    }

    /// Replace the augmentation stage.
    pub fn with_augment(mut self, augment: Arc<dyn JointAugment>) -> Self {
        self.augment = augment;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &VideoCatalog {
        &self.catalog
    }

    /// Number of videos.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn skip(&self) -> usize {
        self.skip.load(Ordering::Relaxed)
    }

    /// Set the skip budget for all subsequent draws.
    pub fn change_skip(&self, skip: usize) {
        let previous = self.skip.swap(skip, Ordering::Relaxed);
        if previous != skip {
            debug!(dataset = %self.name, previous, skip, "skip budget changed");
        }
    }

    /// Build the sample for video `index` using the configured seed.
    pub fn get(&self, index: usize) -> DatasetResult<TrainingSample> {
        match self.seed {
            Some(seed) => {
                let draw = self.draws.fetch_add(1, Ordering::Relaxed);
                let mut rng = StdRng::seed_from_u64(mix_seed(seed, index as u64, draw));
                self.get_with_rng(index, &mut rng)
            }
            None => {
                let mut rng = rand::rng();
                self.get_with_rng(index, &mut rng)
            }
        }
    }

    pub fn get_with_rng(&self, index: usize, rng: &mut dyn RngCore) -> DatasetResult<TrainingSample> {
        let video = self
            .catalog
            .get(index)
            .ok_or(VosDatasetError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;
        let sampler = TemporalSampler::new(self.skip());
        let triplet = sampler.draw(video, rng)?;

        let (frames, raw_masks) = self.load_triplet(video, &triplet)?;
        let (frames, raw_masks) = self.augment.apply(frames, raw_masks, rng)?;
        let (dense, state) = self.relabeler.process_triplet(&raw_masks, rng);
        let masks = onehot::encode_batch(&dense)?;

        let (width, height) = frames[0].dimensions();
        debug!(
            dataset = %self.name,
            video = %video.name,
            frames = ?triplet.indices(),
            objects = state.object_count,
            "built sample"
        );
        Ok(TrainingSample {
            frames: frames_to_cthw(&frames),
            masks,
            num_objects: state.object_count.max(1),
            info: SampleInfo {
                name: video.name.clone(),
                num_frames: video.frame_count(),
                frame_indices: triplet.indices(),
            },
            width,
            height,
        })
    }

    /// Like `get_with_rng`, but moves on to the next video when one is too short or corrupt.
    pub fn get_or_skip(&self, index: usize, rng: &mut dyn RngCore) -> DatasetResult<TrainingSample> {
        let len = self.len();
        let mut last_err = None;
        for attempt in 0..len {
            let idx = (index + attempt) % len;
            match self.get_with_rng(idx, rng) {
                Ok(sample) => return Ok(sample),
                Err(e) if e.is_recoverable() => {
                    warn!(dataset = %self.name, index = idx, error = %e, "skipping video");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            VosDatasetError::Other(format!("dataset {} has no videos", self.name))
        }))
    }

    fn load_triplet(
        &self,
        video: &VideoRecord,
        triplet: &FrameTriplet,
    ) -> DatasetResult<(Triplet<RgbImage>, Triplet<GrayImage>)> {
        let mut frames = Vec::with_capacity(TRIPLET_LEN);
        let mut masks = Vec::with_capacity(TRIPLET_LEN);
        for idx in triplet.indices() {
            let path = video.image_for(idx).ok_or_else(|| {
                VosDatasetError::Other(format!("frame {idx} out of range for {}", video.name))
            })?;
            let frame = loader::load_frame(path)?;
            let mask_path = video.mask_for(idx);
            if mask_path.is_none() {
                debug!(video = %video.name, frame = idx, "no annotation; using background");
            }
            let mask = loader::load_mask_or_unlabeled(mask_path, frame.width(), frame.height())?;
            let (frame, mask) = loader::resize_pair(frame, mask, self.reference_short_side);
            frames.push(frame);
            masks.push(mask);
        }
        let frames: Triplet<RgbImage> = frames
            .try_into()
            .map_err(|_| VosDatasetError::Other("triplet frame count mismatch".into()))?;
        let masks: Triplet<GrayImage> = masks
            .try_into()
            .map_err(|_| VosDatasetError::Other("triplet mask count mismatch".into()))?;
        Ok((frames, masks))
    }
}

fn mix_seed(seed: u64, index: u64, draw: u64) -> u64 {
    seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ draw.wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Stack RGB frames into (C, T, H, W), normalized to [0, 1].
fn frames_to_cthw(frames: &[RgbImage]) -> Vec<f32> {
    let t_len = frames.len();
    let (w, h) = frames[0].dimensions();
    let hw = w as usize * h as usize;
    let mut out = vec![0.0f32; 3 * t_len * hw];
    for (t, frame) in frames.iter().enumerate() {
        for (y, x, pixel) in frame.enumerate_pixels() {
            let base = y as usize * w as usize + x as usize;
            for c in 0..3 {
                out[(c * t_len + t) * hw + base] = pixel[c] as f32 / 255.0;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frames_are_channel_then_time_major() {
        let a = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));
        let b = RgbImage::from_pixel(2, 1, Rgb([0, 255, 0]));
        let out = frames_to_cthw(&[a, b]);
        // c=0: t0 [1,1] t1 [0,0]; c=1: t0 [0,0] t1 [1,1]; c=2 zeros
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn change_skip_is_visible_through_shared_reference() {
        let catalog = VideoCatalog::from_videos("/nowhere", Vec::new());
        let dataset = VosTrainDataset::from_catalog("t", catalog, DatasetConfig::default());
        assert_eq!(dataset.skip(), 0);
        let shared = Arc::new(dataset);
        shared.change_skip(4);
        assert_eq!(shared.skip(), 4);
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let catalog = VideoCatalog::from_videos("/nowhere", Vec::new());
        let dataset = VosTrainDataset::from_catalog("t", catalog, DatasetConfig::default());
        let err = dataset.get(3).unwrap_err();
        assert!(matches!(err, VosDatasetError::IndexOutOfRange { index: 3, len: 0 }));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(dataset.get_or_skip(0, &mut rng).is_err());
    }

    #[test]
    fn seed_mixing_separates_draws() {
        assert_ne!(mix_seed(1, 0, 0), mix_seed(1, 0, 1));
        assert_ne!(mix_seed(1, 0, 0), mix_seed(1, 1, 0));
    }
}
