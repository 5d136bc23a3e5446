//! Joint augmentation applied identically to every frame and mask of a sample.

use crate::types::{DatasetResult, Triplet, VosDatasetError, TRAIN_SIZE};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Augments a triplet with one random parameter draw.
///
/// Implementations must give all frames and masks the same geometry and must
/// never blend mask labels.
pub trait JointAugment: Send + Sync {
    fn apply(
        &self,
        frames: Triplet<RgbImage>,
        masks: Triplet<GrayImage>,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Triplet<RgbImage>, Triplet<GrayImage>)>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropMode {
    /// Crop offset drawn uniformly per sample.
    Random,
    /// Centered crop; used for preview/evaluation.
    Center,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformPipeline {
    /// Output (width, height).
    pub crop_size: (u32, u32),
    pub crop_mode: CropMode,
    pub flip_horizontal_prob: f32,
    /// Scale range applied before cropping; raised when the result would be smaller than the crop.
    pub scale_min: f32,
    pub scale_max: f32,
    /// Probability of brightness/contrast jitter (frames only).
    pub color_jitter_prob: f32,
    pub color_jitter_strength: f32,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self {
            crop_size: (TRAIN_SIZE, TRAIN_SIZE),
            crop_mode: CropMode::Random,
            flip_horizontal_prob: 0.5,
            scale_min: 0.8,
            scale_max: 1.2,
            color_jitter_prob: 0.5,
            color_jitter_strength: 0.1,
        }
    }
}

/// Parameters drawn once per sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub scaled_size: (u32, u32),
    pub flip: bool,
    pub crop_origin: (u32, u32),
    pub brightness: f32,
    pub contrast: f32,
}

impl TransformPipeline {
    /// Deterministic pipeline: centered crop, no flips or jitter.
    pub fn center_crop(size: (u32, u32)) -> Self {
        Self {
            crop_size: size,
            crop_mode: CropMode::Center,
            flip_horizontal_prob: 0.0,
            scale_min: 1.0,
            scale_max: 1.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.0,
        }
    }

    pub fn draw_params(&self, input: (u32, u32), rng: &mut dyn RngCore) -> AugmentParams {
        let (w, h) = input;
        let (cw, ch) = self.crop_size;
        let mut scale = if self.scale_max > self.scale_min {
            rng.random_range(self.scale_min..self.scale_max)
        } else {
            self.scale_min
        };
        let fit = f32::max(cw as f32 / w as f32, ch as f32 / h as f32);
        if scale < fit {
            scale = fit;
        }
        let sw = ((w as f32 * scale).round() as u32).max(cw);
        let sh = ((h as f32 * scale).round() as u32).max(ch);

        let flip = self.flip_horizontal_prob > 0.0
            && rng.random_range(0.0..1.0) < self.flip_horizontal_prob;

        let crop_origin = match self.crop_mode {
            CropMode::Random => (rng.random_range(0..=sw - cw), rng.random_range(0..=sh - ch)),
            CropMode::Center => ((sw - cw) / 2, (sh - ch) / 2),
        };

        let (brightness, contrast) = if self.color_jitter_prob > 0.0
            && self.color_jitter_strength > 0.0
            && rng.random_range(0.0..1.0) < self.color_jitter_prob
        {
            let s = self.color_jitter_strength;
            (
                1.0 + rng.random_range(-s..s),
                1.0 + rng.random_range(-s..s),
            )
        } else {
            (1.0, 1.0)
        };

        AugmentParams {
            scaled_size: (sw, sh),
            flip,
            crop_origin,
            brightness,
            contrast,
        }
    }

    pub fn apply_frame(&self, img: &RgbImage, params: &AugmentParams) -> RgbImage {
        let mut out = self.geometry(img, params, FilterType::Triangle);
        jitter(&mut out, params.brightness, params.contrast);
        out
    }

    pub fn apply_mask(&self, mask: &GrayImage, params: &AugmentParams) -> GrayImage {
        self.geometry(mask, params, FilterType::Nearest)
    }

    fn geometry<P>(
        &self,
        img: &image::ImageBuffer<P, Vec<u8>>,
        params: &AugmentParams,
        filter: FilterType,
    ) -> image::ImageBuffer<P, Vec<u8>>
    where
        P: image::Pixel<Subpixel = u8> + 'static,
    {
        let (sw, sh) = params.scaled_size;
        let mut scaled = if img.dimensions() == (sw, sh) {
            img.clone()
        } else {
            image::imageops::resize(img, sw, sh, filter)
        };
        if params.flip {
            image::imageops::flip_horizontal_in_place(&mut scaled);
        }
        let (x, y) = params.crop_origin;
        let (cw, ch) = self.crop_size;
        image::imageops::crop_imm(&scaled, x, y, cw, ch).to_image()
    }
}

impl JointAugment for TransformPipeline {
    fn apply(
        &self,
        frames: Triplet<RgbImage>,
        masks: Triplet<GrayImage>,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<(Triplet<RgbImage>, Triplet<GrayImage>)> {
        let dims = frames[0].dimensions();
        let mismatched = frames
            .iter()
            .map(|f| f.dimensions())
            .chain(masks.iter().map(|m| m.dimensions()))
            .find(|d| *d != dims);
        if let Some((w, h)) = mismatched {
            return Err(VosDatasetError::Other(format!(
                "augmentation inputs differ in size: {}x{} vs {}x{}",
                w, h, dims.0, dims.1
            )));
        }
        let params = self.draw_params(dims, rng);
        let frames = frames.map(|f| self.apply_frame(&f, &params));
        let masks = masks.map(|m| self.apply_mask(&m, &params));
        Ok((frames, masks))
    }

    fn describe(&self) -> String {
        format!(
            "crop={}x{} mode={:?} flip_p={:.2} scale=[{:.2},{:.2}] color_jitter_p={:.2} strength={:.2}",
            self.crop_size.0,
            self.crop_size.1,
            self.crop_mode,
            self.flip_horizontal_prob,
            self.scale_min,
            self.scale_max,
            self.color_jitter_prob,
            self.color_jitter_strength,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformPipelineBuilder {
    inner: TransformPipeline,
}

impl TransformPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn crop_size(mut self, size: (u32, u32)) -> Self {
        self.inner.crop_size = size;
        self
    }
    pub fn crop_mode(mut self, mode: CropMode) -> Self {
        self.inner.crop_mode = mode;
        self
    }
    pub fn flip_horizontal_prob(mut self, p: f32) -> Self {
        self.inner.flip_horizontal_prob = p;
        self
    }
    pub fn scale_range(mut self, min: f32, max: f32) -> Self {
        self.inner.scale_min = min;
        self.inner.scale_max = max;
        self
    }
    pub fn color_jitter(mut self, prob: f32, strength: f32) -> Self {
        self.inner.color_jitter_prob = prob;
        self.inner.color_jitter_strength = strength;
        self
    }
    pub fn build(self) -> TransformPipeline {
        self.inner
    }
}

fn jitter(img: &mut RgbImage, brightness: f32, contrast: f32) {
    if brightness == 1.0 && contrast == 1.0 {
        return;
    }
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let v = ((v - 0.5) * contrast + 0.5) * brightness;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}
