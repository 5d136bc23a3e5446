//! Small convolutional mask-propagation network used by the `train` binary.
//!
//! Each step predicts frame `t` from its pixels and the soft mask of frame
//! `t - 1`: ground truth for the first frame, the previous prediction after
//! that. Frames 1 and 2 contribute a cross-entropy term each.

use crate::trainer::SegmentationModel;
use burn::module::{AutodiffModule, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::nn::PaddingConfig2d;
use burn::optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor, TensorData};
use std::path::Path;
use tracing::info;
use vos_dataset::{SampleBatch, NUM_CLASSES};

/// Added to the logits of classes beyond a sample's object count.
const ABSENT_CLASS_PENALTY: f32 = -1.0e4;

#[derive(Debug, Clone)]
pub struct PropagationNetConfig {
    pub hidden: usize,
}

impl Default for PropagationNetConfig {
    fn default() -> Self {
        Self { hidden: 32 }
    }
}

#[derive(Debug, Module)]
pub struct PropagationNet<B: Backend> {
    encoder: Conv2d<B>,
    refine: Conv2d<B>,
    head: Conv2d<B>,
}

impl<B: Backend> PropagationNet<B> {
    pub fn new(cfg: &PropagationNetConfig, device: &B::Device) -> Self {
        let hidden = cfg.hidden.max(1);
        let encoder = Conv2dConfig::new([3 + NUM_CLASSES, hidden], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let refine = Conv2dConfig::new([hidden, hidden], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let head = Conv2dConfig::new([hidden, NUM_CLASSES], [1, 1]).init(device);
        Self {
            encoder,
            refine,
            head,
        }
    }

    /// `frame` [B, 3, H, W] and `prev_mask` [B, K, H, W] to logits [B, K, H, W].
    pub fn forward(&self, frame: Tensor<B, 4>, prev_mask: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = Tensor::cat(vec![frame, prev_mask], 1);
        let x = relu(self.encoder.forward(x));
        let x = relu(self.refine.forward(x));
        self.head.forward(x)
    }
}

/// [B, K, 1, 1] additive mask hiding classes a sample does not use.
fn class_mask<B: Backend>(object_counts: &[usize], device: &B::Device) -> Tensor<B, 4> {
    let mut data = Vec::with_capacity(object_counts.len() * NUM_CLASSES);
    for count in object_counts {
        for k in 0..NUM_CLASSES {
            data.push(if k <= *count { 0.0 } else { ABSENT_CLASS_PENALTY });
        }
    }
    Tensor::from_data(
        TensorData::new(data, [object_counts.len(), NUM_CLASSES, 1, 1]),
        device,
    )
}

/// Argmax classes for frames 1 and 2 under the per-sample class mask.
pub fn predict_classes<Bk: Backend>(
    net: &PropagationNet<Bk>,
    frames: [Tensor<Bk, 4>; 2],
    first_mask: Tensor<Bk, 4>,
    object_counts: &[usize],
) -> [Tensor<Bk, 3, Int>; 2] {
    let penalty = class_mask::<Bk>(object_counts, &first_mask.device());
    propagate(net, frames, first_mask, penalty).map(|logits| logits.argmax(1).squeeze::<3>(1))
}

/// Logits for frames 1 and 2, each propagated from the previous frame.
fn propagate<Bk: Backend>(
    net: &PropagationNet<Bk>,
    frames: [Tensor<Bk, 4>; 2],
    first_mask: Tensor<Bk, 4>,
    penalty: Tensor<Bk, 4>,
) -> [Tensor<Bk, 4>; 2] {
    let [frame1, frame2] = frames;
    let second = net.forward(frame1, first_mask) + penalty.clone();
    let carried = softmax(second.clone(), 1);
    let third = net.forward(frame2, carried) + penalty;
    [second, third]
}

/// The network has no dropout or normalization layers, so train and eval
/// forwards are identical; prediction runs on the inner backend without a graph.
pub struct BaselineSegmenter<B: AutodiffBackend, O> {
    net: PropagationNet<B>,
    optim: O,
    grads: GradientsAccumulator<PropagationNet<B>>,
    criterion: CrossEntropyLoss<B>,
    device: B::Device,
}

/// Baseline network with Adam (eps 1e-8, betas 0.9 / 0.999).
pub fn baseline_segmenter<B: AutodiffBackend>(
    cfg: &PropagationNetConfig,
    device: &B::Device,
) -> BaselineSegmenter<B, impl Optimizer<PropagationNet<B>, B>> {
    let optim = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .init::<B, PropagationNet<B>>();
    BaselineSegmenter {
        net: PropagationNet::new(cfg, device),
        optim,
        grads: GradientsAccumulator::new(),
        criterion: CrossEntropyLossConfig::new().init(device),
        device: device.clone(),
    }
}

impl<B, O> BaselineSegmenter<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PropagationNet<B>, B>,
{
    pub fn net(&self) -> &PropagationNet<B> {
        &self.net
    }

    /// Predicted class per pixel for frames 1 and 2, each [B, H, W].
    pub fn predict_labels(&self, batch: &SampleBatch<B>) -> [Tensor<B::InnerBackend, 3, Int>; 2] {
        predict_classes(
            &self.net.valid(),
            [batch.frame(1).inner(), batch.frame(2).inner()],
            batch.mask(0).inner(),
            &batch.object_counts,
        )
    }

    fn pixel_loss(&self, logits: Tensor<B, 4>, targets: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        let [b, k, h, w] = logits.dims();
        let logits = logits.permute([0, 2, 3, 1]).reshape([b * h * w, k]);
        self.criterion.forward(logits, targets.reshape([b * h * w]))
    }
}

impl<B, O> SegmentationModel<B> for BaselineSegmenter<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PropagationNet<B>, B>,
{
    fn accumulate(&mut self, batch: &SampleBatch<B>) -> anyhow::Result<f32> {
        let penalty = class_mask::<B>(&batch.object_counts, &self.device);
        let [second, third] = propagate(
            &self.net,
            [batch.frame(1), batch.frame(2)],
            batch.mask(0),
            penalty,
        );
        let loss = self.pixel_loss(second, batch.target_labels(1))
            + self.pixel_loss(third, batch.target_labels(2));
        let value = loss
            .clone()
            .detach()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read loss value: {e:?}"))?
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("loss tensor is empty"))?;
        let grads = GradientsParams::from_grads(loss.backward(), &self.net);
        self.grads.accumulate(&self.net, grads);
        Ok(value)
    }

    fn apply_update(&mut self, lr: f64) -> anyhow::Result<()> {
        let grads = self.grads.grads();
        self.net = self.optim.step(lr, self.net.clone(), grads);
        Ok(())
    }

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.net
            .clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
    }

    fn load_checkpoint(&mut self, path: &Path) -> anyhow::Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.net = self
            .net
            .clone()
            .load_file(path.to_path_buf(), &recorder, &self.device)
            .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?;
        info!(path = %path.display(), "loaded checkpoint");
        Ok(())
    }

    fn set_train_mode(&mut self, _train: bool) {}
}
