//! Held-out scoring by mean per-object IoU on propagated frames.

use crate::baseline::{BaselineSegmenter, PropagationNet};
use crate::trainer::Evaluator;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Int, Tensor};
use tracing::debug;
use vos_dataset::SampleLoader;

/// Mean IoU over objects `1..=objects` that appear in either map; `None` when none do.
pub fn mean_object_iou(pred: &[i64], target: &[i64], objects: usize) -> Option<f64> {
    let mut total = 0.0;
    let mut scored = 0usize;
    for id in 1..=objects as i64 {
        let mut inter = 0usize;
        let mut union = 0usize;
        for (p, t) in pred.iter().zip(target) {
            let (in_p, in_t) = (*p == id, *t == id);
            if in_p && in_t {
                inter += 1;
            }
            if in_p || in_t {
                union += 1;
            }
        }
        if union > 0 {
            total += inter as f64 / union as f64;
            scored += 1;
        }
    }
    (scored > 0).then(|| total / scored as f64)
}

fn labels_to_vec<B: burn::tensor::backend::Backend>(t: Tensor<B, 3, Int>) -> anyhow::Result<Vec<i64>> {
    t.into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("failed to read label map: {e:?}"))
}

pub struct TripletIouEvaluator<B: AutodiffBackend> {
    loader: SampleLoader,
    batches: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> TripletIouEvaluator<B> {
    pub fn new(loader: SampleLoader, batches: usize, device: B::Device) -> Self {
        Self {
            loader,
            batches: batches.max(1),
            device,
        }
    }
}

impl<B, O> Evaluator<BaselineSegmenter<B, O>> for TripletIouEvaluator<B>
where
    B: AutodiffBackend,
    O: Optimizer<PropagationNet<B>, B>,
{
    fn evaluate(&mut self, model: &mut BaselineSegmenter<B, O>) -> anyhow::Result<f64> {
        let mut total = 0.0;
        let mut scored = 0usize;
        for _ in 0..self.batches {
            let batch = self.loader.next_batch::<B>(1, &self.device)?;
            let objects = batch.max_objects();
            let predictions = model.predict_labels(&batch);
            for (offset, pred) in predictions.into_iter().enumerate() {
                let target = labels_to_vec(batch.target_labels(offset + 1))?;
                if let Some(iou) = mean_object_iou(&labels_to_vec(pred)?, &target, objects) {
                    total += iou;
                    scored += 1;
                }
            }
            debug!(video = %batch.info[0].name, "evaluated triplet");
        }
        Ok(if scored == 0 { 0.0 } else { total / scored as f64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_and_disjoint_predictions() {
        let target = [0, 1, 1, 2, 2, 0];
        assert_eq!(mean_object_iou(&target, &target, 2), Some(1.0));
        let swapped = [0, 2, 2, 1, 1, 0];
        assert_eq!(mean_object_iou(&swapped, &target, 2), Some(0.0));
    }

    #[test]
    fn partial_overlap_averages_objects() {
        let target = [1, 1, 0, 2];
        let pred = [1, 0, 0, 2];
        // object 1: 1/2, object 2: 1/1
        assert_eq!(mean_object_iou(&pred, &target, 2), Some(0.75));
    }

    #[test]
    fn absent_objects_are_not_scored() {
        assert_eq!(mean_object_iou(&[0, 0], &[0, 0], 3), None);
        assert_eq!(mean_object_iou(&[1, 0], &[1, 0], 3), Some(1.0));
    }
}
