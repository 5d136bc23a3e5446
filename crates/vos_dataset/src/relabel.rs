//! Raw-label to compact-id relabeling with a per-sample object cap.

use crate::types::{DenseMask, MAX_OBJECTS_PER_SAMPLE, MAX_RAW_LABEL, NUM_CLASSES};
use image::GrayImage;
use rand::RngCore;

/// Ordered raw labels; entry `i` becomes compact id `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectIdentityMap {
    labels: Vec<u8>,
}

impl ObjectIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: Vec<u8>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn compact_id(&self, raw: u8) -> Option<u8> {
        self.labels
            .iter()
            .position(|l| *l == raw)
            .map(|i| (i + 1) as u8)
    }

    /// Map every pixel through the identity list; unknown labels become background.
    pub fn relabel(&self, raw: &GrayImage) -> DenseMask {
        let mut lut = [0u8; 256];
        for (i, label) in self.labels.iter().enumerate().take(NUM_CLASSES - 1) {
            lut[*label as usize] = (i + 1) as u8;
        }
        let data = raw.as_raw().iter().map(|v| lut[*v as usize]).collect();
        DenseMask::from_raw(raw.width(), raw.height(), data)
            .unwrap_or_else(|_| DenseMask::background(raw.width(), raw.height()))
    }
}

/// Raw labels `1..=MAX_RAW_LABEL` present in `raw`, ascending.
pub fn discover_labels(raw: &GrayImage) -> Vec<u8> {
    let mut present = [false; MAX_RAW_LABEL as usize + 1];
    for v in raw.as_raw() {
        if (1..=MAX_RAW_LABEL).contains(v) {
            present[*v as usize] = true;
        }
    }
    (1..=MAX_RAW_LABEL)
        .filter(|l| present[*l as usize])
        .collect()
}

/// Accumulator carried across the frames of one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelabelState {
    pub object_count: usize,
    pub identity: ObjectIdentityMap,
}

#[derive(Debug, Clone, Copy)]
pub struct MaskRelabeler {
    max_objects: usize,
}

impl Default for MaskRelabeler {
    fn default() -> Self {
        Self::new(MAX_OBJECTS_PER_SAMPLE)
    }
}

impl MaskRelabeler {
    pub fn new(max_objects: usize) -> Self {
        Self {
            max_objects: max_objects.min(NUM_CLASSES - 1),
        }
    }

    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Relabel one frame of a triplet. Only `position == 0` extends the identity map.
    pub fn process(
        &self,
        raw: &GrayImage,
        position: usize,
        state: RelabelState,
        rng: &mut dyn RngCore,
    ) -> (DenseMask, RelabelState) {
        let state = if position == 0 {
            self.discover(raw, state, rng)
        } else {
            state
        };
        (state.identity.relabel(raw), state)
    }

    fn discover(&self, raw: &GrayImage, state: RelabelState, rng: &mut dyn RngCore) -> RelabelState {
        let found = discover_labels(raw);
        let mut object_count = state.object_count + found.len();
        let mut labels = state.identity.labels;
        labels.extend(found);
        if object_count > self.max_objects {
            object_count = self.max_objects;
            labels = rand::seq::index::sample(rng, labels.len(), self.max_objects)
                .into_iter()
                .map(|i| labels[i])
                .collect();
        }
        RelabelState {
            object_count,
            identity: ObjectIdentityMap { labels },
        }
    }

    /// Relabel a whole triplet, carrying the first frame's identity map forward.
    pub fn process_triplet(
        &self,
        raws: &[GrayImage],
        rng: &mut dyn RngCore,
    ) -> (Vec<DenseMask>, RelabelState) {
        let mut state = RelabelState::default();
        let mut dense = Vec::with_capacity(raws.len());
        for (position, raw) in raws.iter().enumerate() {
            let (mask, next) = self.process(raw, position, state, rng);
            dense.push(mask);
            state = next;
        }
        (dense, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNLABELED;
    use image::Luma;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn mask_of(values: &[u8]) -> GrayImage {
        GrayImage::from_raw(values.len() as u32, 1, values.to_vec()).unwrap()
    }

    #[test]
    fn first_frame_ids_follow_discovery_order() {
        let relabeler = MaskRelabeler::default();
        let mut rng = StdRng::seed_from_u64(0);
        let raw = mask_of(&[0, 7, 3, 3, 200, 10]);
        let (dense, state) = relabeler.process(&raw, 0, RelabelState::default(), &mut rng);
        assert_eq!(state.object_count, 3);
        assert_eq!(state.identity.labels(), &[3, 7, 10]);
        assert_eq!(dense.as_raw(), &[0, 2, 1, 1, 0, 3]);
    }

    #[test]
    fn later_frames_reuse_identity_and_drop_new_labels() {
        let relabeler = MaskRelabeler::default();
        let mut rng = StdRng::seed_from_u64(0);
        let (_, state) = relabeler.process(&mask_of(&[2, 5]), 0, RelabelState::default(), &mut rng);
        let (dense, after) = relabeler.process(&mask_of(&[5, 2, 4, 0]), 1, state.clone(), &mut rng);
        assert_eq!(after, state);
        assert_eq!(dense.as_raw(), &[2, 1, 0, 0]);
    }

    #[test]
    fn seven_objects_are_capped_to_five() {
        let relabeler = MaskRelabeler::default();
        let raw = mask_of(&[1, 2, 3, 4, 5, 6, 7]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (dense, state) = relabeler.process(&raw, 0, RelabelState::default(), &mut rng);
            assert_eq!(state.object_count, 5);
            assert_eq!(state.identity.len(), 5);
            let kept: HashSet<u8> = state.identity.labels().iter().copied().collect();
            assert_eq!(kept.len(), 5);
            assert!(kept.iter().all(|l| (1..=7).contains(l)));
            let survivors = dense.as_raw().iter().filter(|v| **v != 0).count();
            assert_eq!(survivors, 5);
            let ids: HashSet<u8> = dense.as_raw().iter().copied().filter(|v| *v != 0).collect();
            assert_eq!(ids, HashSet::from([1, 2, 3, 4, 5]));
        }
    }

    #[test]
    fn subset_choice_varies_with_rng() {
        let relabeler = MaskRelabeler::default();
        let raw = mask_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let subsets: HashSet<Vec<u8>> = (0..30)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let (_, state) = relabeler.process(&raw, 0, RelabelState::default(), &mut rng);
                let mut labels = state.identity.labels().to_vec();
                labels.sort();
                labels
            })
            .collect();
        assert!(subsets.len() > 1);
    }

    #[test]
    fn empty_first_frame_keeps_zero_objects() {
        let relabeler = MaskRelabeler::default();
        let mut rng = StdRng::seed_from_u64(0);
        let unlabeled = GrayImage::from_pixel(3, 3, Luma([UNLABELED]));
        let (dense, state) =
            relabeler.process_triplet(&[unlabeled.clone(), mask_of(&[1]), unlabeled], &mut rng);
        assert_eq!(state.object_count, 0);
        assert!(dense.iter().all(DenseMask::is_background));
    }

    #[test]
    fn unlabeled_frame_relabels_to_background() {
        let identity = ObjectIdentityMap::from_labels(vec![1, 2]);
        let dense = identity.relabel(&GrayImage::from_pixel(4, 2, Luma([UNLABELED])));
        assert!(dense.is_background());
    }

    proptest! {
        #[test]
        fn identity_is_capped_and_consistent(
            first in proptest::collection::vec(0u8..=12, 1..64),
            second in proptest::collection::vec(0u8..=12, 1..64),
            seed in any::<u64>(),
        ) {
            let relabeler = MaskRelabeler::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let frames = [mask_of(&first), mask_of(&second)];
            let (dense, state) = relabeler.process_triplet(&frames, &mut rng);
            prop_assert!(state.identity.len() <= MAX_OBJECTS_PER_SAMPLE);
            prop_assert_eq!(state.object_count, state.identity.len());
            for (raw, mask) in frames.iter().zip(&dense) {
                for (r, d) in raw.as_raw().iter().zip(mask.as_raw()) {
                    prop_assert_eq!(state.identity.compact_id(*r).unwrap_or(0), *d);
                }
            }
        }
    }
}
