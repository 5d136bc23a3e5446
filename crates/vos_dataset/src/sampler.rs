//! Temporal frame selection for training triplets.

use crate::types::{DatasetResult, FrameTriplet, VideoRecord, VosDatasetError, TRIPLET_LEN};
use rand::{Rng, RngCore};

/// Draws three increasing frame indices; consecutive gaps are at most `2 + skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemporalSampler {
    pub skip: usize,
}

impl TemporalSampler {
    pub fn new(skip: usize) -> Self {
        Self { skip }
    }

    /// Largest allowed distance between two consecutive picks.
    pub fn max_gap(&self) -> usize {
        self.skip.saturating_add(2)
    }

    pub fn draw(&self, video: &VideoRecord, rng: &mut dyn RngCore) -> DatasetResult<FrameTriplet> {
        self.draw_indices(video.frame_count(), rng)
            .ok_or_else(|| VosDatasetError::InsufficientFrames {
                video: video.name.clone(),
                frames: video.frame_count(),
            })
    }

    /// `None` when `frame_count < 3`.
    pub fn draw_indices(&self, frame_count: usize, rng: &mut dyn RngCore) -> Option<FrameTriplet> {
        if frame_count < TRIPLET_LEN {
            return None;
        }
        let gap = self.max_gap();
        let n1 = rng.random_range(0..=frame_count - 3);
        let n2 = rng.random_range(n1 + 1..=(frame_count - 2).min(n1.saturating_add(gap)));
        let n3 = rng.random_range(n2 + 1..=(frame_count - 1).min(n2.saturating_add(gap)));
        Some(FrameTriplet([n1, n2, n3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn too_short_video_fails() {
        let video = VideoRecord {
            name: "short".into(),
            image_files: vec!["a.jpg".into(), "b.jpg".into()],
            mask_files: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let err = TemporalSampler::new(0).draw(&video, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            VosDatasetError::InsufficientFrames { frames: 2, .. }
        ));
    }

    #[test]
    fn three_frames_has_a_single_choice() {
        let mut rng = StdRng::seed_from_u64(3);
        for skip in [0, 5, 25] {
            let t = TemporalSampler::new(skip)
                .draw_indices(3, &mut rng)
                .unwrap();
            assert_eq!(t.indices(), [0, 1, 2]);
        }
    }

    #[test]
    fn five_frames_zero_skip_covers_allowed_range() {
        let sampler = TemporalSampler::new(0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut firsts = HashSet::new();
        for _ in 0..500 {
            let [n1, n2, n3] = sampler.draw_indices(5, &mut rng).unwrap().indices();
            assert!(n1 <= 2);
            assert!(n2 > n1 && n2 <= n1 + 2);
            assert!(n3 > n2 && n3 <= 4.min(n2 + 2));
            firsts.insert(n1);
        }
        assert_eq!(firsts, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn larger_skip_reaches_wider_gaps() {
        let sampler = TemporalSampler::new(10);
        let mut rng = StdRng::seed_from_u64(11);
        let widest = (0..2000)
            .map(|_| {
                let [n1, n2, _] = sampler.draw_indices(100, &mut rng).unwrap().indices();
                n2 - n1
            })
            .max()
            .unwrap();
        assert_eq!(widest, 12);
    }

    #[test]
    fn saturated_skip_spans_the_whole_video() {
        let sampler = TemporalSampler::new(usize::MAX);
        assert_eq!(sampler.max_gap(), usize::MAX);
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let [n1, n2, n3] = sampler.draw_indices(40, &mut rng).unwrap().indices();
            assert!(n1 < n2 && n2 < n3 && n3 < 40);
        }
    }

    proptest! {
        #[test]
        fn triplets_respect_gap_budget(frames in 3usize..200, skip in 0usize..30, seed in any::<u64>()) {
            let sampler = TemporalSampler::new(skip);
            let mut rng = StdRng::seed_from_u64(seed);
            let [n1, n2, n3] = sampler.draw_indices(frames, &mut rng).unwrap().indices();
            prop_assert!(n1 < n2 && n2 < n3);
            prop_assert!((1..=2 + skip).contains(&(n2 - n1)));
            prop_assert!((1..=2 + skip).contains(&(n3 - n2)));
            prop_assert!(n3 < frames);
        }
    }
}
