//! Fixed-capacity one-hot expansion of dense masks.

use crate::types::{DatasetResult, DenseMask, VosDatasetError, NUM_CLASSES};

/// Binary planes in (K, H, W) layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl OneHotMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, class: usize) -> &[u8] {
        let n = self.width as usize * self.height as usize;
        &self.data[class * n..(class + 1) * n]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// Planes of a whole sample in (K, T, H, W) layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotTriplet {
    frames: usize,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl OneHotTriplet {
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (K, T, H, W).
    pub fn shape(&self) -> [usize; 4] {
        [
            NUM_CLASSES,
            self.frames,
            self.height as usize,
            self.width as usize,
        ]
    }

    pub fn at(&self, class: usize, frame: usize, y: u32, x: u32) -> u8 {
        let hw = self.width as usize * self.height as usize;
        let pixel = y as usize * self.width as usize + x as usize;
        self.data[(class * self.frames + frame) * hw + pixel]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Argmax over classes for one frame.
    pub fn decode_frame(&self, frame: usize) -> DenseMask {
        let hw = self.width as usize * self.height as usize;
        let mut out = vec![0u8; hw];
        for (i, label) in out.iter_mut().enumerate() {
            let mut best = 0;
            for k in 1..NUM_CLASSES {
                if self.data[(k * self.frames + frame) * hw + i]
                    > self.data[(best * self.frames + frame) * hw + i]
                {
                    best = k;
                }
            }
            *label = best as u8;
        }
        dense_from_argmax(self.width, self.height, out)
    }
}

pub fn encode(dense: &DenseMask) -> OneHotMask {
    let hw = dense.as_raw().len();
    let mut data = vec![0u8; NUM_CLASSES * hw];
    for (i, v) in dense.as_raw().iter().enumerate() {
        data[*v as usize * hw + i] = 1;
    }
    OneHotMask {
        width: dense.width(),
        height: dense.height(),
        data,
    }
}

/// Stack per-frame encodings into (K, T, H, W). All masks must share a size.
pub fn encode_batch(masks: &[DenseMask]) -> DatasetResult<OneHotTriplet> {
    let Some(first) = masks.first() else {
        return Err(VosDatasetError::Other("cannot one-hot encode zero frames".into()));
    };
    let (width, height) = (first.width(), first.height());
    if let Some(m) = masks
        .iter()
        .find(|m| m.width() != width || m.height() != height)
    {
        return Err(VosDatasetError::Other(format!(
            "mask sizes differ within sample: {}x{} vs {}x{}",
            m.width(),
            m.height(),
            width,
            height
        )));
    }
    let frames = masks.len();
    let hw = width as usize * height as usize;
    let mut data = vec![0u8; NUM_CLASSES * frames * hw];
    for (t, mask) in masks.iter().enumerate() {
        for (i, v) in mask.as_raw().iter().enumerate() {
            data[(*v as usize * frames + t) * hw + i] = 1;
        }
    }
    Ok(OneHotTriplet {
        frames,
        width,
        height,
        data,
    })
}

/// Per-pixel argmax of a single-frame encoding.
pub fn decode(planes: &OneHotMask) -> DenseMask {
    let hw = planes.width as usize * planes.height as usize;
    let mut out = vec![0u8; hw];
    for (i, label) in out.iter_mut().enumerate() {
        let mut best = 0;
        for k in 1..NUM_CLASSES {
            if planes.data[k * hw + i] > planes.data[best * hw + i] {
                best = k;
            }
        }
        *label = best as u8;
    }
    dense_from_argmax(planes.width, planes.height, out)
}

fn dense_from_argmax(width: u32, height: u32, data: Vec<u8>) -> DenseMask {
    DenseMask::from_raw(width, height, data).unwrap_or_else(|_| DenseMask::background(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dense(width: u32, values: Vec<u8>) -> DenseMask {
        let height = values.len() as u32 / width;
        DenseMask::from_raw(width, height, values).unwrap()
    }

    #[test]
    fn planes_mark_their_class() {
        let planes = encode(&dense(2, vec![0, 3, 10, 3]));
        assert_eq!(planes.plane(0), &[1, 0, 0, 0]);
        assert_eq!(planes.plane(3), &[0, 1, 0, 1]);
        assert_eq!(planes.plane(10), &[0, 0, 1, 0]);
        assert!(planes.plane(5).iter().all(|v| *v == 0));
    }

    #[test]
    fn batch_layout_is_class_then_frame() {
        let batch = encode_batch(&[
            dense(2, vec![0, 1]),
            dense(2, vec![1, 1]),
            dense(2, vec![2, 0]),
        ])
        .unwrap();
        assert_eq!(batch.shape(), [NUM_CLASSES, 3, 1, 2]);
        assert_eq!(batch.at(1, 0, 0, 1), 1);
        assert_eq!(batch.at(1, 1, 0, 0), 1);
        assert_eq!(batch.at(2, 2, 0, 0), 1);
        assert_eq!(batch.at(0, 2, 0, 1), 1);
        assert_eq!(batch.decode_frame(2).as_raw(), &[2, 0]);
    }

    #[test]
    fn batch_rejects_mismatched_sizes() {
        assert!(encode_batch(&[dense(2, vec![0, 0]), dense(1, vec![0])]).is_err());
        assert!(encode_batch(&[]).is_err());
    }

    proptest! {
        #[test]
        fn partition_of_unity_and_argmax_round_trip(
            width in 1u32..9,
            values in proptest::collection::vec(0u8..NUM_CLASSES as u8, 1..81),
        ) {
            let usable = (values.len() as u32 / width) * width;
            prop_assume!(usable > 0);
            let mask = dense(width, values[..usable as usize].to_vec());
            let planes = encode(&mask);
            let hw = mask.as_raw().len();
            for i in 0..hw {
                let sum: u32 = (0..NUM_CLASSES).map(|k| planes.plane(k)[i] as u32).sum();
                prop_assert_eq!(sum, 1);
            }
            prop_assert_eq!(decode(&planes), mask.clone());

            let batch = encode_batch(&[mask.clone(), mask.clone(), mask.clone()]).unwrap();
            prop_assert_eq!(batch.decode_frame(1), mask);
        }
    }
}
