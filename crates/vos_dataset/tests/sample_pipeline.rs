//! End-to-end sample construction over synthetic DAVIS / YouTube-VOS trees.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use vos_dataset::{
    CatalogLayout, DatasetConfig, SampleLoader, TransformPipeline, VosDatasetError,
    VosTrainDataset, NUM_CLASSES,
};

const W: u32 = 70;
const H: u32 = 40;

/// Write `frames` JPEG frames and masks for the first `masks` of them.
fn create_video(
    root: &Path,
    name: &str,
    frames: usize,
    masks: usize,
    label_at: impl Fn(usize, u32, u32) -> u8,
) -> anyhow::Result<()> {
    let img_dir = root.join("JPEGImages").join(name);
    let mask_dir = root.join("Annotations").join(name);
    fs::create_dir_all(&img_dir)?;
    fs::create_dir_all(&mask_dir)?;
    for f in 0..frames {
        let frame = RgbImage::from_fn(W, H, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, (f * 20) as u8]));
        frame.save(img_dir.join(format!("{:05}.jpg", f * 5)))?;
        if f < masks {
            let mask = GrayImage::from_fn(W, H, |x, y| Luma([label_at(f, x, y)]));
            mask.save(mask_dir.join(format!("{:05}.png", f * 5)))?;
        }
    }
    Ok(())
}

fn full_frame_config(seed: u64) -> DatasetConfig {
    DatasetConfig {
        layout: CatalogLayout::youtube_vos(),
        seed: Some(seed),
        reference_short_side: H,
        transform: Some(TransformPipeline::center_crop((W, H))),
        ..Default::default()
    }
}

fn halves(_: usize, x: u32, _: u32) -> u8 {
    if x < W / 2 {
        3
    } else {
        7
    }
}

fn stripes(_: usize, x: u32, _: u32) -> u8 {
    (x / 10 + 1) as u8
}

#[test]
fn sample_has_expected_shapes_and_metadata() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "halves", 6, 6, halves)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(1))?;
    assert_eq!(dataset.len(), 1);

    let sample = dataset.get(0)?;
    assert_eq!((sample.width, sample.height), (W, H));
    assert_eq!(sample.frames.len(), 3 * 3 * (W * H) as usize);
    assert!(sample.frames.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(sample.masks.shape(), [NUM_CLASSES, 3, H as usize, W as usize]);
    assert_eq!(sample.num_objects, 2);
    assert_eq!(sample.info.name, "halves");
    assert_eq!(sample.info.num_frames, 6);
    let [n1, n2, n3] = sample.info.frame_indices;
    assert!(n1 < n2 && n2 < n3 && n3 < 6);

    for t in 0..3 {
        for y in 0..H {
            for x in 0..W {
                let sum: u32 = (0..NUM_CLASSES).map(|k| sample.masks.at(k, t, y, x) as u32).sum();
                assert_eq!(sum, 1);
            }
        }
    }
    Ok(())
}

#[test]
fn relabeling_is_consistent_across_the_triplet() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "halves", 8, 8, halves)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(2))?;
    for _ in 0..5 {
        let sample = dataset.get(0)?;
        let decoded: Vec<_> = (0..3).map(|t| sample.masks.decode_frame(t)).collect();
        let left = decoded[0].get(0, 0);
        let right = decoded[0].get(W - 1, 0);
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);
        for mask in &decoded[1..] {
            assert_eq!(mask.get(0, 0), left);
            assert_eq!(mask.get(W - 1, H - 1), right);
        }
    }
    Ok(())
}

#[test]
fn seven_objects_are_capped_to_five() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "stripes", 4, 4, stripes)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(3))?;
    for _ in 0..5 {
        let sample = dataset.get(0)?;
        assert_eq!(sample.num_objects, 5);
        for t in 0..3 {
            let decoded = sample.masks.decode_frame(t);
            let ids: HashSet<u8> = decoded.as_raw().iter().copied().collect();
            assert_eq!(ids, HashSet::from([0, 1, 2, 3, 4, 5]));
            let background_columns = (0..W).filter(|x| decoded.get(*x, 0) == 0).count();
            assert_eq!(background_columns, 20);
        }
    }
    Ok(())
}

#[test]
fn missing_last_mask_becomes_background() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "partial", 3, 2, halves)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(4))?;
    let sample = dataset.get(0)?;
    assert_eq!(sample.info.frame_indices, [0, 1, 2]);
    assert!(!sample.masks.decode_frame(1).is_background());
    assert!(sample.masks.decode_frame(2).is_background());
    Ok(())
}

#[test]
fn missing_middle_mask_does_not_shift_later_annotations() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "gap", 3, 3, halves)?;
    fs::remove_file(tmp.path().join("Annotations/gap/00005.png"))?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(9))?;
    let sample = dataset.get(0)?;
    assert_eq!(sample.info.frame_indices, [0, 1, 2]);
    assert!(sample.masks.decode_frame(1).is_background());
    assert_eq!(sample.masks.decode_frame(2), sample.masks.decode_frame(0));
    Ok(())
}

#[test]
fn saturated_skip_still_draws_triplets() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "long", 12, 12, halves)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(10))?;
    dataset.change_skip(usize::MAX);
    for _ in 0..10 {
        let [n1, n2, n3] = dataset.get(0)?.info.frame_indices;
        assert!(n1 < n2 && n2 < n3 && n3 < 12);
    }
    Ok(())
}

#[test]
fn unannotated_first_frame_still_reports_one_object() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "empty", 3, 3, |_, _, _| 0)?;
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(5))?;
    assert_eq!(dataset.get(0)?.num_objects, 1);
    Ok(())
}

#[test]
fn short_and_corrupt_videos_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "a_short", 2, 2, halves)?;
    create_video(tmp.path(), "b_corrupt", 3, 3, halves)?;
    create_video(tmp.path(), "c_good", 3, 3, halves)?;
    for f in 0..3 {
        fs::write(
            tmp.path().join("JPEGImages/b_corrupt").join(format!("{:05}.jpg", f * 5)),
            b"garbage",
        )?;
    }
    let dataset = VosTrainDataset::open("yt", tmp.path(), full_frame_config(6))?;

    assert!(matches!(
        dataset.get(0).unwrap_err(),
        VosDatasetError::InsufficientFrames { frames: 2, .. }
    ));
    assert!(matches!(
        dataset.get(1).unwrap_err(),
        VosDatasetError::CorruptSample { .. }
    ));

    let mut rng = StdRng::seed_from_u64(0);
    let sample = dataset.get_or_skip(0, &mut rng)?;
    assert_eq!(sample.info.name, "c_good");
    Ok(())
}

#[test]
fn change_skip_widens_future_gaps() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "long", 30, 30, halves)?;
    let cfg = DatasetConfig {
        transform: Some(TransformPipeline::center_crop((16, 16))),
        reference_short_side: 16,
        ..full_frame_config(7)
    };
    let dataset = VosTrainDataset::open("yt", tmp.path(), cfg)?;

    let max_gap = |dataset: &VosTrainDataset| -> anyhow::Result<usize> {
        let mut widest = 0;
        for _ in 0..40 {
            let [n1, n2, n3] = dataset.get(0)?.info.frame_indices;
            widest = widest.max(n2 - n1).max(n3 - n2);
        }
        Ok(widest)
    };
    assert!(max_gap(&dataset)? <= 2);
    dataset.change_skip(8);
    let widened = max_gap(&dataset)?;
    assert!(widened > 2 && widened <= 10);
    Ok(())
}

#[test]
fn seeded_datasets_reproduce_draws() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "long", 20, 20, halves)?;
    let a = VosTrainDataset::open("yt", tmp.path(), full_frame_config(42))?;
    let b = VosTrainDataset::open("yt", tmp.path(), full_frame_config(42))?;
    for _ in 0..5 {
        assert_eq!(a.get(0)?.info.frame_indices, b.get(0)?.info.frame_indices);
    }
    Ok(())
}

#[test]
fn davis_layout_with_resolution_and_image_set() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let res_root = tmp.path().join("nested");
    create_video(&res_root, "bear", 4, 4, halves)?;
    create_video(&res_root, "camel", 4, 4, halves)?;
    // Move into DAVIS shape: JPEGImages/480p/<video>, Annotations/480p/<video>
    for sub in ["JPEGImages", "Annotations"] {
        fs::create_dir_all(tmp.path().join(sub))?;
        fs::rename(res_root.join(sub), tmp.path().join(sub).join("480p"))?;
    }
    fs::create_dir_all(tmp.path().join("ImageSets/2017"))?;
    fs::write(tmp.path().join("ImageSets/2017/train.txt"), "camel\n")?;

    let cfg = DatasetConfig {
        layout: CatalogLayout::davis("480p", "ImageSets/2017/train.txt"),
        ..full_frame_config(8)
    };
    let dataset = VosTrainDataset::open("davis", tmp.path(), cfg)?;
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.get(0)?.info.name, "camel");
    Ok(())
}

#[test]
fn default_pipeline_produces_training_resolution() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "halves", 3, 3, halves)?;
    let cfg = DatasetConfig {
        seed: Some(9),
        ..Default::default()
    };
    let dataset = VosTrainDataset::open("yt", tmp.path(), cfg)?;
    let sample = dataset.get(0)?;
    assert_eq!((sample.width, sample.height), (384, 384));
    assert_eq!(sample.masks.shape(), [NUM_CLASSES, 3, 384, 384]);
    let decoded = sample.masks.decode_frame(0);
    assert!(decoded.as_raw().iter().all(|v| *v <= 2));
    Ok(())
}

#[test]
fn loader_batches_and_restarts_epochs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    create_video(tmp.path(), "a", 4, 4, halves)?;
    create_video(tmp.path(), "b", 5, 5, stripes)?;
    create_video(tmp.path(), "c", 3, 3, halves)?;
    let cfg = DatasetConfig {
        transform: Some(TransformPipeline::center_crop((16, 16))),
        reference_short_side: 16,
        ..full_frame_config(10)
    };
    let dataset = Arc::new(VosTrainDataset::open("yt", tmp.path(), cfg)?);
    let mut loader = SampleLoader::new(Arc::clone(&dataset), Some(3)).strict();
    let device = Default::default();

    let batch = loader.next_batch::<burn_ndarray::NdArray<f32>>(2, &device)?;
    assert_eq!(batch.frames.dims(), [2, 3, 3, 16, 16]);
    assert_eq!(batch.masks.dims(), [2, NUM_CLASSES, 3, 16, 16]);
    assert_eq!(loader.epoch(), 0);

    let mut seen: HashSet<String> = batch.info.iter().map(|i| i.name.clone()).collect();
    let next = loader.next_batch::<burn_ndarray::NdArray<f32>>(2, &device)?;
    seen.extend(next.info.iter().map(|i| i.name.clone()));
    assert_eq!(loader.epoch(), 1);
    assert_eq!(seen.len(), 3);
    Ok(())
}
