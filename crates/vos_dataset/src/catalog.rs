//! Indexing of per-video frame and annotation files.

use crate::types::{DatasetResult, VideoRecord, VosDatasetError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where frames and annotations live under a dataset root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLayout {
    pub images_subdir: String,
    pub masks_subdir: String,
    /// Extra level between the subdir and the video folders (DAVIS uses `480p`).
    pub resolution: Option<String>,
    /// Text file with one video name per line, relative to the root unless absolute.
    pub image_set: Option<PathBuf>,
    pub image_ext: String,
    pub mask_ext: String,
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self::youtube_vos()
    }
}

impl CatalogLayout {
    pub fn youtube_vos() -> Self {
        Self {
            images_subdir: "JPEGImages".to_string(),
            masks_subdir: "Annotations".to_string(),
            resolution: None,
            image_set: None,
            image_ext: "jpg".to_string(),
            mask_ext: "png".to_string(),
        }
    }

    /// DAVIS layout, e.g. `davis("480p", "ImageSets/2017/train.txt")`.
    pub fn davis(resolution: &str, image_set: impl Into<PathBuf>) -> Self {
        Self {
            resolution: Some(resolution.to_string()),
            image_set: Some(image_set.into()),
            ..Self::youtube_vos()
        }
    }

    fn images_dir(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.images_subdir);
        match &self.resolution {
            Some(res) => dir.join(res),
            None => dir,
        }
    }

    fn masks_dir(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.masks_subdir);
        match &self.resolution {
            Some(res) => dir.join(res),
            None => dir,
        }
    }
}

/// Immutable list of videos built once per dataset.
#[derive(Debug, Clone)]
pub struct VideoCatalog {
    root: PathBuf,
    videos: Vec<VideoRecord>,
}

impl VideoCatalog {
    /// Scan `root` according to `layout`.
    pub fn index(root: &Path, layout: &CatalogLayout) -> DatasetResult<Self> {
        let images_dir = layout.images_dir(root);
        if !images_dir.is_dir() {
            return Err(VosDatasetError::layout(
                &images_dir,
                "images directory missing",
            ));
        }
        let masks_dir = layout.masks_dir(root);
        if !masks_dir.is_dir() {
            warn!(
                path = %masks_dir.display(),
                "annotations directory missing; every frame will be unannotated"
            );
        }

        let names = match &layout.image_set {
            Some(set) => {
                let set_path = if set.is_absolute() {
                    set.clone()
                } else {
                    root.join(set)
                };
                read_image_set(&set_path)?
            }
            None => list_video_dirs(&images_dir)?,
        };

        let mut videos = Vec::with_capacity(names.len());
        for name in names {
            let video_dir = images_dir.join(&name);
            if !video_dir.is_dir() {
                return Err(VosDatasetError::layout(
                    &video_dir,
                    "listed video has no image directory",
                ));
            }
            let image_files = list_files(&video_dir, &layout.image_ext)?;
            if image_files.is_empty() {
                return Err(VosDatasetError::layout(&video_dir, "video has no images"));
            }
            let mask_files = align_masks(
                &image_files,
                list_files(&masks_dir.join(&name), &layout.mask_ext)?,
            );
            let annotated = mask_files.iter().flatten().count();
            debug!(
                video = %name,
                frames = image_files.len(),
                masks = annotated,
                "indexed video"
            );
            videos.push(VideoRecord {
                name,
                image_files,
                mask_files,
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            videos,
        })
    }

    pub fn from_videos(root: impl Into<PathBuf>, videos: Vec<VideoRecord>) -> Self {
        Self {
            root: root.into(),
            videos,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VideoRecord> {
        self.videos.get(index)
    }

    pub fn videos(&self) -> &[VideoRecord] {
        &self.videos
    }

    pub fn total_frames(&self) -> usize {
        self.videos.iter().map(VideoRecord::frame_count).sum()
    }
}

fn read_image_set(path: &Path) -> DatasetResult<Vec<String>> {
    let raw = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VosDatasetError::layout(path, "image set file missing")
        } else {
            VosDatasetError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn list_video_dirs(images_dir: &Path) -> DatasetResult<Vec<String>> {
    let entries = fs::read_dir(images_dir).map_err(|e| VosDatasetError::Io {
        path: images_dir.to_path_buf(),
        source: e,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// One slot per frame, holding the annotation whose file stem matches the frame's.
fn align_masks(image_files: &[PathBuf], masks: Vec<PathBuf>) -> Vec<Option<PathBuf>> {
    let mut by_stem: HashMap<OsString, PathBuf> = masks
        .into_iter()
        .filter_map(|p| Some((p.file_stem()?.to_os_string(), p)))
        .collect();
    image_files
        .iter()
        .map(|frame| frame.file_stem().and_then(|s| by_stem.remove(s)))
        .collect()
}

/// Sorted files with extension `ext` in `dir`; a missing directory yields no files.
fn list_files(dir: &Path, ext: &str) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| VosDatasetError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        })
        .collect();
    files.sort();
    Ok(files)
}
