//! Frame and annotation decoding plus the reference-size resize.

use crate::types::{DatasetResult, VosDatasetError, UNLABELED};
use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn load_frame(path: &Path) -> DatasetResult<RgbImage> {
    let img = image::open(path).map_err(|e| VosDatasetError::corrupt(path, e))?;
    Ok(img.to_rgb8())
}

/// Decode a palette-indexed (or 8-bit grayscale) PNG keeping the raw index values.
pub fn load_raw_mask(path: &Path) -> DatasetResult<GrayImage> {
    let file = File::open(path).map_err(|e| VosDatasetError::corrupt(path, e))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder
        .read_info()
        .map_err(|e| VosDatasetError::corrupt(path, e))?;
    let buffer_size = reader
        .output_buffer_size()
        .ok_or_else(|| VosDatasetError::corrupt(path, "cannot determine PNG buffer size"))?;
    let mut buf = vec![0u8; buffer_size];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| VosDatasetError::corrupt(path, e))?;

    let width = frame.width as usize;
    let height = frame.height as usize;
    let bits = match (frame.color_type, frame.bit_depth) {
        (png::ColorType::Indexed | png::ColorType::Grayscale, png::BitDepth::One) => 1,
        (png::ColorType::Indexed | png::ColorType::Grayscale, png::BitDepth::Two) => 2,
        (png::ColorType::Indexed | png::ColorType::Grayscale, png::BitDepth::Four) => 4,
        (png::ColorType::Indexed | png::ColorType::Grayscale, png::BitDepth::Eight) => 8,
        (color, depth) => {
            return Err(VosDatasetError::corrupt(
                path,
                format!("unsupported mask format {color:?}/{depth:?}"),
            ))
        }
    };

    let mut labels = Vec::with_capacity(width * height);
    for row in buf[..frame.buffer_size()].chunks(frame.line_size).take(height) {
        unpack_row(row, bits, width, &mut labels);
    }
    GrayImage::from_raw(frame.width, frame.height, labels)
        .ok_or_else(|| VosDatasetError::corrupt(path, "truncated mask data"))
}

fn unpack_row(row: &[u8], bits: usize, width: usize, out: &mut Vec<u8>) {
    if bits == 8 {
        out.extend_from_slice(&row[..width]);
        return;
    }
    let per_byte = 8 / bits;
    let mask = ((1u16 << bits) - 1) as u8;
    for x in 0..width {
        let shift = 8 - bits * (x % per_byte + 1);
        out.push((row[x / per_byte] >> shift) & mask);
    }
}

/// Raw mask for a frame. A missing file yields a mask with no recognizable label.
pub fn load_mask_or_unlabeled(
    path: Option<&Path>,
    width: u32,
    height: u32,
) -> DatasetResult<GrayImage> {
    match path {
        Some(p) if p.is_file() => load_raw_mask(p),
        _ => Ok(GrayImage::from_pixel(width, height, Luma([UNLABELED]))),
    }
}

/// Size with the shorter side scaled to `short_side`, aspect preserved (truncating).
pub fn short_side_dims(width: u32, height: u32, short_side: u32) -> (u32, u32) {
    if height < width {
        let w = (width as f64 / height as f64 * short_side as f64) as u32;
        (w.max(1), short_side)
    } else {
        let h = (height as f64 / width as f64 * short_side as f64) as u32;
        (short_side, h.max(1))
    }
}

/// Resize a frame and its raw mask to the same short-side-normalized size.
pub fn resize_pair(
    frame: RgbImage,
    mask: GrayImage,
    short_side: u32,
) -> (RgbImage, GrayImage) {
    let (w, h) = short_side_dims(frame.width(), frame.height(), short_side);
    let frame = if frame.dimensions() == (w, h) {
        frame
    } else {
        image::imageops::resize(&frame, w, h, FilterType::Triangle)
    };
    let mask = if mask.dimensions() == (w, h) {
        mask
    } else {
        image::imageops::resize(&mask, w, h, FilterType::Nearest)
    };
    (frame, mask)
}
