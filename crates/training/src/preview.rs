//! Frame / mask overlay rendering for eyeballing samples.

use image::{Rgb, RgbImage};
use vos_dataset::{TrainingSample, TRIPLET_LEN};

/// Color of compact id `id` in the DAVIS annotation palette.
pub fn palette_color(id: u8) -> [u8; 3] {
    let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
    let mut c = id;
    for j in 0..8 {
        r |= (c & 1) << (7 - j);
        g |= ((c >> 1) & 1) << (7 - j);
        b |= ((c >> 2) & 1) << (7 - j);
        c >>= 3;
        if c == 0 {
            break;
        }
    }
    [r, g, b]
}

/// Frame `t` of a sample as an RGB image.
pub fn frame_image(sample: &TrainingSample, t: usize) -> RgbImage {
    let (w, h) = (sample.width, sample.height);
    let hw = w as usize * h as usize;
    RgbImage::from_fn(w, h, |x, y| {
        let base = y as usize * w as usize + x as usize;
        let channel =
            |c: usize| (sample.frames[(c * TRIPLET_LEN + t) * hw + base] * 255.0).round() as u8;
        Rgb([channel(0), channel(1), channel(2)])
    })
}

/// Frames on the top row, frames tinted by their decoded masks below.
pub fn render_preview(sample: &TrainingSample, alpha: f32) -> RgbImage {
    let (w, h) = (sample.width, sample.height);
    let alpha = alpha.clamp(0.0, 1.0);
    let mut canvas = RgbImage::new(w * TRIPLET_LEN as u32, h * 2);
    for t in 0..TRIPLET_LEN {
        let frame = frame_image(sample, t);
        let labels = sample.masks.decode_frame(t);
        let x0 = t as u32 * w;
        for (x, y, px) in frame.enumerate_pixels() {
            canvas.put_pixel(x0 + x, y, *px);
            let id = labels.get(x, y);
            let shaded = if id == 0 {
                *px
            } else {
                let color = palette_color(id);
                Rgb(std::array::from_fn(|c| {
                    (px[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8
                }))
            };
            canvas.put_pixel(x0 + x, h + y, shaded);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_matches_davis_colors() {
        assert_eq!(palette_color(0), [0, 0, 0]);
        assert_eq!(palette_color(1), [128, 0, 0]);
        assert_eq!(palette_color(2), [0, 128, 0]);
        assert_eq!(palette_color(3), [128, 128, 0]);
        assert_eq!(palette_color(4), [0, 0, 128]);
        assert_eq!(palette_color(8), [64, 0, 0]);
    }
}
