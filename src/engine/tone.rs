// src/engine/tone.rs
//
// Brightness -> contrast -> saturation -> sharpness, in that exact order.
// Each step interpolates between a reference image and the current buffer:
//   brightness: solid black
//   contrast:   solid gray at the rounded mean luma
//   saturation: the grayscale equivalent
//   sharpness:  a 3x3 smoothed copy
// A factor of 1.0 is skipped entirely; negative or NaN factors are no-ops.

use crate::engine::pixel::{blend, clamp_u8, grayscale_rgb, luma, map_pixels};
use crate::ops::AdjustmentParams;
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use std::borrow::Cow;

/// Apply the four tone enhancements sequentially.
pub fn apply_adjustments<'a>(img: &'a RgbImage, params: &AdjustmentParams) -> Cow<'a, RgbImage> {
    let mut current = Cow::Borrowed(img);
    if let Some(f) = effective(params.brightness) {
        current = Cow::Owned(brightness(&current, f));
    }
    if let Some(f) = effective(params.contrast) {
        current = Cow::Owned(contrast(&current, f));
    }
    if let Some(f) = effective(params.saturation) {
        current = Cow::Owned(blend(&grayscale_rgb(&current), &current, f));
    }
    if let Some(f) = effective(params.sharpness) {
        current = Cow::Owned(blend(&smooth(&current), &current, f));
    }
    current
}

fn effective(factor: f32) -> Option<f32> {
    (factor >= 0.0 && factor != 1.0).then_some(factor)
}

fn brightness(img: &RgbImage, factor: f32) -> RgbImage {
    map_pixels(img, |px| px.map(|v| clamp_u8(v as f32 * factor)))
}

/// Mean luma of the whole image, rounded to the nearest integer.
fn mean_luma(img: &RgbImage) -> u8 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0;
    }
    let sum: u64 = img
        .as_raw()
        .par_chunks(3)
        .map(|px| luma(px[0], px[1], px[2]) as u64)
        .sum();
    ((sum as f64 / count as f64) + 0.5) as u8
}

fn contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luma(img);
    let gray = RgbImage::from_pixel(img.width(), img.height(), Rgb([mean; 3]));
    blend(&gray, img, factor)
}

/// 3x3 smoothing kernel [1 1 1; 1 5 1; 1 1 1] / 13. The one-pixel border is
/// copied unchanged.
fn smooth(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return img.clone();
    }
    let src = img.as_raw();
    let stride = width as usize * 3;
    let mut out = src.clone();
    out.par_chunks_mut(stride)
        .enumerate()
        .skip(1)
        .take(height as usize - 2)
        .for_each(|(y, row)| {
            for x in 1..width as usize - 1 {
                for c in 0..3 {
                    let mut sum = 0u32;
                    for dy in 0..3 {
                        let base = (y + dy - 1) * stride;
                        for dx in 0..3 {
                            let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                            sum += src[base + (x + dx - 1) * 3 + c] as u32 * weight;
                        }
                    }
                    row[x * 3 + c] = ((sum as f32 / 13.0).round()) as u8;
                }
            }
        });
    RgbImage::from_raw(width, height, out).unwrap_or_else(|| img.clone())
}
