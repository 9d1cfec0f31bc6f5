// src/engine/filters.rs
//
// Named color filter presets built from the pixel primitives.
// Every preset is a per-pixel map with no cross-pixel dependency.

use crate::engine::pixel::{grayscale_rgb, invert, luma, map_pixels, scale_channel};
use crate::ops::FilterKind;
use image::RgbImage;
use std::borrow::Cow;

/// Duotone endpoints of the sepia tone-map (#2b1b0f -> #f2d7b6).
const SEPIA_DARK: [u8; 3] = [0x2b, 0x1b, 0x0f];
const SEPIA_LIGHT: [u8; 3] = [0xf2, 0xd7, 0xb6];

const BOOST: f64 = 1.08;
const DAMP: f64 = 0.94;

/// Apply a filter preset. `Normal` borrows the input without copying.
pub fn apply_filter(img: &RgbImage, kind: FilterKind) -> Cow<'_, RgbImage> {
    match kind {
        FilterKind::Normal => Cow::Borrowed(img),
        FilterKind::Grayscale => Cow::Owned(grayscale_rgb(img)),
        FilterKind::Invert => Cow::Owned(invert(img)),
        FilterKind::Sepia => Cow::Owned(sepia(img)),
        FilterKind::Warm => Cow::Owned(map_pixels(img, |[r, g, b]| {
            [scale_channel(r, BOOST), g, scale_channel(b, DAMP)]
        })),
        FilterKind::Cool => Cow::Owned(map_pixels(img, |[r, g, b]| {
            [scale_channel(r, DAMP), g, scale_channel(b, BOOST)]
        })),
    }
}

/// Lookup table mapping luminance to the duotone color.
fn sepia_lut() -> [[u8; 3]; 256] {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        for c in 0..3 {
            let lo = SEPIA_DARK[c] as i32;
            let hi = SEPIA_LIGHT[c] as i32;
            entry[c] = (lo + i as i32 * (hi - lo) / 255) as u8;
        }
    }
    lut
}

fn sepia(img: &RgbImage) -> RgbImage {
    let lut = sepia_lut();
    map_pixels(img, |[r, g, b]| lut[luma(r, g, b) as usize])
}
