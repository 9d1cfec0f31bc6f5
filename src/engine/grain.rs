// src/engine/grain.rs
//
// Film grain: a monochrome Gaussian noise field centered on mid-gray,
// softened by a light blur and mixed into the image by `amount`.

use crate::engine::pixel::{blend, clamp_u8, gaussian_blur};
use crate::ops::GrainParams;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::borrow::Cow;

/// Blur sigma that turns single-pixel noise into organic grain.
const GRAIN_SOFTEN_SIGMA: f32 = 0.6;

/// Mixes row indices into distinct per-row seeds.
const ROW_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Spread of the noise field for a given amount: `5 + floor(amount * 180)`.
pub fn grain_sigma(amount: f32) -> f32 {
    5.0 + (amount * 180.0).floor()
}

pub fn apply_grain<'a>(img: &'a RgbImage, params: &GrainParams) -> Cow<'a, RgbImage> {
    if !params.enabled || !(params.amount > 0.0) {
        return Cow::Borrowed(img);
    }
    let seed = params.seed.unwrap_or_else(rand::random);
    let noise = noise_field(img.width(), img.height(), grain_sigma(params.amount), seed);
    let noise = gaussian_blur(&noise, GRAIN_SOFTEN_SIGMA);
    Cow::Owned(blend(img, &noise, params.amount))
}

/// Gray noise `N(128, sigma)` replicated across three channels. Each row owns
/// a generator derived from `seed`, so the field is reproducible and can be
/// filled in parallel.
fn noise_field(width: u32, height: u32, sigma: f32, seed: u64) -> RgbImage {
    let stride = width as usize * 3;
    let mut buf = vec![0u8; stride * height as usize];
    if stride > 0 {
        buf.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            let mut rng =
                StdRng::seed_from_u64(seed ^ (y as u64 + 1).wrapping_mul(ROW_SEED_STRIDE));
            for px in row.chunks_exact_mut(3) {
                let v = clamp_u8(128.0 + sigma * standard_normal(&mut rng));
                px.fill(v);
            }
        });
    }
    RgbImage::from_raw(width, height, buf).unwrap_or_else(|| RgbImage::new(width, height))
}

/// Box-Muller transform.
fn standard_normal<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}
