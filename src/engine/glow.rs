// src/engine/glow.rs
//
// Soft bloom: blur a copy, screen it over the original, then mix the
// screened result back in by `strength`.

use crate::engine::pixel::{blend, gaussian_blur, screen};
use crate::ops::GlowParams;
use image::RgbImage;
use std::borrow::Cow;

pub fn apply_glow<'a>(img: &'a RgbImage, params: &GlowParams) -> Cow<'a, RgbImage> {
    if !params.enabled || !(params.strength > 0.0) || !(params.radius > 0.0) {
        return Cow::Borrowed(img);
    }
    let blurred = gaussian_blur(img, params.radius);
    let screened = screen(img, &blurred);
    Cow::Owned(blend(img, &screened, params.strength))
}
