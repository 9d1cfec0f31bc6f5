// src/engine/resize.rs
//
// Lanczos resampling through fast_image_resize, with the image crate as a
// fallback, plus the uniform scale-then-center-crop used to fit a raster
// onto the square canvas.

use crate::engine::common::EngineResult;
use crate::error::PostFxError;
use fast_image_resize::{self as fir, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbImage};
use std::borrow::Cow;
use tracing::debug;

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Resize an RGB image to exactly `dst_width`x`dst_height` (aspect ratio is
/// not preserved).
pub fn fast_resize(img: &RgbImage, dst_width: u32, dst_height: u32) -> EngineResult<RgbImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(PostFxError::resize_failed(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    match resize_with_fir(img, dst_width, dst_height) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            debug!(target: "postfx::resize", error = %err, "fir resize failed, using image crate");
            let resized = image::imageops::resize(img, dst_width, dst_height, FilterType::Lanczos3);
            if resized.dimensions() != (dst_width, dst_height) {
                return Err(PostFxError::resize_failed(
                    (src_width, src_height),
                    (dst_width, dst_height),
                    format!("{err}; image crate fallback produced wrong dimensions"),
                ));
            }
            Ok(resized)
        }
    }
}

fn resize_with_fir(img: &RgbImage, dst_width: u32, dst_height: u32) -> Result<RgbImage, String> {
    let (src_width, src_height) = img.dimensions();
    let src_image =
        fir::images::Image::from_vec_u8(src_width, src_height, img.as_raw().clone(), PixelType::U8x3)
            .map_err(|e| format!("fir source image error: {e:?}"))?;
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x3);

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    RgbImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| "failed to create rgb image from resized data".to_string())
}

/// Smallest dimensions that cover the target box while keeping the aspect ratio.
fn calc_cover_resize_dimensions(orig_w: u32, orig_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (target_w.max(1), target_h.max(1));
    }
    let scale_w = target_w as f64 / orig_w as f64;
    let scale_h = target_h as f64 / orig_h as f64;
    let scale = scale_w.max(scale_h);
    let resize_w = ((orig_w as f64 * scale).ceil() as u32).max(target_w).max(1);
    let resize_h = ((orig_h as f64 * scale).ceil() as u32).max(target_h).max(1);
    (resize_w, resize_h)
}

fn crop_center(img: &RgbImage, target_w: u32, target_h: u32) -> RgbImage {
    let crop_width = target_w.min(img.width()).max(1);
    let crop_height = target_h.min(img.height()).max(1);
    let crop_x = (img.width() - crop_width) / 2;
    let crop_y = (img.height() - crop_height) / 2;
    image::imageops::crop_imm(img, crop_x, crop_y, crop_width, crop_height).to_image()
}

/// Uniformly scale `img` to cover `width`x`height`, then center-crop the
/// overflow. Borrows the input when it already has the target size.
pub fn fit_cover(img: &RgbImage, width: u32, height: u32) -> EngineResult<Cow<'_, RgbImage>> {
    if img.dimensions() == (width, height) {
        return Ok(Cow::Borrowed(img));
    }
    let (resize_w, resize_h) = calc_cover_resize_dimensions(img.width(), img.height(), width, height);
    debug!(
        target: "postfx::resize",
        from = ?img.dimensions(),
        via = ?(resize_w, resize_h),
        to = ?(width, height),
        "fit cover"
    );
    let resized = fast_resize(img, resize_w, resize_h)?;
    Ok(Cow::Owned(crop_center(&resized, width, height)))
}
