// src/engine/text.rs
//
// Text placement and the shadow + glyph compositor.
//
// Layer stacking inside the transparent text layer, bottom to top:
//   underline overlay -> blurred drop shadow -> glyph run
// The assembled layer is then composited onto the RGB base.

use crate::engine::font::GlyphSource;
use crate::engine::pixel::{alpha_composite, composite_onto_rgb, gaussian_blur, transparent};
use crate::ops::{TextBBox, TextParams, TextPosition};
use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Distance from the top or bottom canvas edge for the edge-anchored positions.
pub const TEXT_MARGIN: i32 = 70;

const SHADOW_OFFSET: i32 = 2;
const SHADOW_ALPHA: u8 = 140;
const SHADOW_BLUR_SIGMA: f32 = 2.0;

/// Measure `text` with `font` and anchor it on a `canvas` of (width, height).
///
/// Horizontally the run is always centered. Vertically:
/// - `TopCenter` puts the top edge at `TEXT_MARGIN`
/// - `MiddleCenter` centers it
/// - `BottomCenter` leaves `TEXT_MARGIN` below the bottom edge
///
/// Oversized text yields negative coordinates rather than being clamped.
pub fn measure_and_place(
    text: &str,
    font: &dyn GlyphSource,
    position: TextPosition,
    canvas: (u32, u32),
) -> TextBBox {
    let (tw, th) = font.measure(text);
    let (w, h) = (canvas.0 as i32, canvas.1 as i32);
    let x = (w - tw as i32).div_euclid(2);
    let y = match position {
        TextPosition::TopCenter => TEXT_MARGIN,
        TextPosition::MiddleCenter => (h - th as i32).div_euclid(2),
        TextPosition::BottomCenter => h - TEXT_MARGIN - th as i32,
    };
    TextBBox::new(x, y, tw, th)
}

/// Straight-alpha layer of a single color whose alpha is the mask coverage
/// scaled by `opacity`.
fn tinted_layer(mask: &GrayImage, color: Rgb<u8>, opacity: u8) -> RgbaImage {
    let [r, g, b] = color.0;
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let coverage = mask.get_pixel(x, y)[0] as u32;
        if coverage == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let a = (coverage * opacity as u32 + 127) / 255;
        Rgba([r, g, b, a as u8])
    })
}

/// Render `params.text` at `bbox` over `img`, with a soft drop shadow and an
/// optional underline overlay beneath both.
///
/// Borrows the input when text is disabled or blank.
pub fn apply_text<'a>(
    img: &'a RgbImage,
    params: &TextParams,
    font: &dyn GlyphSource,
    bbox: TextBBox,
    underline: Option<&RgbaImage>,
) -> Cow<'a, RgbImage> {
    let Some(text) = params.visible_text() else {
        return Cow::Borrowed(img);
    };
    let (width, height) = img.dimensions();
    let mut layer = transparent(width, height);

    if let Some(overlay) = underline {
        if overlay.dimensions() == (width, height) {
            layer = alpha_composite(&layer, overlay);
        } else {
            warn!(
                target: "postfx::text",
                overlay = ?overlay.dimensions(),
                canvas = ?(width, height),
                "underline overlay size mismatch, skipping"
            );
        }
    }

    let mut shadow_mask = GrayImage::new(width, height);
    font.draw(&mut shadow_mask, bbox.x + SHADOW_OFFSET, bbox.y + SHADOW_OFFSET, text);
    let shadow = gaussian_blur(
        &tinted_layer(&shadow_mask, Rgb([0, 0, 0]), SHADOW_ALPHA),
        SHADOW_BLUR_SIGMA,
    );
    layer = alpha_composite(&layer, &shadow);

    let mut glyph_mask = GrayImage::new(width, height);
    font.draw(&mut glyph_mask, bbox.x, bbox.y, text);
    layer = alpha_composite(&layer, &tinted_layer(&glyph_mask, params.color, 255));

    debug!(
        target: "postfx::text",
        chars = text.chars().count(),
        x = bbox.x,
        y = bbox.y,
        width = bbox.width,
        height = bbox.height,
        underline = underline.is_some(),
        "text composited"
    );
    Cow::Owned(composite_onto_rgb(img, &layer))
}
