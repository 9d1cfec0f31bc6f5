// src/engine.rs
//
// The core of postfx. A fixed-order effects pipeline that:
// 1. Normalizes any decoded photo into a square RGB canvas
// 2. Runs filter -> tone -> glow -> grain -> text/underline as pure stages
// 3. Encodes the finished raster as PNG or JPEG
//
// This file is a facade that delegates to the decomposed modules in engine/

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Edge length of the square post canvas.
pub const CANVAS_SIZE: u32 = 1080;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod encoder;
mod filters;
mod font;
mod glow;
mod grain;
mod io;
mod pipeline;
mod pixel;
mod resize;
mod text;
mod tone;
mod underline;

pub use common::{run_with_panic_policy, EngineResult};
pub use decoder::{check_dimensions, decode_image, detect_exif_orientation, detect_format};
pub use encoder::{encode, encode_jpeg, encode_png};
pub use filters::apply_filter;
pub use font::{
    load_font, load_font_from, BuiltinFont, FontSource, GlyphSource, TrueTypeFont, FONT_CANDIDATES,
    FONT_ENV_VAR,
};
pub use glow::apply_glow;
pub use grain::{apply_grain, grain_sigma};
pub use io::{load_image, make_square, save_image};
pub use pipeline::{Pipeline, Stage};
pub use pixel::{
    alpha_composite, blend, composite_onto_rgb, flatten_onto_white, gaussian_blur, grayscale_rgb,
    invert, luma, screen,
};
pub use resize::{fast_resize, fit_cover};
pub use text::{apply_text, measure_and_place, TEXT_MARGIN};
pub use tone::apply_adjustments;
pub use underline::{
    canvas_to_center, center_to_canvas, chroma_key_overlay, generate_underline, sample_curve,
    straight_underline, underline_geometry, underline_overlay, CurveBackend, PenCanvas,
    UnderlineCache, UnderlineGeometry, UnderlineKey, CHROMA_GREEN,
};
