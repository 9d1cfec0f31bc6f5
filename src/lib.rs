// lib.rs
//
// postfx: square photo post compositor
//
// A source photo is normalized into a 1080x1080 canvas, then run through a
// fixed effects chain:
// - color filter preset
// - brightness / contrast / saturation / sharpness
// - soft glow and film grain
// - text with drop shadow and a hand-drawn underline

pub mod engine;
pub mod error;
pub mod ops;

use error::PostFxError;
use image::ImageReader;
use std::io::Cursor;

pub use engine::{Pipeline, Stage, UnderlineCache};
pub use ops::{
    AdjustmentParams, FilterKind, GlowParams, GrainParams, OutputFormat, PipelineConfig,
    TextBBox, TextParams, TextPosition, UnderlineParams,
};

/// Header-level facts about an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

/// Read dimensions and format without decoding pixels.
pub fn inspect_header(bytes: &[u8]) -> Result<InspectMetadata, PostFxError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PostFxError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().map(|f| format!("{:?}", f).to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| PostFxError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Input formats accepted by [`engine::decode_image`].
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpeg", "jpg", "png", "webp", "bmp"]
}

/// Output formats produced by [`engine::encode`].
pub fn supported_output_formats() -> &'static [&'static str] {
    &["jpeg", "jpg", "png"]
}
