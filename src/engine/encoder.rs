// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg) and PNG (image crate + oxipng).
// JPEG output is RGB only; any alpha is flattened onto opaque white first.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::pixel::flatten_onto_white;
use crate::engine::MAX_DIMENSION;
use crate::error::PostFxError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Lossless oxipng effort; higher presets spend much longer for little gain
/// on photographic content.
const PNG_OPTIMIZE_PRESET: u8 = 2;

/// RGB view of `img`, flattening transparency onto white.
fn opaque_rgb(img: &DynamicImage) -> Cow<'_, RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other if other.color().has_alpha() => Cow::Owned(flatten_onto_white(&other.to_rgba8())),
        other => Cow::Owned(other.to_rgb8()),
    }
}

/// Encode to JPEG using mozjpeg with optimized Huffman coding.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.clamp(1, 100);
        let rgb = opaque_rgb(img);
        let (w, h) = rgb.dimensions();

        if w == 0 || h == 0 {
            return Err(PostFxError::encode_failed(
                "jpeg",
                "invalid image dimensions: width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(PostFxError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                PostFxError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;

            let stride = w as usize * 3;
            for row in rgb.as_raw().chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    PostFxError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                PostFxError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        debug!(target: "postfx::encode", quality, bytes = output.len(), "jpeg encoded");
        Ok(output)
    })
}

/// Encode to PNG using the image crate, then recompress losslessly with oxipng.
pub fn encode_png(img: &DynamicImage) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| PostFxError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let options = oxipng::Options::from_preset(PNG_OPTIMIZE_PRESET);
        match oxipng::optimize_from_memory(&buf, &options) {
            Ok(optimized) if optimized.len() < buf.len() => Ok(optimized),
            Ok(_) => Ok(buf),
            Err(e) => {
                debug!(target: "postfx::encode", error = %e, "oxipng failed, keeping unoptimized png");
                Ok(buf)
            }
        }
    })
}

/// Encode `img` in the requested output format.
pub fn encode(img: &DynamicImage, format: OutputFormat) -> EngineResult<Vec<u8>> {
    match format {
        OutputFormat::Jpeg { quality } => encode_jpeg(img, quality),
        OutputFormat::Png => encode_png(img),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_encode_jpeg_produces_valid_jpeg() {
        let result = encode_jpeg(&create_test_image(100, 100), 95).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
        assert_eq!(&result[result.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_flattens_alpha_onto_white() {
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            16,
            16,
            image::Rgba([0, 0, 0, 0]),
        ));
        let jpeg = encode_jpeg(&transparent, 95).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        let px = decoded.get_pixel(8, 8);
        assert!(px.0.iter().all(|&c| c >= 250), "expected white, got {:?}", px);
    }

    #[test]
    fn test_encode_png_round_trips_exactly() {
        let img = create_test_image(40, 30);
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn test_encode_dispatches_by_format() {
        let img = create_test_image(8, 8);
        let jpeg = encode(&img, OutputFormat::Jpeg { quality: 90 }).unwrap();
        let png = encode(&img, OutputFormat::Png).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_encode_jpeg_rejects_empty_image() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            encode_jpeg(&empty, 95),
            Err(PostFxError::EncodeFailed { .. })
        ));
    }
}
