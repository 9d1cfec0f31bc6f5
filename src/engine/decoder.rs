// src/engine/decoder.rs
//
// Decoder operations: JPEG through mozjpeg, everything else (PNG, WebP, BMP)
// through the image crate. Every decode runs under the panic policy and is
// preceded by a header-only dimension check.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{ErrorCategory, PostFxError};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use mozjpeg::Decompress;
use std::io::Cursor;
use tracing::debug;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
fn decode_jpeg_mozjpeg(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PostFxError::decode_failed("mozjpeg: missing JPEG EOI marker"));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            PostFxError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;
        let mut decompress = decompress.rgb().map_err(|e| {
            PostFxError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| PostFxError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| PostFxError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            PostFxError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            PostFxError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;
        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

fn decode_with_image_crate(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data).map_err(|e| PostFxError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PostFxError::dimension_exceeds_limit(width.max(height), MAX_DIMENSION));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PostFxError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
fn ensure_dimensions_safe(bytes: &[u8]) -> EngineResult<()> {
    if let Ok(reader) = ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // exif crate can represent as Short/Long; use get_uint for safety
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}

/// Rotate/flip so the pixels are upright for the given EXIF orientation.
fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Unified decode entrypoint:
/// - Reject empty input and oversized headers
/// - Route JPEG to mozjpeg (falling back to the image crate), others to the image crate
/// - Normalize EXIF orientation
pub fn decode_image(bytes: &[u8]) -> EngineResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(PostFxError::decode_failed("empty input"));
    }
    let detected = detect_format(bytes);
    match detected {
        Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp) => {}
        Some(other) => {
            return Err(PostFxError::unsupported_format(format!("{other:?}").to_lowercase()));
        }
        None => return Err(PostFxError::decode_failed("unrecognized image data")),
    }
    ensure_dimensions_safe(bytes)?;

    let img = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes).or_else(|err| {
            if err.category() == ErrorCategory::ResourceLimit {
                return Err(err);
            }
            debug!(target: "postfx::decode", error = %err, "mozjpeg failed, retrying with image crate");
            decode_with_image_crate(bytes)
        })?,
        _ => decode_with_image_crate(bytes)?,
    };

    match detect_exif_orientation(bytes) {
        Some(orientation) if orientation != 1 => {
            debug!(target: "postfx::decode", orientation, "applying exif orientation");
            Ok(apply_orientation(img, orientation))
        }
        _ => Ok(img),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn encode_as(img: RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), format)
            .unwrap();
        buffer
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        encode_as(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])), ImageFormat::Png)
    }

    #[test]
    fn test_check_dimensions_limits() {
        assert!(check_dimensions(1080, 1080).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(PostFxError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000),
            Err(PostFxError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_header() {
        let data = encode_png(MAX_DIMENSION + 1, 1);
        let err = decode_image(&data).unwrap_err();
        assert!(matches!(err, PostFxError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn test_detect_format_jpeg_and_png() {
        let png = encode_png(2, 2);
        let jpeg = encode_as(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])), ImageFormat::Jpeg);
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn test_decode_png_and_bmp() {
        let png = decode_image(&encode_png(3, 2)).unwrap();
        assert_eq!(png.dimensions(), (3, 2));
        let bmp = decode_image(&encode_as(RgbImage::new(5, 4), ImageFormat::Bmp)).unwrap();
        assert_eq!(bmp.dimensions(), (5, 4));
    }

    #[test]
    fn test_decode_jpeg_through_mozjpeg() {
        let jpeg = encode_as(RgbImage::from_pixel(16, 8, Rgb([200, 50, 50])), ImageFormat::Jpeg);
        let img = decode_image(&jpeg).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
        let px = img.to_rgb8().get_pixel(8, 4).0;
        assert!(px[0] > 150 && px[1] < 100);
    }

    #[test]
    fn test_decode_rejects_garbage_and_empty() {
        assert!(matches!(decode_image(&[]), Err(PostFxError::DecodeFailed { .. })));
        assert!(matches!(
            decode_image(b"definitely not pixels"),
            Err(PostFxError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_png_fails() {
        let png = encode_png(32, 32);
        let truncated = &png[..png.len() / 2];
        assert!(decode_image(truncated).is_err());
    }

    #[test]
    fn test_orientation_missing_for_plain_png() {
        assert_eq!(detect_exif_orientation(&encode_png(2, 2)), None);
    }

    #[test]
    fn test_apply_orientation_rotates() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        assert_eq!(apply_orientation(img.clone(), 6).dimensions(), (2, 4));
        assert_eq!(apply_orientation(img.clone(), 3).dimensions(), (4, 2));
        assert_eq!(apply_orientation(img, 1).dimensions(), (4, 2));
    }

    #[test]
    fn test_apply_orientation_flips_horizontally() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        let flipped = apply_orientation(DynamicImage::ImageRgb8(rgb), 2).to_rgb8();
        assert_eq!(flipped.get_pixel(1, 0).0, [255, 0, 0]);
    }
}
