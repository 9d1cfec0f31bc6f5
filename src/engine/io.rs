// src/engine/io.rs
//
// I/O operations: loading a photo from disk, normalizing it to the square
// canvas, and saving the finished post atomically.

use crate::engine::common::EngineResult;
use crate::engine::decoder::decode_image;
use crate::engine::encoder::encode;
use crate::engine::pixel::flatten_onto_white;
use crate::engine::resize::fit_cover;
use crate::error::PostFxError;
use crate::ops::OutputFormat;
use image::{DynamicImage, RgbImage};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read and decode an image file (EXIF orientation applied).
pub fn load_image(path: impl AsRef<Path>) -> EngineResult<DynamicImage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            PostFxError::file_not_found(path.display().to_string())
        } else {
            PostFxError::file_read_failed(path.display().to_string(), e)
        }
    })?;
    debug!(target: "postfx::io", path = %path.display(), bytes = data.len(), "loaded image file");
    decode_image(&data)
}

/// Square RGB canvas of `size`x`size` from any source image: transparency is
/// flattened onto white, then the image is scaled to cover and center-cropped.
pub fn make_square(img: &DynamicImage, size: u32) -> EngineResult<RgbImage> {
    if size == 0 {
        return Err(PostFxError::invalid_argument(
            "size",
            "0",
            "canvas size must be at least 1",
        ));
    }
    let rgb = if img.color().has_alpha() {
        flatten_onto_white(&img.to_rgba8())
    } else {
        img.to_rgb8()
    };
    Ok(fit_cover(&rgb, size, size)?.into_owned())
}

/// Encode `img` by the extension of `path` (JPEG for `.jpg`/`.jpeg`, PNG
/// otherwise) and write it atomically: the bytes land in a temporary file in
/// the destination directory which is then renamed over `path`.
pub fn save_image(img: &DynamicImage, path: impl AsRef<Path>) -> EngineResult<()> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path);
    let bytes = encode(img, format)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_err = |e: std::io::Error| PostFxError::file_write_failed(path.display().to_string(), e);

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!(
        target: "postfx::io",
        path = %path.display(),
        ?format,
        bytes = bytes.len(),
        "saved image"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CANVAS_SIZE;
    use image::{GenericImageView, Rgb, Rgba, RgbaImage};

    #[test]
    fn test_make_square_landscape() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([10, 20, 30])));
        let square = make_square(&img, 120).unwrap();
        assert_eq!(square.dimensions(), (120, 120));
    }

    #[test]
    fn test_make_square_flattens_transparency_onto_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 0])));
        let square = make_square(&img, 20).unwrap();
        assert!(square.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_make_square_default_canvas() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let square = make_square(&img, CANVAS_SIZE).unwrap();
        assert_eq!(square.dimensions(), (CANVAS_SIZE, CANVAS_SIZE));
    }

    #[test]
    fn test_make_square_rejects_zero() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(
            make_square(&img, 0),
            Err(PostFxError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, PostFxError::FileNotFound { .. }));
    }

    #[test]
    fn test_save_and_load_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb([200, 120, 40])));

        let png_path = dir.path().join("post.png");
        save_image(&img, &png_path).unwrap();
        let png = load_image(&png_path).unwrap();
        assert_eq!(png.to_rgb8(), img.to_rgb8());

        let jpg_path = dir.path().join("post.JPG");
        save_image(&img, &jpg_path).unwrap();
        let bytes = std::fs::read(&jpg_path).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(load_image(&jpg_path).unwrap().dimensions(), (24, 24));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("post.png");
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert!(matches!(
            save_image(&img, &path),
            Err(PostFxError::FileWriteFailed { .. })
        ));
        assert!(!path.exists());
    }
}
