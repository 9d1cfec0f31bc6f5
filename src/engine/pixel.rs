// src/engine/pixel.rs
//
// Elementary per-channel and per-pixel transforms shared by every stage.
// All functions are total: they never fail for a well-formed buffer and
// always return a new image of the same dimensions.

use image::{ImageBuffer, Luma, Pixel, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;

/// ITU-R 601-2 luma with 16-bit fixed-point weights, rounded.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

#[inline]
pub(crate) fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Apply `f` to every RGB pixel, one rayon task per row.
pub(crate) fn map_pixels<F>(img: &RgbImage, f: F) -> RgbImage
where
    F: Fn([u8; 3]) -> [u8; 3] + Sync,
{
    let (width, height) = img.dimensions();
    let mut out = img.as_raw().clone();
    let stride = width as usize * 3;
    if stride > 0 {
        out.par_chunks_mut(stride).for_each(|row| {
            for px in row.chunks_exact_mut(3) {
                let mapped = f([px[0], px[1], px[2]]);
                px.copy_from_slice(&mapped);
            }
        });
    }
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| RgbImage::new(width, height))
}

/// Combine two same-sized RGB images pixel by pixel.
pub(crate) fn zip_pixels<F>(a: &RgbImage, b: &RgbImage, f: F) -> RgbImage
where
    F: Fn([u8; 3], [u8; 3]) -> [u8; 3] + Sync,
{
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (width, height) = a.dimensions();
    let mut out = a.as_raw().clone();
    let stride = width as usize * 3;
    if stride > 0 {
        out.par_chunks_mut(stride)
            .zip(b.as_raw().par_chunks(stride))
            .for_each(|(row, other)| {
                for (px, o) in row.chunks_exact_mut(3).zip(other.chunks_exact(3)) {
                    let mixed = f([px[0], px[1], px[2]], [o[0], o[1], o[2]]);
                    px.copy_from_slice(&mixed);
                }
            });
    }
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| RgbImage::new(width, height))
}

/// Desaturate, keeping three identical channels.
pub fn grayscale_rgb(img: &RgbImage) -> RgbImage {
    map_pixels(img, |[r, g, b]| {
        let l = luma(r, g, b);
        [l, l, l]
    })
}

/// 255 - v on every channel.
pub fn invert(img: &RgbImage) -> RgbImage {
    map_pixels(img, |[r, g, b]| [255 - r, 255 - g, 255 - b])
}

/// Multiply one channel by `factor`, truncating and saturating at [0, 255].
#[inline]
pub(crate) fn scale_channel(v: u8, factor: f64) -> u8 {
    (v as f64 * factor).clamp(0.0, 255.0) as u8
}

/// Linear interpolation `a + alpha * (b - a)`. `alpha` outside [0, 1]
/// extrapolates; results saturate.
pub fn blend(a: &RgbImage, b: &RgbImage, alpha: f32) -> RgbImage {
    zip_pixels(a, b, |pa, pb| {
        let mut out = [0u8; 3];
        for c in 0..3 {
            let (x, y) = (pa[c] as f32, pb[c] as f32);
            out[c] = clamp_u8(x + alpha * (y - x));
        }
        out
    })
}

/// Screen blend: `255 - (255 - a)(255 - b) / 255` per channel.
pub fn screen(a: &RgbImage, b: &RgbImage) -> RgbImage {
    zip_pixels(a, b, |pa, pb| {
        let mut out = [0u8; 3];
        for c in 0..3 {
            let inv = (255 - pa[c] as u32) * (255 - pb[c] as u32) / 255;
            out[c] = (255 - inv) as u8;
        }
        out
    })
}

/// Gaussian blur with standard deviation `sigma`, edges clamped. A
/// non-positive or NaN sigma returns an unmodified copy.
///
/// Each channel is blurred as an `f32` plane and rounded once at the end.
/// Sigma is capped at the longer image edge: past that, clamped-edge taps
/// only repeat border pixels.
pub fn gaussian_blur<P>(img: &ImageBuffer<P, Vec<u8>>, sigma: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    if !(sigma > 0.0) || width == 0 || height == 0 {
        return img.clone();
    }
    let sigma = sigma.min(width.max(height) as f32);
    let channels = P::CHANNEL_COUNT as usize;
    let src = img.as_raw();

    let planes: Vec<ImageBuffer<Luma<f32>, Vec<f32>>> = (0..channels)
        .into_par_iter()
        .map(|c| {
            let samples = src.iter().skip(c).step_by(channels).map(|&v| v as f32).collect();
            let plane: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(width, height, samples)
                .unwrap_or_else(|| ImageBuffer::new(width, height));
            gaussian_blur_f32(&plane, sigma)
        })
        .collect();

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(channels).enumerate().for_each(|(i, px)| {
        for (dst, plane) in px.iter_mut().zip(&planes) {
            *dst = clamp_u8(plane.as_raw()[i]);
        }
    });
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| img.clone())
}

/// Porter-Duff "over" on straight (non-premultiplied) alpha: `src` over `dst`.
/// Fully transparent source pixels leave the destination untouched.
pub fn alpha_composite(dst: &RgbaImage, src: &RgbaImage) -> RgbaImage {
    debug_assert_eq!(dst.dimensions(), src.dimensions());
    let (width, height) = dst.dimensions();
    let stride = width as usize * 4;
    let mut out = dst.as_raw().clone();
    if stride > 0 {
        out.par_chunks_mut(stride)
            .zip(src.as_raw().par_chunks(stride))
            .for_each(|(row, src_row)| {
                for (d, s) in row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                    let sa = s[3] as f32 / 255.0;
                    if s[3] == 0 {
                        continue;
                    }
                    if s[3] == 255 {
                        d.copy_from_slice(s);
                        continue;
                    }
                    let da = d[3] as f32 / 255.0;
                    let out_a = sa + da * (1.0 - sa);
                    for c in 0..3 {
                        let v = (s[c] as f32 * sa + d[c] as f32 * da * (1.0 - sa)) / out_a;
                        d[c] = clamp_u8(v);
                    }
                    d[3] = clamp_u8(out_a * 255.0);
                }
            });
    }
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| dst.clone())
}

/// Composite a straight-alpha layer onto an opaque RGB base; the result has
/// no alpha channel.
pub fn composite_onto_rgb(base: &RgbImage, layer: &RgbaImage) -> RgbImage {
    debug_assert_eq!(base.dimensions(), layer.dimensions());
    let (width, height) = base.dimensions();
    let mut out = base.as_raw().clone();
    let stride = width as usize * 3;
    let layer_stride = width as usize * 4;
    if stride > 0 {
        out.par_chunks_mut(stride)
            .zip(layer.as_raw().par_chunks(layer_stride))
            .for_each(|(row, layer_row)| {
                for (d, s) in row.chunks_exact_mut(3).zip(layer_row.chunks_exact(4)) {
                    match s[3] {
                        0 => {}
                        255 => d.copy_from_slice(&s[..3]),
                        a => {
                            let a = a as f32 / 255.0;
                            for c in 0..3 {
                                d[c] = clamp_u8(s[c] as f32 * a + d[c] as f32 * (1.0 - a));
                            }
                        }
                    }
                }
            });
    }
    ImageBuffer::from_raw(width, height, out).unwrap_or_else(|| base.clone())
}

/// Flatten transparency onto opaque white.
pub fn flatten_onto_white(img: &RgbaImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let white = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    composite_onto_rgb(&white, img)
}

/// Opaque RGBA copy of an RGB image.
pub(crate) fn to_rgba(img: &RgbImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    RgbaImage::from_fn(width, height, |x, y| img.get_pixel(x, y).to_rgba())
}

/// Fully transparent RGBA canvas.
pub(crate) fn transparent(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_luma_matches_reference_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_grayscale_keeps_three_equal_channels() {
        let gray = grayscale_rgb(&gradient(8, 8));
        for px in gray.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let img = gradient(16, 9);
        assert_eq!(invert(&invert(&img)), img);
    }

    #[test]
    fn test_screen_lightens() {
        let a = RgbImage::from_pixel(1, 1, Rgb([100, 0, 255]));
        let b = RgbImage::from_pixel(1, 1, Rgb([100, 50, 0]));
        let out = screen(&a, &b);
        // 255 - 155*155/255 = 255 - 94 = 161
        assert_eq!(out.get_pixel(0, 0).0, [161, 50, 255]);
    }

    #[test]
    fn test_blend_endpoints() {
        let a = gradient(4, 4);
        let b = invert(&a);
        assert_eq!(blend(&a, &b, 0.0), a);
        assert_eq!(blend(&a, &b, 1.0), b);
    }

    #[test]
    fn test_blend_extrapolates_and_saturates() {
        let a = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        let b = RgbImage::from_pixel(1, 1, Rgb([200, 50, 100]));
        assert_eq!(blend(&a, &b, 2.0).get_pixel(0, 0).0, [255, 0, 100]);
    }

    #[test]
    fn test_blur_of_flat_image_is_flat() {
        let img = RgbImage::from_pixel(12, 7, Rgb([40, 80, 120]));
        assert_eq!(gaussian_blur(&img, 3.0), img);
    }

    #[test]
    fn test_blur_non_positive_sigma_is_copy() {
        let img = gradient(5, 5);
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(gaussian_blur(&img, -1.0), img);
        assert_eq!(gaussian_blur(&img, f32::NAN), img);
    }

    #[test]
    fn test_blur_spreads_single_pixel() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([0, 0, 0, 0]));
        img.put_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let out = gaussian_blur(&img, 1.0);
        assert!(out.get_pixel(4, 4)[3] < 255);
        assert!(out.get_pixel(5, 4)[3] > 0);
        assert_eq!(out.dimensions(), (9, 9));
    }

    #[test]
    fn test_alpha_composite_transparent_source_is_noop() {
        let dst = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 5, 200]));
        let src = transparent(4, 4);
        assert_eq!(alpha_composite(&dst, &src), dst);
    }

    #[test]
    fn test_alpha_composite_partial_over_transparent_keeps_color() {
        let dst = transparent(1, 1);
        let src = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 140]));
        let out = alpha_composite(&dst, &src);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 140]);
    }

    #[test]
    fn test_alpha_composite_half_over_opaque() {
        let dst = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let out = alpha_composite(&dst, &src);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
        assert!((out.get_pixel(0, 0)[0] as i32 - 127).abs() <= 1);
    }

    #[test]
    fn test_flatten_onto_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_blur_huge_sigma_on_small_image() {
        let img = gradient(64, 64);
        for sigma in [20_000.0, 1.0e9, f32::INFINITY] {
            let out = gaussian_blur(&img, sigma);
            assert_eq!(out.dimensions(), (64, 64));
            // Capped sigma still averages toward the image mean.
            let spread = |im: &RgbImage| {
                let (lo, hi) = im
                    .pixels()
                    .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
                hi - lo
            };
            assert!(spread(&out) < spread(&img));
        }
    }

    #[test]
    fn test_blur_keeps_channels_apart() {
        let img = RgbImage::from_pixel(6, 6, Rgb([200, 0, 90]));
        assert_eq!(gaussian_blur(&img, 2.5), img);
    }

    #[test]
    fn test_zero_sized_images_do_not_panic() {
        let empty = RgbImage::new(0, 0);
        assert_eq!(invert(&empty).dimensions(), (0, 0));
        assert_eq!(blend(&empty, &empty, 0.5).dimensions(), (0, 0));
        assert_eq!(gaussian_blur(&empty, 2.0).dimensions(), (0, 0));
    }
}
