// src/engine/underline.rs
//
// Hand-drawn underline beneath a text run.
//
// 1. Sample a seeded wobble curve in raster coordinates (top-left, y down)
// 2. Convert the path to center-origin, y-up coordinates and stroke it with
//    a pen-style backend onto an opaque chroma-green canvas
// 3. Fit the canvas to the target size and key out the chroma color
//
// Any backend failure degrades to a straight raster line of the same color,
// thickness and span.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::pixel::transparent;
use crate::engine::resize::fit_cover;
use crate::error::PostFxError;
use crate::ops::{TextBBox, UnderlineParams};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reserved background color keyed out of the rendered canvas.
pub const CHROMA_GREEN: Rgb<u8> = Rgb([0, 255, 0]);

const STEPS: u32 = 80;
const FREQUENCIES: [f64; 3] = [1.5, 2.0, 2.5];
const MIN_PAD: i32 = 24;
const PAD_RATIO: f64 = 0.06;
const BASELINE_GAP: i32 = 18;
const BASE_AMPLITUDE: f64 = 6.0;
const MAX_AMPLITUDE_BOOST: u32 = 16;
const JITTER_RATIO: f64 = 0.35;

/// Serializes curve rendering process-wide; backends are not assumed to be
/// safe for concurrent use.
static RENDER_LOCK: Mutex<()> = Mutex::new(());

/// Raster (top-left, y down) to center-origin (y up).
pub fn canvas_to_center(px: f64, py: f64, width: u32, height: u32) -> (f64, f64) {
    (px - width as f64 / 2.0, height as f64 / 2.0 - py)
}

/// Center-origin (y up) to raster (top-left, y down).
pub fn center_to_canvas(tx: f64, ty: f64, width: u32, height: u32) -> (f64, f64) {
    (tx + width as f64 / 2.0, height as f64 / 2.0 - ty)
}

/// Horizontal span and baseline of the underline for one text run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnderlineGeometry {
    pub x0: i32,
    pub x1: i32,
    pub base_y: i32,
}

/// Pad the text run by `max(24, 6% of its width)` on both sides and drop the
/// baseline 18px below its bottom edge.
pub fn underline_geometry(bbox: &TextBBox) -> UnderlineGeometry {
    let pad = MIN_PAD.max((bbox.width as f64 * PAD_RATIO) as i32);
    UnderlineGeometry {
        x0: bbox.x - pad,
        x1: bbox.x + bbox.width as i32 + pad,
        base_y: bbox.y + bbox.height as i32 + BASELINE_GAP,
    }
}

/// Sample the wobble curve: `STEPS + 1` raster points from `x0` to `x1`.
///
/// A single generator seeded from `seed` first picks the sine frequency and
/// then yields one jitter value per sample, so identical inputs always give
/// identical points.
pub fn sample_curve(geometry: &UnderlineGeometry, thickness: u32, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let amplitude = BASE_AMPLITUDE + thickness.min(MAX_AMPLITUDE_BOOST) as f64;
    let freq = FREQUENCIES[rng.gen_range(0..FREQUENCIES.len())];
    let jitter = amplitude * JITTER_RATIO;
    let span = (geometry.x1 - geometry.x0) as f64;

    (0..=STEPS)
        .map(|i| {
            let t = i as f64 / STEPS as f64;
            let mut wobble = (t * std::f64::consts::PI * 2.0 * freq).sin() * amplitude;
            wobble += rng.gen_range(-jitter..=jitter);
            (geometry.x0 as f64 + span * t, geometry.base_y as f64 + wobble)
        })
        .collect()
}

/// Strokes a center-origin, y-up polyline onto an opaque canvas.
pub trait CurveBackend: Send + Sync {
    /// The pen lifts to `path[0]`, then draws through every following point.
    /// The returned canvas is `size` pixels, filled with `background` except
    /// under the stroke.
    fn render(
        &self,
        path: &[(f64, f64)],
        color: Rgb<u8>,
        thickness: u32,
        size: (u32, u32),
        background: Rgb<u8>,
    ) -> EngineResult<RgbImage>;
}

/// In-process pen rasterizer with a center origin and y pointing up.
///
/// Strokes are stamped as solid discs without anti-aliasing, so the canvas
/// only ever holds the background and the stroke color.
#[derive(Clone, Copy, Debug, Default)]
pub struct PenCanvas;

struct Pen<'a> {
    canvas: &'a mut RgbImage,
    color: Rgb<u8>,
    footprint: Vec<(i32, i32)>,
    at: (f64, f64),
    down: bool,
}

/// Pixel offsets of a round nib exactly `thickness` pixels across. Offsets run
/// from `-(thickness - 1) / 2`, the same rows the straight fallback covers.
fn nib(thickness: u32) -> Vec<(i32, i32)> {
    let t = thickness.max(1) as i32;
    let start = -(t - 1) / 2;
    let center = (t - 1) as f64 / 2.0;
    let reach_sq = (t as f64 / 2.0).powi(2);
    let mut offsets = Vec::new();
    for j in 0..t {
        for i in 0..t {
            let (dx, dy) = (i as f64 - center, j as f64 - center);
            if dx * dx + dy * dy <= reach_sq {
                offsets.push((start + i, start + j));
            }
        }
    }
    offsets
}

impl Pen<'_> {
    fn stamp(&mut self, tx: f64, ty: f64) {
        let (w, h) = self.canvas.dimensions();
        let (px, py) = center_to_canvas(tx, ty, w, h);
        let (cx, cy) = (px.round() as i64, py.round() as i64);
        for &(dx, dy) in &self.footprint {
            let (x, y) = (cx + dx as i64, cy + dy as i64);
            if (0..w as i64).contains(&x) && (0..h as i64).contains(&y) {
                self.canvas.put_pixel(x as u32, y as u32, self.color);
            }
        }
    }

    fn goto(&mut self, tx: f64, ty: f64) {
        if self.down {
            let (fx, fy) = self.at;
            let length = (tx - fx).hypot(ty - fy);
            let steps = length.ceil().max(1.0) as u32;
            for s in 0..=steps {
                let t = s as f64 / steps as f64;
                self.stamp(fx + (tx - fx) * t, fy + (ty - fy) * t);
            }
        }
        self.at = (tx, ty);
    }
}

impl CurveBackend for PenCanvas {
    fn render(
        &self,
        path: &[(f64, f64)],
        color: Rgb<u8>,
        thickness: u32,
        size: (u32, u32),
        background: Rgb<u8>,
    ) -> EngineResult<RgbImage> {
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(PostFxError::curve_render_unavailable(format!(
                "cannot create a {width}x{height} drawing surface"
            )));
        }
        let Some((&(sx, sy), rest)) = path.split_first() else {
            return Err(PostFxError::curve_render_unavailable("empty stroke path"));
        };

        let mut canvas = RgbImage::from_pixel(width, height, background);
        let mut pen = Pen {
            canvas: &mut canvas,
            color: distinct_from(color, background),
            footprint: nib(thickness),
            at: (sx, sy),
            down: false,
        };
        pen.goto(sx, sy);
        pen.down = true;
        for &(tx, ty) in rest {
            pen.goto(tx, ty);
        }
        Ok(canvas)
    }
}

/// A stroke in the background color would vanish when keyed out; nudge it.
fn distinct_from(color: Rgb<u8>, background: Rgb<u8>) -> Rgb<u8> {
    if color != background {
        return color;
    }
    let [r, g, b] = color.0;
    Rgb([r, if g == 0 { 1 } else { g - 1 }, b])
}

/// Map every chroma-green pixel to transparent and every other pixel to
/// opaque at its own color.
pub fn chroma_key_overlay(canvas: &RgbImage) -> RgbaImage {
    RgbaImage::from_fn(canvas.width(), canvas.height(), |x, y| {
        let px = *canvas.get_pixel(x, y);
        if px == CHROMA_GREEN {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([px[0], px[1], px[2], 255])
        }
    })
}

/// Run the full procedural path: sample, convert, stroke, fit, key.
pub fn generate_underline(
    backend: &dyn CurveBackend,
    size: (u32, u32),
    bbox: &TextBBox,
    params: &UnderlineParams,
) -> EngineResult<RgbaImage> {
    let (width, height) = size;
    let geometry = underline_geometry(bbox);
    let anchor = canvas_to_center(geometry.x0 as f64, geometry.base_y as f64, width, height);
    let path: Vec<(f64, f64)> = std::iter::once(anchor)
        .chain(
            sample_curve(&geometry, params.thickness, params.seed)
                .into_iter()
                .map(|(px, py)| canvas_to_center(px, py, width, height)),
        )
        .collect();

    let rendered = {
        let _guard = RENDER_LOCK.lock();
        backend.render(&path, params.color, params.thickness, size, CHROMA_GREEN)?
    };
    let fitted = fit_cover(&rendered, width, height)?;
    Ok(chroma_key_overlay(&fitted))
}

/// Degraded underline: a flat line of `thickness` rows centered on
/// `base_y`, spanning `x0..=x1`. Pure rasterization, never fails.
pub fn straight_underline(
    size: (u32, u32),
    geometry: &UnderlineGeometry,
    color: Rgb<u8>,
    thickness: u32,
) -> RgbaImage {
    let (width, height) = size;
    let mut overlay = transparent(width, height);
    let thickness = thickness.max(1) as i64;
    let top = geometry.base_y as i64 - (thickness - 1) / 2;
    let stroke = Rgba([color[0], color[1], color[2], 255]);

    let rows = top.max(0)..(top + thickness).min(height as i64);
    let cols = (geometry.x0 as i64).max(0)..(geometry.x1 as i64 + 1).min(width as i64);
    for y in rows {
        for x in cols.clone() {
            overlay.put_pixel(x as u32, y as u32, stroke);
        }
    }
    overlay
}

/// Procedural underline with the straight-line fallback. `None` for the
/// backend means no procedural renderer is available.
pub fn underline_overlay(
    backend: Option<&dyn CurveBackend>,
    size: (u32, u32),
    bbox: &TextBBox,
    params: &UnderlineParams,
) -> RgbaImage {
    let result = match backend {
        Some(backend) => run_with_panic_policy("underline", || {
            generate_underline(backend, size, bbox, params)
        }),
        None => Err(PostFxError::curve_render_unavailable("no curve backend configured")),
    };
    match result {
        Ok(overlay) => {
            debug!(target: "postfx::underline", seed = params.seed, "procedural underline rendered");
            overlay
        }
        Err(err) => {
            warn!(
                target: "postfx::underline",
                error = %err,
                category = ?err.category(),
                "curve render unavailable, using straight underline"
            );
            straight_underline(size, &underline_geometry(bbox), params.color, params.thickness)
        }
    }
}

/// Everything that influences an underline overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnderlineKey {
    pub size: (u32, u32),
    pub bbox: TextBBox,
    pub color: [u8; 3],
    pub thickness: u32,
    pub seed: u64,
}

impl UnderlineKey {
    pub fn new(size: (u32, u32), bbox: TextBBox, params: &UnderlineParams) -> Self {
        Self {
            size,
            bbox,
            color: params.color.0,
            thickness: params.thickness,
            seed: params.seed,
        }
    }
}

/// Single-entry overlay cache owned by the caller.
///
/// The lock is held while a miss is generated, so concurrent callers sharing
/// one cache never render the same underline twice.
#[derive(Debug, Default)]
pub struct UnderlineCache {
    entry: Mutex<Option<(UnderlineKey, Arc<RgbaImage>)>>,
}

impl UnderlineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached overlay for `key`, or the result of `generate` stored in place
    /// of the previous entry.
    pub fn get_or_generate<F>(&self, key: UnderlineKey, generate: F) -> Arc<RgbaImage>
    where
        F: FnOnce() -> RgbaImage,
    {
        let mut entry = self.entry.lock();
        if let Some((cached_key, overlay)) = entry.as_ref() {
            if *cached_key == key {
                debug!(target: "postfx::underline", "underline cache hit");
                return Arc::clone(overlay);
            }
        }
        let overlay = Arc::new(generate());
        *entry = Some((key, Arc::clone(&overlay)));
        overlay
    }

    pub fn contains(&self, key: &UnderlineKey) -> bool {
        matches!(self.entry.lock().as_ref(), Some((k, _)) if k == key)
    }

    pub fn clear(&self) {
        *self.entry.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: (u32, u32) = (400, 300);

    struct FailingBackend;

    impl CurveBackend for FailingBackend {
        fn render(
            &self,
            _path: &[(f64, f64)],
            _color: Rgb<u8>,
            _thickness: u32,
            _size: (u32, u32),
            _background: Rgb<u8>,
        ) -> EngineResult<RgbImage> {
            Err(PostFxError::curve_render_unavailable("surface offline"))
        }
    }

    struct PanickingBackend;

    impl CurveBackend for PanickingBackend {
        fn render(
            &self,
            _path: &[(f64, f64)],
            _color: Rgb<u8>,
            _thickness: u32,
            _size: (u32, u32),
            _background: Rgb<u8>,
        ) -> EngineResult<RgbImage> {
            panic!("backend crashed");
        }
    }

    fn bbox() -> TextBBox {
        TextBBox::new(100, 100, 200, 60)
    }

    fn params(seed: u64) -> UnderlineParams {
        UnderlineParams {
            enabled: true,
            color: Rgb([250, 40, 10]),
            thickness: 6,
            seed,
        }
    }

    #[test]
    fn test_coordinate_round_trip() {
        let (tx, ty) = canvas_to_center(10.0, 20.0, 400, 300);
        assert_eq!((tx, ty), (-190.0, 130.0));
        assert_eq!(center_to_canvas(tx, ty, 400, 300), (10.0, 20.0));
        assert_eq!(canvas_to_center(200.0, 150.0, 400, 300), (0.0, 0.0));
    }

    #[test]
    fn test_geometry_padding() {
        let g = underline_geometry(&bbox());
        assert_eq!(g, UnderlineGeometry { x0: 76, x1: 324, base_y: 178 });

        let wide = underline_geometry(&TextBBox::new(0, 0, 1000, 10));
        assert_eq!((wide.x0, wide.x1), (-60, 1060));
    }

    #[test]
    fn test_sample_curve_shape() {
        let g = underline_geometry(&bbox());
        let points = sample_curve(&g, 6, 7);
        assert_eq!(points.len(), 81);
        assert_eq!(points[0].0, 76.0);
        assert_eq!(points[80].0, 324.0);
        let amplitude = 12.0;
        for &(_, y) in &points {
            assert!((y - 178.0).abs() <= amplitude * 1.35 + 1e-9);
        }
    }

    #[test]
    fn test_sample_curve_is_deterministic() {
        let g = underline_geometry(&bbox());
        assert_eq!(sample_curve(&g, 10, 42), sample_curve(&g, 10, 42));
        assert_ne!(sample_curve(&g, 10, 42), sample_curve(&g, 10, 43));
    }

    #[test]
    fn test_generated_overlay_is_deterministic() {
        let a = generate_underline(&PenCanvas, SIZE, &bbox(), &params(7)).unwrap();
        let b = generate_underline(&PenCanvas, SIZE, &bbox(), &params(7)).unwrap();
        assert_eq!(a, b);
        let c = generate_underline(&PenCanvas, SIZE, &bbox(), &params(8)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_generated_overlay_alpha_is_binary() {
        let overlay = generate_underline(&PenCanvas, SIZE, &bbox(), &params(3)).unwrap();
        assert_eq!(overlay.dimensions(), SIZE);
        let mut opaque = 0;
        for p in overlay.pixels() {
            assert!(p[3] == 0 || p[3] == 255);
            if p[3] == 255 {
                assert_eq!([p[0], p[1], p[2]], [250, 40, 10]);
                opaque += 1;
            }
        }
        assert!(opaque > 0);
    }

    #[test]
    fn test_stroke_stays_near_baseline() {
        let overlay = generate_underline(&PenCanvas, SIZE, &bbox(), &params(11)).unwrap();
        // amplitude 12, jitter up to 4.2, nib reach 5
        for (x, y, p) in overlay.enumerate_pixels() {
            if p[3] == 255 {
                assert!((73..=327).contains(&x), "x={x}");
                assert!((158..=198).contains(&y), "y={y}");
            }
        }
    }

    #[test]
    fn test_pen_stroke_width_matches_thickness() {
        let bg = CHROMA_GREEN;
        for thickness in [1u32, 2, 7, 10] {
            let flat = PenCanvas
                .render(&[(-60.0, 0.0), (60.0, 0.0)], Rgb([9, 9, 9]), thickness, (200, 100), bg)
                .unwrap();
            let rows: Vec<u32> = (0..100).filter(|&y| *flat.get_pixel(100, y) != bg).collect();
            assert_eq!(rows.len() as u32, thickness, "horizontal, thickness {thickness}");
            // Same rows as the straight fallback around the canvas center row.
            let top = 50 - (thickness as i32 - 1) / 2;
            assert_eq!(rows[0] as i32, top);

            let upright = PenCanvas
                .render(&[(0.0, -30.0), (0.0, 30.0)], Rgb([9, 9, 9]), thickness, (200, 100), bg)
                .unwrap();
            let cols = (0..200).filter(|&x| *upright.get_pixel(x, 50) != bg).count();
            assert_eq!(cols as u32, thickness, "vertical, thickness {thickness}");
        }
    }

    #[test]
    fn test_nib_is_round_and_exact() {
        assert_eq!(nib(1), vec![(0, 0)]);
        assert_eq!(nib(2).len(), 4);
        let ten = nib(10);
        let xs = ten.iter().map(|&(x, _)| x);
        assert_eq!((xs.clone().min(), xs.max()), (Some(-4), Some(5)));
        // corners are cut
        assert!(!ten.contains(&(-4, -4)));
    }

    #[test]
    fn test_chroma_colored_stroke_survives_keying() {
        let p = UnderlineParams {
            color: CHROMA_GREEN,
            ..params(5)
        };
        let overlay = generate_underline(&PenCanvas, SIZE, &bbox(), &p).unwrap();
        assert!(overlay.pixels().any(|px| px[3] == 255));
    }

    #[test]
    fn test_chroma_key_overlay() {
        let mut canvas = RgbImage::from_pixel(3, 1, CHROMA_GREEN);
        canvas.put_pixel(1, 0, Rgb([0, 254, 0]));
        let overlay = chroma_key_overlay(&canvas);
        assert_eq!(overlay.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(overlay.get_pixel(1, 0).0, [0, 254, 0, 255]);
    }

    #[test]
    fn test_pen_rejects_empty_surface() {
        let err = PenCanvas
            .render(&[(0.0, 0.0)], Rgb([1, 2, 3]), 2, (0, 10), CHROMA_GREEN)
            .unwrap_err();
        assert!(matches!(err, PostFxError::CurveRenderUnavailable { .. }));
    }

    #[test]
    fn test_fallback_is_exact_straight_line() {
        let p = params(7);
        let overlay = underline_overlay(Some(&FailingBackend), SIZE, &bbox(), &p);
        let g = underline_geometry(&bbox());
        let expected = straight_underline(SIZE, &g, p.color, p.thickness);
        assert_eq!(overlay, expected);

        for (x, y, px) in overlay.enumerate_pixels() {
            let on_line = (g.x0..=g.x1).contains(&(x as i32))
                && (g.base_y - 2..=g.base_y + 3).contains(&(y as i32));
            if on_line {
                assert_eq!(px.0, [250, 40, 10, 255]);
            } else {
                assert_eq!(px[3], 0);
            }
        }
    }

    #[test]
    fn test_straight_line_thickness_rows() {
        let g = UnderlineGeometry { x0: 10, x1: 20, base_y: 50 };
        for thickness in [1u32, 2, 5, 10] {
            let overlay = straight_underline((100, 100), &g, Rgb([9, 9, 9]), thickness);
            let rows = (0..100).filter(|&y| overlay.get_pixel(15, y)[3] == 255).count();
            assert_eq!(rows as u32, thickness);
            assert_eq!(overlay.get_pixel(15, 50)[3], 255);
        }
    }

    #[test]
    fn test_straight_line_clips_off_canvas() {
        let g = UnderlineGeometry { x0: -50, x1: 500, base_y: 99 };
        let overlay = straight_underline((100, 100), &g, Rgb([1, 1, 1]), 8);
        assert_eq!(overlay.dimensions(), (100, 100));
        assert_eq!(overlay.get_pixel(0, 99)[3], 255);
    }

    #[test]
    fn test_missing_and_panicking_backends_fall_back() {
        let p = params(1);
        let g = underline_geometry(&bbox());
        let expected = straight_underline(SIZE, &g, p.color, p.thickness);
        assert_eq!(underline_overlay(None, SIZE, &bbox(), &p), expected);
        assert_eq!(underline_overlay(Some(&PanickingBackend), SIZE, &bbox(), &p), expected);
    }

    #[test]
    fn test_cache_hits_and_replaces() {
        let cache = UnderlineCache::new();
        let key = UnderlineKey::new(SIZE, bbox(), &params(7));
        let mut calls = 0;
        let first = cache.get_or_generate(key, || {
            calls += 1;
            transparent(2, 2)
        });
        let second = cache.get_or_generate(key, || {
            calls += 1;
            transparent(3, 3)
        });
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.contains(&key));

        let other = UnderlineKey::new(SIZE, bbox(), &params(8));
        let third = cache.get_or_generate(other, || transparent(4, 4));
        assert_eq!(third.dimensions(), (4, 4));
        assert!(!cache.contains(&key));

        cache.clear();
        assert!(!cache.contains(&other));
    }
}
