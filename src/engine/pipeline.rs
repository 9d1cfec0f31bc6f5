// src/engine/pipeline.rs
//
// The fixed-order effects pipeline:
//   filter -> tone -> glow -> grain -> text (layout, underline, composite)
//
// Stages are pure functions of (image, parameters). A stage that has nothing
// to do hands its input straight through without copying.

use crate::engine::filters::apply_filter;
use crate::engine::font::{load_font, load_font_from, FontSource};
use crate::engine::glow::apply_glow;
use crate::engine::grain::apply_grain;
use crate::engine::text::{apply_text, measure_and_place};
use crate::engine::tone::apply_adjustments;
use crate::engine::underline::{underline_overlay, CurveBackend, PenCanvas, UnderlineCache, UnderlineKey};
use crate::ops::{PipelineConfig, TextBBox, UnderlineParams};
use image::{RgbImage, RgbaImage};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// One step of the pipeline, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Filter,
    Tone,
    Glow,
    Grain,
    Text,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [Stage::Filter, Stage::Tone, Stage::Glow, Stage::Grain, Stage::Text];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter => "filter",
            Stage::Tone => "tone",
            Stage::Glow => "glow",
            Stage::Grain => "grain",
            Stage::Text => "text",
        }
    }
}

/// Runs a [`PipelineConfig`] against a square base image.
///
/// The pipeline itself holds no per-render state; it only carries the
/// collaborators used by the text stage. The underline cache, when used,
/// belongs to the caller.
pub struct Pipeline {
    backend: Option<Box<dyn CurveBackend>>,
    font_candidates: Option<Vec<PathBuf>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("curve_backend", &self.backend.is_some())
            .field("font_candidates", &self.font_candidates)
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            backend: Some(Box::new(PenCanvas)),
            font_candidates: None,
        }
    }
}

/// Keep `current` when the stage borrowed it back, otherwise take the new buffer.
fn advance<'a, F>(current: Cow<'a, RgbImage>, stage: Stage, f: F) -> Cow<'a, RgbImage>
where
    F: FnOnce(&RgbImage) -> Cow<'_, RgbImage>,
{
    let next = match f(&current) {
        Cow::Borrowed(_) => None,
        Cow::Owned(img) => Some(img),
    };
    debug!(target: "postfx::pipeline", stage = stage.name(), changed = next.is_some(), "stage done");
    match next {
        Some(img) => Cow::Owned(img),
        None => current,
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the procedural underline renderer.
    pub fn with_backend(mut self, backend: impl CurveBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Drop the procedural renderer; underlines are drawn as straight lines.
    pub fn without_backend(mut self) -> Self {
        self.backend = None;
        self
    }

    /// Search these font files instead of the environment and system paths.
    /// An empty list selects the built-in bitmap font.
    pub fn with_font_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.font_candidates = Some(candidates.into_iter().map(Into::into).collect());
        self
    }

    /// Resolve the font used for text at `size` points.
    pub fn font(&self, size: u32) -> FontSource {
        match &self.font_candidates {
            Some(candidates) => load_font_from(candidates, size),
            None => load_font(size),
        }
    }

    /// Render `config` over `base`. The output always has the base dimensions.
    pub fn run(&self, base: &RgbImage, config: &PipelineConfig) -> RgbImage {
        self.render(base, config, None)
    }

    /// Like [`Pipeline::run`], reusing the underline from `cache` when the
    /// text box, color, thickness and seed are unchanged.
    pub fn run_with_cache(&self, base: &RgbImage, config: &PipelineConfig, cache: &UnderlineCache) -> RgbImage {
        self.render(base, config, Some(cache))
    }

    fn render(&self, base: &RgbImage, config: &PipelineConfig, cache: Option<&UnderlineCache>) -> RgbImage {
        debug!(
            target: "postfx::pipeline",
            width = base.width(),
            height = base.height(),
            filter = config.filter.name(),
            "pipeline start"
        );
        let mut current = Cow::Borrowed(base);
        current = advance(current, Stage::Filter, |img| apply_filter(img, config.filter));
        current = advance(current, Stage::Tone, |img| apply_adjustments(img, &config.adjustments));
        current = advance(current, Stage::Glow, |img| apply_glow(img, &config.glow));
        current = advance(current, Stage::Grain, |img| apply_grain(img, &config.grain));
        current = advance(current, Stage::Text, |img| self.text_stage(img, config, cache));
        current.into_owned()
    }

    fn text_stage<'a>(
        &self,
        img: &'a RgbImage,
        config: &PipelineConfig,
        cache: Option<&UnderlineCache>,
    ) -> Cow<'a, RgbImage> {
        let params = &config.text;
        let Some(text) = params.visible_text() else {
            return Cow::Borrowed(img);
        };
        let font = self.font(params.size);
        let bbox = measure_and_place(text, &font, params.position, img.dimensions());

        let overlay = params
            .underline
            .enabled
            .then(|| self.underline(img.dimensions(), bbox, &params.underline, cache));
        apply_text(img, params, &font, bbox, overlay.as_deref())
    }

    fn underline(
        &self,
        size: (u32, u32),
        bbox: TextBBox,
        params: &UnderlineParams,
        cache: Option<&UnderlineCache>,
    ) -> Arc<RgbaImage> {
        let generate = || underline_overlay(self.backend.as_deref(), size, &bbox, params);
        match cache {
            Some(cache) => cache.get_or_generate(UnderlineKey::new(size, bbox, params), generate),
            None => Arc::new(generate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pixel::invert;
    use crate::ops::{AdjustmentParams, FilterKind, GlowParams, GrainParams, TextParams};
    use image::Rgb;

    fn base() -> RgbImage {
        RgbImage::from_fn(160, 160, |x, y| Rgb([(x + y) as u8, (x * 2) as u8, 90]))
    }

    fn plain() -> PipelineConfig {
        PipelineConfig {
            filter: FilterKind::Normal,
            adjustments: AdjustmentParams::IDENTITY,
            glow: GlowParams::disabled(),
            grain: GrainParams::disabled(),
            text: TextParams::disabled(),
        }
    }

    fn builtin() -> Pipeline {
        Pipeline::new().with_font_candidates(Vec::<PathBuf>::new())
    }

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = Stage::ORDER.iter().map(Stage::name).collect();
        assert_eq!(names, ["filter", "tone", "glow", "grain", "text"]);
    }

    #[test]
    fn test_all_disabled_is_identity() {
        let img = base();
        assert_eq!(builtin().run(&img, &plain()), img);
    }

    #[test]
    fn test_filter_only() {
        let img = base();
        let config = PipelineConfig {
            filter: FilterKind::Invert,
            ..plain()
        };
        assert_eq!(builtin().run(&img, &config), invert(&img));
    }

    #[test]
    fn test_seeded_grain_is_reproducible() {
        let img = base();
        let config = PipelineConfig {
            grain: GrainParams {
                enabled: true,
                amount: 0.1,
                seed: Some(99),
            },
            ..plain()
        };
        let pipeline = builtin();
        assert_eq!(pipeline.run(&img, &config), pipeline.run(&img, &config));
    }

    #[test]
    fn test_text_changes_image_and_keeps_size() {
        let img = base();
        let config = PipelineConfig {
            text: TextParams {
                text: "Hi".into(),
                size: 24,
                ..TextParams::default()
            },
            ..plain()
        };
        let out = builtin().run(&img, &config);
        assert_eq!(out.dimensions(), img.dimensions());
        assert_ne!(out, img);
    }

    #[test]
    fn test_blank_text_is_identity() {
        let img = base();
        let config = PipelineConfig {
            text: TextParams {
                text: "  ".into(),
                ..TextParams::default()
            },
            ..plain()
        };
        assert_eq!(builtin().run(&img, &config), img);
    }

    #[test]
    fn test_cache_matches_uncached_render() {
        let img = base();
        let config = PipelineConfig {
            text: TextParams {
                text: "Hey".into(),
                size: 24,
                ..TextParams::default()
            },
            ..plain()
        };
        let pipeline = builtin();
        let cache = UnderlineCache::new();
        let first = pipeline.run_with_cache(&img, &config, &cache);
        let second = pipeline.run_with_cache(&img, &config, &cache);
        assert_eq!(first, second);
        assert_eq!(first, pipeline.run(&img, &config));
    }

    #[test]
    fn test_pipeline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
        assert_send_sync::<UnderlineCache>();
    }
}
