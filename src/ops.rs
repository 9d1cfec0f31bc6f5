// src/ops.rs
//
// Pipeline parameters.
// These are cheap to create and copy - the expensive work happens in Pipeline::run().

use crate::error::PostFxError;
use image::Rgb;
use std::ops::RangeInclusive;
use tracing::warn;

/// Slider range of the tone multipliers in the editor UI.
pub const ADJUSTMENT_RANGE: RangeInclusive<f32> = 0.0..=2.5;
pub const GLOW_STRENGTH_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const GLOW_RADIUS_RANGE: RangeInclusive<f32> = 0.0..=20.0;
pub const GRAIN_AMOUNT_RANGE: RangeInclusive<f32> = 0.0..=0.30;
pub const TEXT_SIZE_RANGE: RangeInclusive<u32> = 24..=140;
pub const UNDERLINE_THICKNESS_RANGE: RangeInclusive<u32> = 1..=30;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Named color filter presets applied before tone adjustments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterKind {
    #[default]
    Normal,
    Grayscale,
    Invert,
    Sepia,
    Warm,
    Cool,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::Normal,
        FilterKind::Grayscale,
        FilterKind::Invert,
        FilterKind::Sepia,
        FilterKind::Warm,
        FilterKind::Cool,
    ];

    /// Parse a filter name. Accepts the English names and the labels of the
    /// Turkish editor UI ("Siyah-Beyaz", "Sepya", "Sıcak", "Soğuk").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "grayscale" | "greyscale" | "siyah-beyaz" => Some(Self::Grayscale),
            "invert" => Some(Self::Invert),
            "sepia" | "sepya" => Some(Self::Sepia),
            "warm" | "sıcak" => Some(Self::Warm),
            "cool" | "soğuk" => Some(Self::Cool),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Grayscale => "grayscale",
            Self::Invert => "invert",
            Self::Sepia => "sepia",
            Self::Warm => "warm",
            Self::Cool => "cool",
        }
    }
}

/// Tone multipliers. 1.0 is identity for every field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjustmentParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AdjustmentParams {
    pub const IDENTITY: Self = Self {
        brightness: 1.0,
        contrast: 1.0,
        saturation: 1.0,
        sharpness: 1.0,
    };

    pub fn new(brightness: f32, contrast: f32, saturation: f32, sharpness: f32) -> Self {
        Self {
            brightness,
            contrast,
            saturation,
            sharpness,
        }
    }
}

/// Soft bloom settings. `radius` is a Gaussian sigma in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowParams {
    pub enabled: bool,
    pub strength: f32,
    pub radius: f32,
}

impl Default for GlowParams {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.35,
            radius: 6.0,
        }
    }
}

impl GlowParams {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Film grain settings. `amount` drives both noise spread and blend fraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrainParams {
    pub enabled: bool,
    pub amount: f32,
    /// Fixed noise seed. `None` draws a fresh field from OS entropy on every run.
    pub seed: Option<u64>,
}

impl Default for GrainParams {
    fn default() -> Self {
        Self {
            enabled: true,
            amount: 0.08,
            seed: None,
        }
    }
}

impl GrainParams {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Vertical placement of the text run. Horizontal placement is always centered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextPosition {
    TopCenter,
    MiddleCenter,
    #[default]
    BottomCenter,
}

impl TextPosition {
    /// Parse a position name. Accepts "top"/"middle"/"bottom" forms and the
    /// Turkish editor UI's "Üst-Orta", "Orta", "Alt-Orta".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "top" | "top-center" | "üst-orta" => Some(Self::TopCenter),
            "middle" | "center" | "middle-center" | "orta" => Some(Self::MiddleCenter),
            "bottom" | "bottom-center" | "alt-orta" => Some(Self::BottomCenter),
            _ => None,
        }
    }
}

/// Hand-drawn underline settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnderlineParams {
    pub enabled: bool,
    pub color: Rgb<u8>,
    /// Stroke width in pixels (values below 1 are treated as 1)
    pub thickness: u32,
    pub seed: u64,
}

impl Default for UnderlineParams {
    fn default() -> Self {
        Self {
            enabled: true,
            color: WHITE,
            thickness: 10,
            seed: 7,
        }
    }
}

/// Text overlay settings.
#[derive(Clone, Debug, PartialEq)]
pub struct TextParams {
    pub enabled: bool,
    pub text: String,
    pub position: TextPosition,
    /// Point size; the font is scaled so that one point maps to one pixel
    pub size: u32,
    pub color: Rgb<u8>,
    pub underline: UnderlineParams,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            enabled: true,
            text: "Merhaba".to_string(),
            position: TextPosition::BottomCenter,
            size: 72,
            color: WHITE,
            underline: UnderlineParams::default(),
        }
    }
}

impl TextParams {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Text with surrounding whitespace removed; `None` when nothing would be drawn.
    pub fn visible_text(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Top-left-origin rectangle of a measured glyph run, in raster pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextBBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl TextBBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    /// Quality used for saved posts.
    pub const DEFAULT_JPEG_QUALITY: u8 = 95;

    pub fn from_str(format: &str, quality: Option<u8>) -> Result<Self, PostFxError> {
        let q = quality.unwrap_or(Self::DEFAULT_JPEG_QUALITY);
        match format.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg { quality: q }),
            "png" => Ok(Self::Png),
            other => Err(PostFxError::unsupported_format(other.to_string())),
        }
    }

    /// Pick the format from a file extension: `.jpg`/`.jpeg` encode as JPEG,
    /// everything else as PNG.
    pub fn from_path(path: &std::path::Path) -> Self {
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_jpeg {
            Self::Jpeg {
                quality: Self::DEFAULT_JPEG_QUALITY,
            }
        } else {
            Self::Png
        }
    }
}

/// Parse `#RRGGBB` (leading `#` optional, surrounding whitespace ignored).
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>, PostFxError> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PostFxError::invalid_color(value.to_string()));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| PostFxError::invalid_color(value.to_string()))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

/// Parse a color, substituting white on malformed input.
pub fn color_or_white(value: &str) -> Rgb<u8> {
    match parse_hex_color(value) {
        Ok(color) => color,
        Err(err) => {
            warn!(target: "postfx::config", error = %err, "substituting white");
            WHITE
        }
    }
}

/// Every parameter the pipeline consumes, in one bag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineConfig {
    pub filter: FilterKind,
    pub adjustments: AdjustmentParams,
    pub glow: GlowParams,
    pub grain: GrainParams,
    pub text: TextParams,
}

impl PipelineConfig {
    /// Get the built-in preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "clean" => Some(Self::clean()),
            "vintage" => Some(Self::vintage()),
            "noir" => Some(Self::noir()),
            "dreamy" => Some(Self::dreamy()),
            _ => None,
        }
    }

    /// No effects at all: the square crop passes through untouched.
    pub fn clean() -> Self {
        Self {
            glow: GlowParams::disabled(),
            grain: GrainParams::disabled(),
            text: TextParams::disabled(),
            ..Self::default()
        }
    }

    /// Sepia duotone with visible grain and slightly lifted contrast.
    pub fn vintage() -> Self {
        Self {
            filter: FilterKind::Sepia,
            adjustments: AdjustmentParams::new(1.0, 1.1, 1.0, 1.0),
            glow: GlowParams::disabled(),
            grain: GrainParams {
                amount: 0.18,
                ..GrainParams::default()
            },
            ..Self::default()
        }
    }

    /// High contrast black and white.
    pub fn noir() -> Self {
        Self {
            filter: FilterKind::Grayscale,
            adjustments: AdjustmentParams::new(0.95, 1.4, 1.0, 1.3),
            glow: GlowParams::disabled(),
            grain: GrainParams {
                amount: 0.12,
                ..GrainParams::default()
            },
            ..Self::default()
        }
    }

    /// Warm, bright and strongly bloomed.
    pub fn dreamy() -> Self {
        Self {
            filter: FilterKind::Warm,
            adjustments: AdjustmentParams::new(1.1, 0.9, 1.15, 0.8),
            glow: GlowParams {
                enabled: true,
                strength: 0.6,
                radius: 12.0,
            },
            ..Self::default()
        }
    }

    /// Clamp every numeric field to the editor's slider ranges.
    pub fn clamped(mut self) -> Self {
        let clamp_f = |v: f32, r: &RangeInclusive<f32>| {
            if v.is_nan() {
                *r.start()
            } else {
                v.clamp(*r.start(), *r.end())
            }
        };
        let adj = &mut self.adjustments;
        adj.brightness = clamp_f(adj.brightness, &ADJUSTMENT_RANGE);
        adj.contrast = clamp_f(adj.contrast, &ADJUSTMENT_RANGE);
        adj.saturation = clamp_f(adj.saturation, &ADJUSTMENT_RANGE);
        adj.sharpness = clamp_f(adj.sharpness, &ADJUSTMENT_RANGE);
        self.glow.strength = clamp_f(self.glow.strength, &GLOW_STRENGTH_RANGE);
        self.glow.radius = clamp_f(self.glow.radius, &GLOW_RADIUS_RANGE);
        self.grain.amount = clamp_f(self.grain.amount, &GRAIN_AMOUNT_RANGE);
        self.text.size = self
            .text
            .size
            .clamp(*TEXT_SIZE_RANGE.start(), *TEXT_SIZE_RANGE.end());
        self.text.underline.thickness = self.text.underline.thickness.clamp(
            *UNDERLINE_THICKNESS_RANGE.start(),
            *UNDERLINE_THICKNESS_RANGE.end(),
        );
        self
    }
}
