// src/engine/font.rs
//
// Font/glyph collaborator: finds a TrueType font on the host, measures and
// rasterizes glyph runs. When no font file is usable the built-in 5x8 bitmap
// font is used instead, so text rendering never fails.

use crate::error::PostFxError;
use ab_glyph::{Font, FontArc, PxScale};
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable naming a font file tried before the built-in list.
pub const FONT_ENV_VAR: &str = "POSTFX_FONT";

/// Ordered font search list.
pub const FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Times New Roman.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Measures and draws a glyph run at a fixed size.
pub trait GlyphSource: Send + Sync {
    /// Pixel extent (width, height) of `text`.
    fn measure(&self, text: &str) -> (u32, u32);

    /// Rasterize the coverage of `text` into `mask` (255 = fully covered)
    /// with its top-left corner at (x, y). Pixels outside the mask are clipped.
    fn draw(&self, mask: &mut GrayImage, x: i32, y: i32, text: &str);
}

// Parsed fonts are shared across loads; the lock serializes file access.
static FONT_CACHE: OnceLock<Mutex<HashMap<PathBuf, Option<FontArc>>>> = OnceLock::new();

fn read_font(path: &Path) -> Result<FontArc, PostFxError> {
    let cache = FONT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock();
    if let Some(entry) = cache.get(path) {
        return entry
            .clone()
            .ok_or_else(|| PostFxError::font_unavailable(format!("{} is not usable", path.display())));
    }
    let parsed = std::fs::read(path)
        .map_err(|e| PostFxError::font_unavailable(format!("{}: {e}", path.display())))
        .and_then(|bytes| {
            FontArc::try_from_vec(bytes)
                .map_err(|e| PostFxError::font_unavailable(format!("{}: {e}", path.display())))
        });
    cache.insert(path.to_path_buf(), parsed.as_ref().ok().cloned());
    parsed
}

/// Load a font at `size` points, trying `POSTFX_FONT` and then
/// [`FONT_CANDIDATES`]; falls back to [`BuiltinFont`].
pub fn load_font(size: u32) -> FontSource {
    let env_path = std::env::var_os(FONT_ENV_VAR).map(PathBuf::from);
    let candidates = env_path
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));
    load_font_from(candidates, size)
}

/// Load the first usable font among `candidates`.
pub fn load_font_from<I, P>(candidates: I, size: u32) -> FontSource
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for candidate in candidates {
        let path = candidate.as_ref();
        if !path.exists() {
            continue;
        }
        match read_font(path) {
            Ok(font) => {
                debug!(target: "postfx::font", path = %path.display(), size, "loaded font");
                return FontSource::TrueType(TrueTypeFont::new(font, size));
            }
            Err(err) => debug!(target: "postfx::font", error = %err, "skipping font candidate"),
        }
    }
    let err = PostFxError::font_unavailable("no candidate font could be loaded");
    warn!(target: "postfx::font", error = %err, "using built-in font");
    FontSource::Builtin(BuiltinFont::new(size))
}

/// A resolved font, either a parsed TrueType/OpenType face or the bitmap fallback.
#[derive(Clone, Debug)]
pub enum FontSource {
    TrueType(TrueTypeFont),
    Builtin(BuiltinFont),
}

impl FontSource {
    pub fn is_builtin(&self) -> bool {
        matches!(self, FontSource::Builtin(_))
    }
}

impl GlyphSource for FontSource {
    fn measure(&self, text: &str) -> (u32, u32) {
        match self {
            FontSource::TrueType(font) => font.measure(text),
            FontSource::Builtin(font) => font.measure(text),
        }
    }

    fn draw(&self, mask: &mut GrayImage, x: i32, y: i32, text: &str) {
        match self {
            FontSource::TrueType(font) => font.draw(mask, x, y, text),
            FontSource::Builtin(font) => font.draw(mask, x, y, text),
        }
    }
}

/// Outline font rendered with anti-aliased coverage.
#[derive(Clone)]
pub struct TrueTypeFont {
    font: FontArc,
    scale: PxScale,
}

impl std::fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("scale", &self.scale)
            .finish()
    }
}

impl TrueTypeFont {
    /// `size` is an em size in pixels; ab_glyph scales by ascent-descent
    /// height, so convert through units-per-em.
    pub fn new(font: FontArc, size: u32) -> Self {
        let size = size.max(1) as f32;
        let height = match font.units_per_em() {
            Some(upem) if upem > 0.0 => size * font.height_unscaled() / upem,
            _ => size,
        };
        Self {
            font,
            scale: PxScale::from(height),
        }
    }
}

impl GlyphSource for TrueTypeFont {
    fn measure(&self, text: &str) -> (u32, u32) {
        imageproc::drawing::text_size(self.scale, &self.font, text)
    }

    fn draw(&self, mask: &mut GrayImage, x: i32, y: i32, text: &str) {
        imageproc::drawing::draw_text_mut(mask, Luma([255]), x, y, self.scale, &self.font, text);
    }
}

/// Column-major 5x8 glyphs for ASCII 0x20..=0x7E; bit 0 is the top row.
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], // '"'
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // '$'
    [0x23, 0x13, 0x08, 0x64, 0x62], // '%'
    [0x36, 0x49, 0x56, 0x20, 0x50], // '&'
    [0x00, 0x08, 0x07, 0x03, 0x00], // '\''
    [0x00, 0x1C, 0x22, 0x41, 0x00], // '('
    [0x00, 0x41, 0x22, 0x1C, 0x00], // ')'
    [0x2A, 0x1C, 0x7F, 0x1C, 0x2A], // '*'
    [0x08, 0x08, 0x3E, 0x08, 0x08], // '+'
    [0x00, 0x80, 0x70, 0x30, 0x00], // ','
    [0x08, 0x08, 0x08, 0x08, 0x08], // '-'
    [0x00, 0x00, 0x60, 0x60, 0x00], // '.'
    [0x20, 0x10, 0x08, 0x04, 0x02], // '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // '0'
    [0x00, 0x42, 0x7F, 0x40, 0x00], // '1'
    [0x72, 0x49, 0x49, 0x49, 0x46], // '2'
    [0x21, 0x41, 0x49, 0x4D, 0x33], // '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], // '4'
    [0x27, 0x45, 0x45, 0x45, 0x39], // '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x31], // '6'
    [0x41, 0x21, 0x11, 0x09, 0x07], // '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], // '8'
    [0x46, 0x49, 0x49, 0x29, 0x1E], // '9'
    [0x00, 0x00, 0x14, 0x00, 0x00], // ':'
    [0x00, 0x40, 0x34, 0x00, 0x00], // ';'
    [0x00, 0x08, 0x14, 0x22, 0x41], // '<'
    [0x14, 0x14, 0x14, 0x14, 0x14], // '='
    [0x00, 0x41, 0x22, 0x14, 0x08], // '>'
    [0x02, 0x01, 0x59, 0x09, 0x06], // '?'
    [0x3E, 0x41, 0x5D, 0x59, 0x4E], // '@'
    [0x7C, 0x12, 0x11, 0x12, 0x7C], // 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], // 'B'
    [0x3E, 0x41, 0x41, 0x41, 0x22], // 'C'
    [0x7F, 0x41, 0x41, 0x41, 0x3E], // 'D'
    [0x7F, 0x49, 0x49, 0x49, 0x41], // 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], // 'F'
    [0x3E, 0x41, 0x41, 0x51, 0x73], // 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // 'H'
    [0x00, 0x41, 0x7F, 0x41, 0x00], // 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], // 'J'
    [0x7F, 0x08, 0x14, 0x22, 0x41], // 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], // 'L'
    [0x7F, 0x02, 0x1C, 0x02, 0x7F], // 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // 'N'
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], // 'P'
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], // 'R'
    [0x26, 0x49, 0x49, 0x49, 0x32], // 'S'
    [0x03, 0x01, 0x7F, 0x01, 0x03], // 'T'
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // 'V'
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], // 'X'
    [0x03, 0x04, 0x78, 0x04, 0x03], // 'Y'
    [0x61, 0x59, 0x49, 0x4D, 0x43], // 'Z'
    [0x00, 0x7F, 0x41, 0x41, 0x41], // '['
    [0x02, 0x04, 0x08, 0x10, 0x20], // '\\'
    [0x00, 0x41, 0x41, 0x41, 0x7F], // ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], // '^'
    [0x40, 0x40, 0x40, 0x40, 0x40], // '_'
    [0x00, 0x03, 0x07, 0x08, 0x00], // '`'
    [0x20, 0x54, 0x54, 0x78, 0x40], // 'a'
    [0x7F, 0x28, 0x44, 0x44, 0x38], // 'b'
    [0x38, 0x44, 0x44, 0x44, 0x28], // 'c'
    [0x38, 0x44, 0x44, 0x28, 0x7F], // 'd'
    [0x38, 0x54, 0x54, 0x54, 0x18], // 'e'
    [0x00, 0x08, 0x7E, 0x09, 0x02], // 'f'
    [0x18, 0xA4, 0xA4, 0x9C, 0x78], // 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], // 'h'
    [0x00, 0x44, 0x7D, 0x40, 0x00], // 'i'
    [0x20, 0x40, 0x40, 0x3D, 0x00], // 'j'
    [0x7F, 0x10, 0x28, 0x44, 0x00], // 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], // 'l'
    [0x7C, 0x04, 0x78, 0x04, 0x78], // 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], // 'n'
    [0x38, 0x44, 0x44, 0x44, 0x38], // 'o'
    [0xFC, 0x18, 0x24, 0x24, 0x18], // 'p'
    [0x18, 0x24, 0x24, 0x18, 0xFC], // 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], // 'r'
    [0x48, 0x54, 0x54, 0x54, 0x24], // 's'
    [0x04, 0x04, 0x3F, 0x44, 0x24], // 't'
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // 'v'
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], // 'x'
    [0x4C, 0x90, 0x90, 0x90, 0x7C], // 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], // 'z'
    [0x00, 0x08, 0x36, 0x41, 0x00], // '{'
    [0x00, 0x00, 0x77, 0x00, 0x00], // '|'
    [0x00, 0x41, 0x36, 0x08, 0x00], // '}'
    [0x02, 0x01, 0x02, 0x04, 0x02], // '~'
];

const GLYPH_COLUMNS: u32 = 5;
const GLYPH_ROWS: u32 = 8;
/// Columns per character including the one-column gap.
const GLYPH_ADVANCE: u32 = GLYPH_COLUMNS + 1;

/// Bitmap fallback font. Each glyph bit becomes a `cell x cell` block so the
/// rendered height tracks the requested size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinFont {
    cell: u32,
}

impl BuiltinFont {
    pub fn new(size: u32) -> Self {
        Self {
            cell: (size / GLYPH_ROWS).max(1),
        }
    }

    fn glyph(c: char) -> &'static [u8; 5] {
        let index = match c {
            ' '..='~' => c as usize - ' ' as usize,
            _ => '?' as usize - ' ' as usize,
        };
        &GLYPHS[index]
    }
}

impl GlyphSource for BuiltinFont {
    fn measure(&self, text: &str) -> (u32, u32) {
        let count = text.chars().count() as u32;
        if count == 0 {
            return (0, 0);
        }
        let width = (count * GLYPH_ADVANCE - 1) * self.cell;
        (width, GLYPH_ROWS * self.cell)
    }

    fn draw(&self, mask: &mut GrayImage, x: i32, y: i32, text: &str) {
        let (cw, ch) = (mask.width() as i64, mask.height() as i64);
        let cell = self.cell as i64;
        for (i, c) in text.chars().enumerate() {
            let origin_x = x as i64 + i as i64 * GLYPH_ADVANCE as i64 * cell;
            for (col, bits) in Self::glyph(c).iter().enumerate() {
                for row in 0..GLYPH_ROWS as i64 {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    let px = origin_x + col as i64 * cell;
                    let py = y as i64 + row * cell;
                    for yy in py.max(0)..(py + cell).min(ch) {
                        for xx in px.max(0)..(px + cell).min(cw) {
                            mask.put_pixel(xx as u32, yy as u32, Luma([255]));
                        }
                    }
                }
            }
        }
    }
}
