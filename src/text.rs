use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use sha2::{Digest, Sha256};

use crate::compositor::MAX_SURFACE_EDGE;
use crate::geometry::Size;
use crate::overlay::MAX_FONT_SIZE;

pub const FONT_ENV_VAR: &str = "MEMETRUE_FONT";

/// Looked up in order when neither the manifest nor the environment name a
/// font.
pub const SYSTEM_FONT_CANDIDATES: [&str; 8] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Coverage mask for one rendered string, top-left anchored. `coverage` is
/// row-major, one byte per pixel. Neither edge exceeds [`MAX_SURFACE_EDGE`]
/// when produced by this crate; anything beyond it could never be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextMask {
    pub width: u32,
    pub height: u32,
    pub coverage: Vec<u8>,
}

impl TextMask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Coverage at `(x, y)`; 0 outside the mask.
    pub fn at(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.coverage.get(idx).copied().unwrap_or(0)
    }
}

/// Turns overlay text into coverage masks. Shared between the interactive
/// thread (measuring for drag bounds) and the compositing worker.
pub trait TextRasterizer: Send + Sync {
    fn rasterize(&self, text: &str, font_px: f32) -> TextMask;

    fn measure(&self, text: &str, font_px: f32) -> Size {
        let mask = self.rasterize(text, font_px);
        Size::new(mask.width as f32, mask.height as f32)
    }
}

/// Draws nothing. For sessions that never carry text, such as compositing a
/// bare template when no font is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRasterizer;

impl TextRasterizer for BlankRasterizer {
    fn rasterize(&self, _text: &str, _font_px: f32) -> TextMask {
        TextMask::empty()
    }
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

pub struct GlyphPainter {
    font: Font,
    fingerprint: String,
    glyph_cache: Mutex<HashMap<GlyphRasterConfig, GlyphBitmap>>,
}

impl GlyphPainter {
    pub fn from_bytes(font_bytes: Vec<u8>, font_name: &str) -> Result<Self> {
        let fingerprint = sha256_hex(&font_bytes);
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {font_name}: {error}"))?;
        Ok(Self {
            font,
            fingerprint,
            glyph_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_path(font_path: &Path) -> Result<Self> {
        let font_bytes = std::fs::read(font_path)
            .with_context(|| format!("failed to read font file {}", font_path.display()))?;
        Self::from_bytes(font_bytes, &font_path.display().to_string())
    }

    /// sha256 of the font file, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn layout(&self, text: &str, font_px: f32) -> Layout {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: 0.0,
            y: 0.0,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: true,
        });
        layout.append(&[&self.font], &TextStyle::new(text, font_px, 0));
        layout
    }

    /// Unclipped extent in whole pixels. Float to int casts saturate.
    fn extent(&self, layout: &Layout) -> (u32, u32) {
        let width = layout
            .glyphs()
            .iter()
            .map(|glyph| {
                let advance = self.font.metrics_indexed(glyph.key.glyph_index, glyph.key.px).advance_width;
                (glyph.x + advance.max(glyph.width as f32)).max(0.0)
            })
            .fold(0.0_f32, f32::max);
        (width.ceil() as u32, layout.height().ceil().max(0.0) as u32)
    }
}

impl TextRasterizer for GlyphPainter {
    fn rasterize(&self, text: &str, font_px: f32) -> TextMask {
        if text.is_empty() || !font_px_in_range(font_px) {
            return TextMask::empty();
        }

        let layout = self.layout(text, font_px);
        let (width, height) = self.extent(&layout);
        let width = width.min(MAX_SURFACE_EDGE);
        let height = height.min(MAX_SURFACE_EDGE);
        let Some(len) = (width as usize).checked_mul(height as usize) else {
            return TextMask::empty();
        };
        if len == 0 {
            return TextMask::empty();
        }

        let mut mask = TextMask {
            width,
            height,
            coverage: vec![0; len],
        };
        let mut cache = self
            .glyph_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let bitmap = cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = self.font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            stamp_glyph(&mut mask, glyph.x.round() as i32, glyph.y.round() as i32, bitmap);
        }

        mask
    }

    fn measure(&self, text: &str, font_px: f32) -> Size {
        if text.is_empty() || !font_px_in_range(font_px) {
            return Size::default();
        }
        let (width, height) = self.extent(&self.layout(text, font_px));
        Size::new(width as f32, height as f32)
    }
}

fn font_px_in_range(font_px: f32) -> bool {
    font_px.is_finite() && font_px > 0.0 && font_px <= MAX_FONT_SIZE as f32
}

/// Max-blends `glyph` into `mask` with its top-left at `(x, y)`, clipped to
/// the mask.
fn stamp_glyph(mask: &mut TextMask, x: i32, y: i32, glyph: &GlyphBitmap) {
    let (x, y) = (i64::from(x), i64::from(y));
    let mask_width = i64::from(mask.width);
    let mask_height = i64::from(mask.height);

    let rows = (-y).clamp(0, glyph.height as i64)..(mask_height - y).clamp(0, glyph.height as i64);
    let cols = (-x).clamp(0, glyph.width as i64)..(mask_width - x).clamp(0, glyph.width as i64);

    for row in rows {
        let py = y + row;
        for col in cols.clone() {
            let px = x + col;
            let Some(&value) = glyph.bitmap.get(row as usize * glyph.width + col as usize) else {
                continue;
            };
            let idx = (py * mask_width + px) as usize;
            if let Some(slot) = mask.coverage.get_mut(idx) {
                *slot = (*slot).max(value);
            }
        }
    }
}

/// Picks the font file: explicit path, then `MEMETRUE_FONT`, then the first
/// existing [`SYSTEM_FONT_CANDIDATES`] entry.
pub fn resolve_font_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("font file does not exist: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    if let Some(value) = std::env::var_os(FONT_ENV_VAR) {
        let path = PathBuf::from(value);
        if !path.is_file() {
            bail!("{FONT_ENV_VAR} points at a missing file: {}", path.display());
        }
        return Ok(path);
    }

    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .ok_or_else(|| {
            anyhow!(
                "no font available: set `font` in the manifest or {FONT_ENV_VAR}. Looked in: {}",
                SYSTEM_FONT_CANDIDATES.join(", ")
            )
        })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
