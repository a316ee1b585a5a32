use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::PngEncoder;
use image::{imageops, ExtendedColorType, GrayImage, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiny_skia::{FilterQuality, IntSize, Pixmap, PixmapPaint, Transform};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::color::Rgba;
use crate::error::CompositeError;
use crate::overlay::TextOverlay;
use crate::source::{decode_image, BaseImage, SourceResolver};
use crate::text::{TextMask, TextRasterizer};

pub const MAX_SURFACE_EDGE: u32 = 8192;
/// Shadow offsets beyond this land off every allowed surface.
pub const MAX_SHADOW_OFFSET: f32 = MAX_SURFACE_EDGE as f32;
pub const MAX_SHADOW_BLUR: f32 = 64.0;
pub const DEFAULT_DOWNLOAD_NAME: &str = "meme.png";

/// Drop shadow drawn under every overlay's text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ShadowStyle {
    /// Offset to the right and down, in pixels.
    pub offset: f32,
    /// Gaussian sigma; 0 draws a hard shadow.
    pub blur_sigma: f32,
    /// 0.0 disables the shadow.
    pub opacity: f32,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            offset: 2.0,
            blur_sigma: 1.0,
            opacity: 0.8,
        }
    }
}

impl ShadowStyle {
    fn color(&self) -> Rgba {
        let alpha = (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba::BLACK.with_alpha(alpha)
    }

    /// Offset in whole pixels, clamped to [`MAX_SHADOW_OFFSET`]. NaN is 0.
    fn offset_px(&self) -> i32 {
        self.offset.clamp(-MAX_SHADOW_OFFSET, MAX_SHADOW_OFFSET).round() as i32
    }

    /// Blur sigma clamped to `0..=MAX_SHADOW_BLUR`. NaN is 0.
    fn sigma(&self) -> f32 {
        if self.blur_sigma.is_nan() {
            return 0.0;
        }
        self.blur_sigma.clamp(0.0, MAX_SHADOW_BLUR)
    }
}

/// A flattened PNG. Produced fresh for every request and owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeResult {
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl CompositeResult {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png_bytes(self) -> Vec<u8> {
        self.png
    }

    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }

    pub fn sha256_hex(&self) -> String {
        let digest = Sha256::digest(&self.png);
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn write_png(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.png)
            .with_context(|| format!("failed to write composite to {}", path.display()))
    }
}

/// Rasterizes a base image and its overlays into one PNG.
#[derive(Clone)]
pub struct Compositor {
    rasterizer: Arc<dyn TextRasterizer>,
    resolver: Arc<dyn SourceResolver>,
    shadow: ShadowStyle,
}

impl Compositor {
    pub fn new(rasterizer: Arc<dyn TextRasterizer>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            rasterizer,
            resolver,
            shadow: ShadowStyle::default(),
        }
    }

    pub fn with_shadow(mut self, shadow: ShadowStyle) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn rasterizer(&self) -> &Arc<dyn TextRasterizer> {
        &self.rasterizer
    }

    pub fn shadow(&self) -> ShadowStyle {
        self.shadow
    }

    pub fn composite(
        &self,
        base: &BaseImage,
        overlays: &[TextOverlay],
        width: u32,
        height: u32,
    ) -> Result<CompositeResult, CompositeError> {
        self.composite_with(base, overlays, width, height, &CancelToken::never())
    }

    /// Like [`composite`](Self::composite), checking `cancel` between the
    /// fetch, decode, render and encode stages.
    pub fn composite_with(
        &self,
        base: &BaseImage,
        overlays: &[TextOverlay],
        width: u32,
        height: u32,
        cancel: &CancelToken,
    ) -> Result<CompositeResult, CompositeError> {
        let started = Instant::now();
        check_dimensions(width, height)?;

        let label = base.source().label();
        let bytes = self.resolver.fetch(base.source(), cancel)?;
        cancel.check()?;
        let decoded = decode_image(&bytes, &label)?;
        cancel.check()?;
        let surface = self.render(&decoded, overlays, width, height)?;
        cancel.check()?;
        let result = encode_png(&surface)?;

        debug!(
            source = %label,
            width,
            height,
            overlays = overlays.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "composited"
        );
        Ok(result)
    }

    /// Draws onto a fresh surface without encoding. The returned pixmap is
    /// premultiplied RGBA.
    pub fn render(
        &self,
        base: &RgbaImage,
        overlays: &[TextOverlay],
        width: u32,
        height: u32,
    ) -> Result<Pixmap, CompositeError> {
        let mut surface = allocate_surface(width, height)?;
        draw_cover(&mut surface, base)?;
        for overlay in overlays {
            self.draw_overlay(&mut surface, overlay);
        }
        Ok(surface)
    }

    fn draw_overlay(&self, surface: &mut Pixmap, overlay: &TextOverlay) {
        let mask = self.rasterizer.rasterize(&overlay.text, overlay.font_px());
        if mask.is_empty() {
            return;
        }
        // Saturating casts: far-off positions simply miss the surface.
        let x = overlay.position.x.round() as i32;
        let y = overlay.position.y.round() as i32;

        if self.shadow.opacity > 0.0 {
            let (shadow, margin) = blurred_shadow(&mask, self.shadow.sigma());
            let shift = |origin: i32| {
                origin
                    .saturating_add(self.shadow.offset_px())
                    .saturating_sub(margin)
            };
            blend_mask(surface, &shadow, shift(x), shift(y), self.shadow.color());
        }
        blend_mask(surface, &mask, x, y, overlay.color);
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), CompositeError> {
    if width == 0 || height == 0 {
        return Err(CompositeError::surface(width, height, "dimensions must be positive"));
    }
    if width > MAX_SURFACE_EDGE || height > MAX_SURFACE_EDGE {
        return Err(CompositeError::surface(
            width,
            height,
            format!("edges are limited to {MAX_SURFACE_EDGE}px"),
        ));
    }
    Ok(())
}

fn allocate_surface(width: u32, height: u32) -> Result<Pixmap, CompositeError> {
    check_dimensions(width, height)?;
    Pixmap::new(width, height)
        .ok_or_else(|| CompositeError::surface(width, height, "allocation failed"))
}

/// Scales `base` to cover the whole surface, keeping its aspect ratio and
/// centre-cropping the overflow.
fn draw_cover(surface: &mut Pixmap, base: &RgbaImage) -> Result<(), CompositeError> {
    let source = premultiplied_pixmap(base)?;
    let (src_w, src_h) = (base.width() as f32, base.height() as f32);
    let (dst_w, dst_h) = (surface.width() as f32, surface.height() as f32);

    let scale = (dst_w / src_w).max(dst_h / src_h);
    let dx = (dst_w - src_w * scale) / 2.0;
    let dy = (dst_h - src_h * scale) / 2.0;

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    surface.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &paint,
        Transform::from_row(scale, 0.0, 0.0, scale, dx, dy),
        None,
    );
    Ok(())
}

fn premultiplied_pixmap(image: &RgbaImage) -> Result<Pixmap, CompositeError> {
    let (width, height) = image.dimensions();
    let mut data = image.as_raw().clone();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        for channel in &mut pixel[..3] {
            *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
        }
    }
    IntSize::from_wh(width, height)
        .and_then(|size| Pixmap::from_vec(data, size))
        .ok_or_else(|| CompositeError::surface(width, height, "base image does not fit a drawing surface"))
}

/// Pads the mask by the blur reach and blurs it. Returns the blurred mask
/// and the padding, so callers can offset the draw position.
fn blurred_shadow(mask: &TextMask, sigma: f32) -> (TextMask, i32) {
    let margin = if sigma > 0.0 { (sigma * 3.0).ceil() as u32 } else { 0 };
    let width = mask.width.saturating_add(margin * 2);
    let height = mask.height.saturating_add(margin * 2);

    let mut padded = GrayImage::new(width, height);
    for y in 0..mask.height {
        for x in 0..mask.width {
            padded.put_pixel(x + margin, y + margin, image::Luma([mask.at(x, y)]));
        }
    }
    let blurred = if sigma > 0.0 {
        imageops::blur(&padded, sigma)
    } else {
        padded
    };

    (
        TextMask {
            width,
            height,
            coverage: blurred.into_raw(),
        },
        margin as i32,
    )
}

/// Blends `mask` with its top-left at `(x, y)`. Only the part of the mask
/// that overlaps the surface is visited.
fn blend_mask(surface: &mut Pixmap, mask: &TextMask, x: i32, y: i32, color: Rgba) {
    let surface_width = i64::from(surface.width());
    let surface_height = i64::from(surface.height());
    let (x, y) = (i64::from(x), i64::from(y));
    let mask_width = i64::from(mask.width);
    let mask_height = i64::from(mask.height);

    let rows = (-y).clamp(0, mask_height)..(surface_height - y).clamp(0, mask_height);
    let cols = (-x).clamp(0, mask_width)..(surface_width - x).clamp(0, mask_width);
    let data = surface.data_mut();

    for row in rows {
        let py = y + row;
        for col in cols.clone() {
            let px = x + col;
            let coverage = u32::from(mask.at(col as u32, row as u32));
            let alpha = (coverage * u32::from(color.a) + 127) / 255;
            if alpha == 0 {
                continue;
            }
            let idx = ((py * surface_width + px) * 4) as usize;
            if let Some(pixel) = data.get_mut(idx..idx + 4) {
                blend_premultiplied(pixel, color, alpha as u8);
            }
        }
    }
}

/// Source-over of a straight colour at `alpha` onto a premultiplied pixel.
fn blend_premultiplied(dst: &mut [u8], color: Rgba, alpha: u8) {
    let alpha = u32::from(alpha);
    let inv_alpha = 255 - alpha;
    let div255 = |value: u32| ((value + 127) / 255) as u8;

    let src = [color.r, color.g, color.b];
    for channel in 0..3 {
        let src_p = div255(u32::from(src[channel]) * alpha);
        let dst_c = div255(u32::from(dst[channel]) * inv_alpha);
        dst[channel] = src_p.saturating_add(dst_c);
    }
    dst[3] = (alpha as u8).saturating_add(div255(u32::from(dst[3]) * inv_alpha));
}

fn encode_png(surface: &Pixmap) -> Result<CompositeResult, CompositeError> {
    let (width, height) = (surface.width(), surface.height());
    let mut rgba = Vec::with_capacity(surface.data().len());
    for pixel in surface.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|error| CompositeError::Encode(error.to_string()))?;

    Ok(CompositeResult { width, height, png })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_oversized_targets_are_surface_errors() {
        assert!(matches!(allocate_surface(0, 10), Err(CompositeError::Surface { .. })));
        assert!(matches!(allocate_surface(10, 0), Err(CompositeError::Surface { .. })));
        assert!(matches!(
            allocate_surface(MAX_SURFACE_EDGE + 1, 10),
            Err(CompositeError::Surface { .. })
        ));
        assert!(allocate_surface(4, 4).is_ok());
    }

    #[test]
    fn opaque_blend_replaces_destination() {
        let mut pixel = [10, 20, 30, 255];
        blend_premultiplied(&mut pixel, Rgba::rgb(200, 100, 0), 255);
        assert_eq!(pixel, [200, 100, 0, 255]);
    }

    #[test]
    fn half_blend_keeps_premultiplied_invariant() {
        let mut pixel = [0, 0, 0, 0];
        blend_premultiplied(&mut pixel, Rgba::WHITE, 128);
        assert_eq!(pixel, [128, 128, 128, 128]);
        blend_premultiplied(&mut pixel, Rgba::rgb(255, 0, 0), 128);
        assert!(pixel[..3].iter().all(|&c| c <= pixel[3]));
    }

    #[test]
    fn cover_fit_crops_instead_of_letterboxing() {
        // 4x2 image: left half red, right half blue, drawn into a 2x2 surface.
        let mut base = RgbaImage::new(4, 2);
        for (x, _, pixel) in base.enumerate_pixels_mut() {
            *pixel = if x < 2 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            };
        }
        let mut surface = allocate_surface(2, 2).unwrap();
        draw_cover(&mut surface, &base).unwrap();
        let left = surface.pixel(0, 0).unwrap();
        let right = surface.pixel(1, 1).unwrap();
        assert_eq!((left.red(), left.blue(), left.alpha()), (255, 0, 255));
        assert_eq!((right.red(), right.blue(), right.alpha()), (0, 255, 255));
    }

    #[test]
    fn masks_far_off_the_surface_are_skipped() {
        let mut surface = allocate_surface(4, 4).unwrap();
        let mask = TextMask {
            width: 3,
            height: 3,
            coverage: vec![255; 9],
        };
        for (x, y) in [(i32::MAX, 0), (0, i32::MAX), (i32::MIN, i32::MIN), (-3, 4)] {
            blend_mask(&mut surface, &mask, x, y, Rgba::WHITE);
        }
        assert!(surface.data().iter().all(|&byte| byte == 0));

        blend_mask(&mut surface, &mask, -2, -2, Rgba::WHITE);
        assert_eq!(surface.pixel(0, 0).unwrap().alpha(), 255);
        assert_eq!(surface.pixel(1, 1).unwrap().alpha(), 0);
    }

    #[test]
    fn shadow_settings_are_clamped_before_use() {
        let runaway = ShadowStyle {
            offset: 3.0e9,
            blur_sigma: f32::NAN,
            opacity: 0.8,
        };
        assert_eq!(runaway.offset_px(), MAX_SHADOW_OFFSET as i32);
        assert_eq!(runaway.sigma(), 0.0);
        let negative = ShadowStyle {
            offset: f32::NEG_INFINITY,
            blur_sigma: 1.0e9,
            opacity: 0.8,
        };
        assert_eq!(negative.offset_px(), -(MAX_SHADOW_OFFSET as i32));
        assert_eq!(negative.sigma(), MAX_SHADOW_BLUR);
    }

    #[test]
    fn shadow_padding_matches_blur_reach() {
        let mask = TextMask {
            width: 2,
            height: 1,
            coverage: vec![255, 255],
        };
        let (shadow, margin) = blurred_shadow(&mask, 1.0);
        assert_eq!(margin, 3);
        assert_eq!((shadow.width, shadow.height), (8, 7));
        let (hard, none) = blurred_shadow(&mask, 0.0);
        assert_eq!(none, 0);
        assert_eq!(hard, mask);
    }
}
