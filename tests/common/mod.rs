#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use memetrue::compositor::{CompositeResult, Compositor, ShadowStyle};
use memetrue::source::{ImageSource, LocalResolver};
use memetrue::text::{TextMask, TextRasterizer};

/// Draws every character as a solid cell `font_px / 2` wide and `font_px`
/// tall. Keeps geometry predictable without shipping a font.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockRasterizer;

impl TextRasterizer for BlockRasterizer {
    fn rasterize(&self, text: &str, font_px: f32) -> TextMask {
        let chars = text.chars().count() as u32;
        let cell = (font_px / 2.0).round() as u32;
        let height = font_px.round() as u32;
        let width = chars * cell;
        if width == 0 || height == 0 {
            return TextMask::empty();
        }
        TextMask {
            width,
            height,
            coverage: vec![255; (width * height) as usize],
        }
    }
}

pub fn block_compositor() -> Compositor {
    Compositor::new(Arc::new(BlockRasterizer), Arc::new(LocalResolver::default()))
}

pub fn block_compositor_without_shadow() -> Compositor {
    block_compositor().with_shadow(ShadowStyle {
        opacity: 0.0,
        ..ShadowStyle::default()
    })
}

pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("png should encode");
    out.into_inner()
}

pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, Rgba(rgba)))
}

pub fn solid_source(width: u32, height: u32, rgba: [u8; 4]) -> ImageSource {
    ImageSource::from_bytes("solid", solid_png(width, height, rgba))
}

pub fn decode(result: &CompositeResult) -> RgbaImage {
    image::load_from_memory(result.png_bytes())
        .expect("composite should decode")
        .to_rgba8()
}

pub fn pixel(image: &RgbaImage, x: u32, y: u32) -> [u8; 4] {
    image.get_pixel(x, y).0
}

/// Resampling may shift a channel by a step or two.
pub fn assert_near(actual: [u8; 4], expected: [u8; 4]) {
    let close = actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= 3);
    assert!(close, "expected ~{expected:?}, got {actual:?}");
}
