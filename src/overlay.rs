use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::geometry::Point;

pub const DEFAULT_TEXT: &str = "Add text here";
pub const DEFAULT_POSITION: Point = Point::new(50.0, 50.0);
pub const DEFAULT_FONT_SIZE: u32 = 24;
pub const DEFAULT_COLOR: Rgba = Rgba::WHITE;
pub const MIN_FONT_SIZE: u32 = 12;
/// Glyphs larger than this cannot be seen whole on any allowed surface.
pub const MAX_FONT_SIZE: u32 = 1024;
pub const FONT_SIZE_STEP: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn generated(sequence: u64) -> Self {
        Self(format!("text-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OverlayId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub id: OverlayId,
    pub text: String,
    pub position: Point,
    pub font_size: u32,
    pub color: Rgba,
}

impl TextOverlay {
    /// An overlay with the editor defaults: placeholder text at (50, 50),
    /// 24px, white.
    pub fn new(id: OverlayId) -> Self {
        Self {
            id,
            text: DEFAULT_TEXT.to_owned(),
            position: DEFAULT_POSITION,
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_COLOR,
        }
    }

    pub fn font_px(&self) -> f32 {
        self.font_size as f32
    }
}

pub fn clamp_font_size(px: u32) -> u32 {
    px.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSizeStep {
    Increase,
    Decrease,
}

impl FontSizeStep {
    pub fn apply(self, current: u32) -> u32 {
        let next = match self {
            Self::Increase => current.saturating_add(FONT_SIZE_STEP),
            Self::Decrease => current.saturating_sub(FONT_SIZE_STEP),
        };
        clamp_font_size(next)
    }
}

/// A partial update to one overlay. Every field is optional and addressed
/// independently; fields left as `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPatch {
    pub text: Option<String>,
    pub font_step: Option<FontSizeStep>,
    pub font_size: Option<u32>,
    pub color: Option<Rgba>,
    pub position: Option<Point>,
}

impl OverlayPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn font_step(step: FontSizeStep) -> Self {
        Self {
            font_step: Some(step),
            ..Self::default()
        }
    }

    pub fn color(color: Rgba) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
