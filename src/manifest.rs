use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::color::Rgba;
use crate::compositor::{Compositor, ShadowStyle, MAX_SHADOW_BLUR, MAX_SHADOW_OFFSET, MAX_SURFACE_EDGE};
use crate::error::CompositeError;
use crate::error_codes::{CodedError, FONT_UNAVAILABLE, INVALID_MANIFEST};
use crate::geometry::Point;
use crate::overlay::{
    OverlayPatch, DEFAULT_FONT_SIZE, DEFAULT_POSITION, DEFAULT_TEXT, MAX_FONT_SIZE,
    MIN_FONT_SIZE,
};
use crate::source::{ImageSource, LocalResolver};
use crate::templates::{TemplateCatalog, DEFAULT_TEMPLATE_DIR};
use crate::text::{resolve_font_path, BlankRasterizer, GlyphPainter, TextRasterizer};

/// A YAML document describing one meme.
///
/// ```yaml
/// base: template:3            # or a path, data: URL, http(s):// or ipfs:// URL
/// output: { width: 1080, height: 1080 }
/// font: fonts/Impact.ttf      # optional
/// overlays:
///   - text: "one does not simply"
///     position: { x: 40, y: 20 }
///     font_size: 48
///     color: "#FFFFFF"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemeManifest {
    pub base: String,
    pub output: OutputSize,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    #[serde(default)]
    pub shadow: ShadowStyle,
    #[serde(default)]
    pub overlays: Vec<OverlaySpec>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlaySpec {
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default = "default_position")]
    pub position: Point,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub color: Rgba,
}

fn default_text() -> String {
    DEFAULT_TEXT.to_owned()
}

fn default_position() -> Point {
    DEFAULT_POSITION
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

impl OverlaySpec {
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.font_size < MIN_FONT_SIZE {
            bail!(
                "overlays[{index}]: font_size must be >= {MIN_FONT_SIZE}, got {}",
                self.font_size
            );
        }
        if self.font_size > MAX_FONT_SIZE {
            bail!(
                "overlays[{index}]: font_size must be <= {MAX_FONT_SIZE}, got {}",
                self.font_size
            );
        }
        if !self.position.x.is_finite() || !self.position.y.is_finite() {
            bail!("overlays[{index}]: position must be finite");
        }
        if self.position.x < 0.0 || self.position.y < 0.0 {
            bail!(
                "overlays[{index}]: position must be non-negative, got ({}, {})",
                self.position.x,
                self.position.y
            );
        }
        Ok(())
    }

    pub fn patch(&self) -> OverlayPatch {
        OverlayPatch {
            text: Some(self.text.clone()),
            font_step: None,
            font_size: Some(self.font_size),
            color: Some(self.color),
            position: Some(self.position),
        }
    }
}

impl MemeManifest {
    pub fn validate(&self) -> Result<()> {
        if self.base.trim().is_empty() {
            bail!("base cannot be empty");
        }
        let OutputSize { width, height } = self.output;
        if width == 0 || height == 0 {
            bail!("output must be positive, got {}x{}", width, height);
        }
        if width > MAX_SURFACE_EDGE || height > MAX_SURFACE_EDGE {
            bail!(
                "output edges are limited to {MAX_SURFACE_EDGE}px, got {}x{}",
                width,
                height
            );
        }
        if !(0.0..=1.0).contains(&self.shadow.opacity) {
            bail!("shadow.opacity must be within 0..=1, got {}", self.shadow.opacity);
        }
        if !(0.0..=MAX_SHADOW_BLUR).contains(&self.shadow.blur_sigma) {
            bail!(
                "shadow.blur_sigma must be within 0..={MAX_SHADOW_BLUR}, got {}",
                self.shadow.blur_sigma
            );
        }
        if !(-MAX_SHADOW_OFFSET..=MAX_SHADOW_OFFSET).contains(&self.shadow.offset) {
            bail!(
                "shadow.offset must be within -{MAX_SHADOW_OFFSET}..={MAX_SHADOW_OFFSET}, got {}",
                self.shadow.offset
            );
        }
        for (index, overlay) in self.overlays.iter().enumerate() {
            overlay.validate(index)?;
        }
        Ok(())
    }

    pub fn has_text(&self) -> bool {
        self.overlays.iter().any(|overlay| !overlay.text.is_empty())
    }
}

/// A validated manifest with every path resolved against its directory.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: MemeManifest,
    pub base: ImageSource,
    pub font: Option<PathBuf>,
    pub templates: TemplateCatalog,
}

impl LoadedManifest {
    /// Builds the rasterizer this manifest needs. Text overlays require a
    /// font; a text-free manifest falls back to [`BlankRasterizer`] when
    /// none can be found.
    pub fn rasterizer(&self) -> Result<Arc<dyn TextRasterizer>> {
        match resolve_font_path(self.font.as_deref()) {
            Ok(path) => {
                let painter = GlyphPainter::from_path(&path)?;
                tracing::debug!(font = %path.display(), sha256 = painter.fingerprint(), "font loaded");
                Ok(Arc::new(painter))
            }
            Err(error) if !self.manifest.has_text() => {
                tracing::debug!("no font needed: {error:#}");
                Ok(Arc::new(BlankRasterizer))
            }
            Err(error) => Err(anyhow!(CodedError::usage(FONT_UNAVAILABLE, format!("{error:#}")))),
        }
    }

    pub fn compositor(&self) -> Result<Compositor> {
        let resolver = LocalResolver::new(self.templates.clone());
        Ok(Compositor::new(self.rasterizer()?, Arc::new(resolver)).with_shadow(self.manifest.shadow))
    }
}

pub fn load_and_validate_manifest(path: &Path) -> Result<LoadedManifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: MemeManifest = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        let (line, column) = error
            .location()
            .map(|location| (location.line(), location.column()))
            .unzip();
        anyhow!(CodedError::usage(
            INVALID_MANIFEST,
            format!("failed to parse yaml in {} at {}: {}", path.display(), location, error),
        )
        .with_details(json!({ "file": path.display().to_string(), "line": line, "column": column })))
    })?;

    manifest
        .validate()
        .map_err(|error| anyhow!(CodedError::usage(INVALID_MANIFEST, format!("{}: {error}", path.display()))))?;

    let manifest_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let templates_dir = resolve_relative(
        &manifest_dir,
        manifest
            .templates_dir
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_TEMPLATE_DIR)),
    );
    let templates = TemplateCatalog::builtin(templates_dir);

    let base = match ImageSource::parse(&manifest.base).map_err(|error| {
        anyhow!(CodedError::usage(INVALID_MANIFEST, error.to_string()))
    })? {
        ImageSource::File(relative) => {
            let resolved = resolve_relative(&manifest_dir, &relative);
            if !resolved.is_file() {
                bail!(CompositeError::image_load(
                    resolved.display().to_string(),
                    "file does not exist"
                ));
            }
            ImageSource::File(resolved)
        }
        ImageSource::Template(id) => {
            if templates.get(&id).is_none() {
                bail!(CodedError::usage(
                    INVALID_MANIFEST,
                    format!("base references unknown template '{id}'"),
                )
                .with_details(json!({ "known": templates.templates().iter().map(|t| t.id.as_str()).collect::<Vec<_>>() })));
            }
            ImageSource::Template(id)
        }
        other => other,
    };

    let font = manifest
        .font
        .as_deref()
        .map(|font| resolve_existing_file(&manifest_dir, font, "font"))
        .transpose()?;

    Ok(LoadedManifest {
        manifest,
        base,
        font,
        templates,
    })
}

fn resolve_relative(manifest_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        manifest_dir.join(path)
    }
}

fn resolve_existing_file(manifest_dir: &Path, path: &Path, field_name: &str) -> Result<PathBuf> {
    let resolved = resolve_relative(manifest_dir, path);

    if !resolved.exists() {
        bail!(CodedError::usage(
            INVALID_MANIFEST,
            format!("{} does not exist: {}", field_name, resolved.display()),
        ));
    }

    if !resolved.is_file() {
        bail!(CodedError::usage(
            INVALID_MANIFEST,
            format!("{} is not a file: {}", field_name, resolved.display()),
        ));
    }

    Ok(resolved)
}
