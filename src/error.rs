//! Errors reported by compositing.

use thiserror::Error;

/// Why a composite request produced no image. Compositing is all-or-nothing:
/// every variant means no output was returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// The base image could not be fetched or decoded
    #[error("failed to load base image {source_label}: {reason}")]
    ImageLoad { source_label: String, reason: String },

    /// The render target is unusable
    #[error("cannot allocate {width}x{height} surface: {reason}")]
    Surface {
        width: u32,
        height: u32,
        reason: String,
    },

    /// The request was superseded or its session was reset
    #[error("compositing cancelled")]
    Cancelled,

    /// Compositing was requested before any base image was selected
    #[error("no base image selected")]
    NoBaseImage,

    /// The flattened surface could not be encoded
    #[error("failed to encode composite: {0}")]
    Encode(String),

    /// A collaborator panicked while rendering; the worker stays usable
    #[error("compositing failed unexpectedly: {0}")]
    Internal(String),
}

impl CompositeError {
    pub fn image_load(source_label: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            source_label: source_label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn surface(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::Surface {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used by the CLI error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ImageLoad { .. } => "IMAGE_LOAD_ERROR",
            Self::Surface { .. } => "SURFACE_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::NoBaseImage => "NO_BASE_IMAGE",
            Self::Encode(_) => "ENCODE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }
}
