use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

use crate::error::CompositeError;

pub const INVALID_MANIFEST: &str = "INVALID_MANIFEST";
pub const FONT_UNAVAILABLE: &str = "FONT_UNAVAILABLE";
pub const INTERNAL: &str = "INTERNAL";

/// Usage errors are the caller's input; render errors happened while
/// producing the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    Usage,
    Render,
}

impl CodedErrorKind {
    /// Process exit status: 2 for usage, 1 for render failures.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Usage => 2,
            Self::Render => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Usage,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl From<&CompositeError> for CodedError {
    fn from(error: &CompositeError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            details: None,
            kind: CodedErrorKind::Render,
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Best code for an arbitrary error chain: an explicit [`CodedError`], then
/// a [`CompositeError`], then [`INTERNAL`].
pub fn classify(error: &Error) -> CodedError {
    if let Some(coded) = find_coded_error(error) {
        return coded.clone();
    }
    if let Some(composite) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CompositeError>())
    {
        return CodedError::from(composite);
    }
    CodedError {
        code: INTERNAL,
        message: format!("{error:#}"),
        details: None,
        kind: CodedErrorKind::Render,
    }
}
