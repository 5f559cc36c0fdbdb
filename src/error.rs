//! Error types for the edgequake-convert library.
//!
//! Every failure a conversion can hit is a [`ConvertError`]. Callers that
//! need to react to the *category* of failure rather than its exact variant
//! use [`ConvertError::kind`], which folds the variants into the six outcome
//! labels a front-end cares about:
//!
//! * client faults: [`ErrorKind::NotFound`], [`ErrorKind::UnsupportedFormat`],
//!   [`ErrorKind::UnsupportedTarget`], [`ErrorKind::MalformedInput`]
//! * server faults: [`ErrorKind::ConversionError`], [`ErrorKind::InternalError`]
//!
//! Diagnostic strings (`detail`, `reason`) are copied verbatim from parsers,
//! codecs and child-process stderr. Treat them as untrusted free-form text
//! when rendering them anywhere.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-convert library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// No converter is registered for the file's extension.
    #[error("Unsupported file format: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// The resolved converter does not declare the requested target.
    #[error("Target format '{target}' is not supported by {converter} (supported: {})", supported.join(", "))]
    UnsupportedTarget {
        target: String,
        converter: String,
        supported: Vec<String>,
    },

    /// The computed output path is the input itself.
    #[error("Converting '{path}' to its own format in place would overwrite it; choose another output directory")]
    OutputOverwritesInput { path: PathBuf },

    /// The input could not be parsed as the format its extension claims.
    #[error("Malformed input '{path}': {detail}")]
    MalformedInput { path: PathBuf, detail: String },

    /// A URL input could not be fetched.
    #[error("Failed to download '{url}': {reason}\nCheck the URL and your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// The backend (codec, pdfium, external tool) reported a failure.
    #[error("{converter} conversion failed: {detail}")]
    ConversionFailed { converter: String, detail: String },

    /// An external tool did not finish within the configured bound.
    #[error("'{program}' did not finish within {secs}s and was terminated")]
    Timeout { program: String, secs: u64 },

    // ── Registry errors ───────────────────────────────────────────────────
    /// Two converters claimed the same source extension (strict mode only).
    #[error("Extension '{extension}' is claimed by both {existing} and {replacement}")]
    DuplicateRegistration {
        extension: String,
        existing: String,
        replacement: String,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A converter broke its contract, or an invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Shorthand for [`ConvertError::ConversionFailed`].
    pub fn failed(converter: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::ConversionFailed {
            converter: converter.into(),
            detail: detail.to_string(),
        }
    }

    /// The outcome label this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::DownloadFailed { .. } => ErrorKind::NotFound,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::UnsupportedTarget { .. } | Self::OutputOverwritesInput { .. } => {
                ErrorKind::UnsupportedTarget
            }
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::ConversionFailed { .. } | Self::Timeout { .. } => ErrorKind::ConversionError,
            Self::DuplicateRegistration { .. } | Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// `true` when the caller, not the service, is at fault.
    pub fn is_client_fault(&self) -> bool {
        self.kind().is_client_fault()
    }
}

/// Terminal outcome categories for a rejected or failed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    UnsupportedTarget,
    MalformedInput,
    ConversionError,
    InternalError,
}

impl ErrorKind {
    pub fn is_client_fault(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::UnsupportedFormat | Self::UnsupportedTarget | Self::MalformedInput
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UnsupportedFormat => "unsupported_format",
            Self::UnsupportedTarget => "unsupported_target",
            Self::MalformedInput => "malformed_input",
            Self::ConversionError => "conversion_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
