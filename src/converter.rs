//! The capability contract every converter unit implements.
//!
//! A unit is bound to exactly one source extension and declares, through its
//! [`ConverterMeta`], which target extensions it can produce. The registry
//! routes by source extension; the dispatcher checks the target against the
//! declaration before the unit is ever invoked.

use crate::error::ConvertError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Static metadata describing one converter unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterMeta {
    /// Unique name, e.g. `json2md` or `image-converter-png`.
    pub name: String,
    pub description: String,
    /// Source extension, lower-case with leading dot (e.g. `.docx`).
    pub source_format: String,
    /// Accepted target extensions, lower-case with leading dot. Never empty.
    pub supported_targets: Vec<String>,
}

impl ConverterMeta {
    /// Build a descriptor, normalising every extension and rejecting an empty
    /// target list.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source_format: &str,
        targets: &[&str],
    ) -> Result<Self, ConvertError> {
        let name = name.into();
        if targets.is_empty() {
            return Err(ConvertError::Internal(format!(
                "converter '{name}' declares no target formats"
            )));
        }
        Ok(Self {
            name,
            description: description.into(),
            source_format: normalize_extension(source_format),
            supported_targets: targets.iter().map(|t| normalize_extension(t)).collect(),
        })
    }

    pub fn supports(&self, target: &str) -> bool {
        self.supported_targets.iter().any(|t| t == target)
    }

    /// Fail with [`ConvertError::UnsupportedTarget`] unless `target` is declared.
    pub fn ensure_supported(&self, target: &str) -> Result<(), ConvertError> {
        if self.supports(target) {
            Ok(())
        } else {
            Err(ConvertError::UnsupportedTarget {
                target: target.to_string(),
                converter: self.name.clone(),
                supported: self.supported_targets.clone(),
            })
        }
    }
}

/// Per-call options passed through to [`Converter::convert`].
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// User password for encrypted PDF inputs.
    pub password: Option<String>,
    /// Overrides the configured subprocess timeout for this call.
    pub timeout: Option<Duration>,
}

/// A single conversion backend bound to one source format.
#[async_trait]
pub trait Converter: Send + Sync {
    fn meta(&self) -> &ConverterMeta;

    /// Cheap pre-check on the input before any output is written.
    async fn validate(&self, input: &Path) -> bool {
        let _ = input;
        true
    }

    /// Convert `input` into `output` as `target` (normalised, leading dot).
    ///
    /// Returns the path of the produced file. Implementations must fail with
    /// [`ConvertError::UnsupportedTarget`] before touching any file when
    /// `target` is not declared in [`Converter::meta`].
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError>;
}

/// Lower-case an extension and give it exactly one leading dot.
///
/// `"PDF"`, `".pdf"` and `" .Pdf "` all become `".pdf"`; an empty string
/// stays empty.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_ascii_lowercase())
    }
}

/// Extension of `path`'s file name, lower-cased with a leading dot, or `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}
