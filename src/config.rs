//! Configuration for converter discovery and execution.
//!
//! Every knob the converters read at construction time lives in
//! [`ConverterConfig`], built via its [`ConverterConfigBuilder`]. Per-call
//! knobs (a PDF password, a one-off timeout) travel separately in
//! [`crate::converter::ConvertOptions`] so the registry can stay immutable.

use crate::error::ConvertError;
use crate::process::{CommandRunner, SystemRunner};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration used when the registry instantiates converters.
///
/// # Example
/// ```rust
/// use edgequake_convert::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .ffmpeg_path("/usr/local/bin/ffmpeg")
///     .subprocess_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.subprocess_timeout_secs, 120);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Media transcoder executable. Default: `ffmpeg` (resolved through `PATH`).
    pub ffmpeg_path: String,

    /// Office converter executable. Default: `soffice` (resolved through `PATH`).
    pub soffice_path: String,

    /// Upper bound on a single external-tool run, in seconds. Default: 600.
    ///
    /// A hung ffmpeg or LibreOffice would otherwise hold its request forever.
    /// When the bound expires the child is killed and the call fails with
    /// [`ConvertError::Timeout`].
    pub subprocess_timeout_secs: u64,

    /// Target width in pixels when rasterising the first page of a PDF. Default: 1240.
    pub render_width: u32,

    /// Cap on the rendered page height in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// The pdfium shared library, or the directory holding it. If `None` (or
    /// nothing is there), `PDFIUM_LIB_PATH`, the download cache, the working
    /// directory and the system library search path are tried in that order.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Indentation width used when pretty-printing JSON. Default: 4.
    pub json_indent: usize,

    /// Fail registry construction when two converters claim one extension.
    /// Default: false (a warning is logged and the later one wins).
    pub strict_registry: bool,

    /// Process runner for the external-tool converters. `None` uses [`SystemRunner`].
    pub runner: Option<Arc<dyn CommandRunner>>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            soffice_path: "soffice".to_string(),
            subprocess_timeout_secs: 600,
            render_width: 1240,
            max_rendered_pixels: 4000,
            pdfium_lib_path: None,
            json_indent: 4,
            strict_registry: false,
            runner: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("soffice_path", &self.soffice_path)
            .field("subprocess_timeout_secs", &self.subprocess_timeout_secs)
            .field("render_width", &self.render_width)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("json_indent", &self.json_indent)
            .field("strict_registry", &self.strict_registry)
            .field("runner", &self.runner.as_ref().map(|_| "<dyn CommandRunner>"))
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// The runner external-tool converters should use.
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        match self.runner {
            Some(ref runner) => Arc::clone(runner),
            None => Arc::new(SystemRunner),
        }
    }

    pub fn subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.subprocess_timeout_secs)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<String>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn subprocess_timeout_secs(mut self, secs: u64) -> Self {
        self.config.subprocess_timeout_secs = secs.max(1);
        self
    }

    pub fn render_width(mut self, px: u32) -> Self {
        self.config.render_width = px.clamp(16, 10_000);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn json_indent(mut self, width: usize) -> Self {
        self.config.json_indent = width.min(16);
        self
    }

    pub fn strict_registry(mut self, v: bool) -> Self {
        self.config.strict_registry = v;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.config.runner = Some(runner);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if c.ffmpeg_path.trim().is_empty() || c.soffice_path.trim().is_empty() {
            return Err(ConvertError::Internal(
                "Invalid configuration: tool paths must not be empty".into(),
            ));
        }
        if c.subprocess_timeout_secs == 0 {
            return Err(ConvertError::Internal(
                "Invalid configuration: subprocess timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tool_names() {
        let c = ConverterConfig::default();
        assert_eq!(c.ffmpeg_path, "ffmpeg");
        assert_eq!(c.soffice_path, "soffice");
        assert_eq!(c.json_indent, 4);
        assert!(!c.strict_registry);
    }

    #[test]
    fn builder_clamps_values() {
        let c = ConverterConfig::builder()
            .subprocess_timeout_secs(0)
            .render_width(1)
            .json_indent(99)
            .build()
            .unwrap();
        assert_eq!(c.subprocess_timeout_secs, 1);
        assert_eq!(c.render_width, 16);
        assert_eq!(c.json_indent, 16);
    }

    #[test]
    fn empty_tool_path_is_rejected() {
        let err = ConverterConfig::builder().ffmpeg_path("  ").build().unwrap_err();
        assert!(err.to_string().contains("tool paths"));
    }

    #[test]
    fn debug_hides_runner() {
        let c = ConverterConfig::builder()
            .runner(Arc::new(SystemRunner))
            .build()
            .unwrap();
        assert!(format!("{c:?}").contains("<dyn CommandRunner>"));
    }
}
