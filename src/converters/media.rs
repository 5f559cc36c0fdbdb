//! Video → audio / animation / container via `ffmpeg`.
//!
//! The argument vector is fixed per target so the same request always runs
//! the same command line:
//!
//! ```text
//! ffmpeg -i <input> [-vn -acodec libmp3lame | -vf fps=10,scale=320:-1:flags=lanczos] -y <output>
//! ```
//!
//! ffmpeg writes the requested output path itself; no reconciliation step is
//! needed afterwards.

use crate::converter::{normalize_extension, ConvertOptions, Converter, ConverterMeta};
use crate::error::ConvertError;
use crate::process::CommandRunner;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const NAME: &str = "video-converter";

/// GIF filter chain: 10 fps, 320 px wide, aspect ratio kept.
const GIF_FILTER: &str = "fps=10,scale=320:-1:flags=lanczos";

/// Transcodes one video container extension through an external `ffmpeg`.
pub struct MediaConverter {
    meta: ConverterMeta,
    program: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl MediaConverter {
    pub const SOURCE_FORMATS: &'static [&'static str] = &[".mp4", ".avi", ".mov", ".mkv"];
    pub const TARGETS: &'static [&'static str] = &[".mp3", ".gif", ".wav", ".mkv", ".avi"];

    pub fn new(
        source_format: &str,
        program: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            meta: ConverterMeta::new(
                NAME,
                "Converts video files using FFmpeg.",
                &normalize_extension(source_format),
                Self::TARGETS,
            )?,
            program: program.into(),
            runner,
            timeout,
        })
    }

    /// Arguments passed to ffmpeg for `target` (normalised, leading dot).
    pub fn build_args(input: &Path, output: &Path, target: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.as_os_str().to_owned()];
        match target {
            ".mp3" => args.extend(["-vn", "-acodec", "libmp3lame"].map(OsString::from)),
            ".gif" => args.extend(["-vf", GIF_FILTER].map(OsString::from)),
            _ => {}
        }
        args.push("-y".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Converter for MediaConverter {
    fn meta(&self) -> &ConverterMeta {
        &self.meta
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        self.meta.ensure_supported(target)?;

        let args = Self::build_args(input, output, target);
        info!(
            "Running {}: {}",
            self.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let timeout = options.timeout.unwrap_or(self.timeout);
        self.runner
            .run(&self.program, &args, Some(timeout))
            .await?
            .ensure_success(NAME)
            .inspect_err(|e| error!("FFmpeg failed: {}", e))?;

        info!("Converted {} → {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(target: &str) -> Vec<String> {
        MediaConverter::build_args(Path::new("/in/clip.mp4"), Path::new("/out/clip.x"), target)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn mp3_extracts_audio() {
        assert_eq!(
            args_of(".mp3"),
            ["-i", "/in/clip.mp4", "-vn", "-acodec", "libmp3lame", "-y", "/out/clip.x"]
        );
    }

    #[test]
    fn gif_scales_and_limits_fps() {
        assert_eq!(
            args_of(".gif"),
            ["-i", "/in/clip.mp4", "-vf", "fps=10,scale=320:-1:flags=lanczos", "-y", "/out/clip.x"]
        );
    }

    #[test]
    fn container_targets_add_nothing() {
        for t in [".wav", ".mkv", ".avi"] {
            assert_eq!(args_of(t), ["-i", "/in/clip.mp4", "-y", "/out/clip.x"], "{t}");
        }
    }

    #[test]
    fn targets_carry_leading_dot() {
        let conv = MediaConverter::new(
            "mov",
            "ffmpeg",
            Arc::new(crate::process::SystemRunner),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(conv.meta().source_format, ".mov");
        assert!(conv.meta().supports(".mp3"));
        assert!(!conv.meta().supports("mp3"));
    }
}
