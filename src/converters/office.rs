//! Office documents → PDF via headless LibreOffice (`soffice`).
//!
//! soffice picks the output file name itself (`<input stem>.pdf` inside
//! `--outdir`) and has no switch to choose another one. A conversion is
//! therefore two steps: [`OfficeConverter::invoke`] runs the tool, then
//! [`reconcile_output`] moves the derived file onto the requested path when
//! the two differ.

use crate::converter::{normalize_extension, ConvertOptions, Converter, ConverterMeta};
use crate::error::ConvertError;
use crate::process::CommandRunner;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "office-converter";

/// Converts one office-document extension to PDF through an external `soffice`.
pub struct OfficeConverter {
    meta: ConverterMeta,
    program: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl OfficeConverter {
    pub const SOURCE_FORMATS: &'static [&'static str] = &[".docx", ".doc", ".pptx", ".xlsx", ".odt"];
    pub const TARGETS: &'static [&'static str] = &[".pdf"];

    pub fn new(
        source_format: &str,
        program: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            meta: ConverterMeta::new(
                NAME,
                "Converts Office documents using LibreOffice.",
                &normalize_extension(source_format),
                Self::TARGETS,
            )?,
            program: program.into(),
            runner,
            timeout,
        })
    }

    /// Arguments passed to soffice. `outdir` is the directory of the requested output.
    pub fn build_args(input: &Path, outdir: &Path) -> Vec<OsString> {
        vec![
            "--headless".into(),
            "--convert-to".into(),
            "pdf".into(),
            "--outdir".into(),
            outdir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }

    /// Run soffice and return the path it wrote to.
    pub async fn invoke(
        &self,
        input: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, ConvertError> {
        let outdir = output_dir_of(output);
        let args = Self::build_args(input, &outdir);
        info!(
            "Running {}: {}",
            self.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        self.runner
            .run(&self.program, &args, Some(timeout))
            .await?
            .ensure_success(NAME)
            .inspect_err(|e| error!("LibreOffice failed: {}", e))?;

        Ok(derived_output(input, &outdir))
    }
}

#[async_trait]
impl Converter for OfficeConverter {
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

        let timeout = options.timeout.unwrap_or(self.timeout);
        let derived = self.invoke(input, output, timeout).await?;
        reconcile_output(&derived, output).await?;

        info!("Converted {} → {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

/// `--outdir` for a requested output path; `.` when it has no parent.
fn output_dir_of(output: &Path) -> PathBuf {
    match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Where soffice puts its result: `<outdir>/<input stem>.pdf`.
pub fn derived_output(input: &Path, outdir: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_owned();
    name.push(".pdf");
    outdir.join(name)
}

/// Move the tool's output onto `requested` when the two paths differ.
///
/// A no-op when they are equal or when `derived` does not exist (the
/// dispatcher reports a missing output). Falls back to copy + remove when a
/// rename is not possible, e.g. across file systems.
pub async fn reconcile_output(derived: &Path, requested: &Path) -> Result<(), ConvertError> {
    if derived == requested {
        return Ok(());
    }
    if !tokio::fs::try_exists(derived).await.unwrap_or(false) {
        warn!("{} reported success but {} is missing", NAME, derived.display());
        return Ok(());
    }

    debug!("Moving {} → {}", derived.display(), requested.display());
    if let Err(rename_err) = tokio::fs::rename(derived, requested).await {
        debug!("rename failed ({}), copying instead", rename_err);
        tokio::fs::copy(derived, requested).await.map_err(|e| {
            ConvertError::failed(
                NAME,
                format!("moving {} → {}: {e}", derived.display(), requested.display()),
            )
        })?;
        if let Err(e) = tokio::fs::remove_file(derived).await {
            warn!("could not remove {}: {}", derived.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use tempfile::TempDir;

    /// Behaves like soffice: writes `<outdir>/<input stem>.pdf`.
    struct FakeSoffice;

    #[async_trait]
    impl CommandRunner for FakeSoffice {
        async fn run(
            &self,
            _program: &str,
            args: &[OsString],
            _timeout: Option<Duration>,
        ) -> Result<ProcessOutput, ConvertError> {
            let outdir = args
                .iter()
                .position(|a| a == "--outdir")
                .map(|i| PathBuf::from(&args[i + 1]))
                .unwrap();
            let input = PathBuf::from(args.last().unwrap());
            std::fs::write(derived_output(&input, &outdir), b"%PDF-1.7").unwrap();
            Ok(ProcessOutput::success())
        }
    }

    #[test]
    fn args_follow_soffice_convention() {
        let args: Vec<String> =
            OfficeConverter::build_args(Path::new("/in/report.docx"), Path::new("/out"))
                .into_iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
        assert_eq!(
            args,
            ["--headless", "--convert-to", "pdf", "--outdir", "/out", "/in/report.docx"]
        );
    }

    #[test]
    fn derived_name_uses_input_stem() {
        assert_eq!(
            derived_output(Path::new("/in/Q3 deck.pptx"), Path::new("/out")),
            PathBuf::from("/out/Q3 deck.pdf")
        );
    }

    #[test]
    fn bare_output_name_uses_current_dir() {
        assert_eq!(output_dir_of(Path::new("x.pdf")), PathBuf::from("."));
        assert_eq!(output_dir_of(Path::new("/o/x.pdf")), PathBuf::from("/o"));
    }

    #[tokio::test]
    async fn convert_relocates_to_a_differently_named_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, b"PK\x03\x04").unwrap();
        let requested = dir.path().join("final.pdf");
        let unit =
            OfficeConverter::new(".docx", "soffice", Arc::new(FakeSoffice), Duration::from_secs(5))
                .unwrap();

        let produced = unit
            .convert(&input, &requested, ".pdf", &ConvertOptions::default())
            .await
            .unwrap();

        assert_eq!(produced, requested);
        assert_eq!(std::fs::read(&requested).unwrap(), b"%PDF-1.7");
        assert!(!dir.path().join("report.pdf").exists());
    }

    #[tokio::test]
    async fn reconcile_is_noop_when_paths_match() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        reconcile_output(&path, &path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reconcile_moves_derived_file() {
        let dir = TempDir::new().unwrap();
        let derived = dir.path().join("report.pdf");
        let requested = dir.path().join("final.pdf");
        std::fs::write(&derived, b"%PDF-1.7").unwrap();

        reconcile_output(&derived, &requested).await.unwrap();

        assert!(!derived.exists());
        assert_eq!(std::fs::read(&requested).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn reconcile_tolerates_missing_derived() {
        let dir = TempDir::new().unwrap();
        let requested = dir.path().join("final.pdf");
        reconcile_output(&dir.path().join("nope.pdf"), &requested)
            .await
            .unwrap();
        assert!(!requested.exists());
    }
}
