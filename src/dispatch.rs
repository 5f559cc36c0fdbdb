//! The dispatcher: validate a request, route it, run it, verify it.
//!
//! ```text
//! execute(input, output_dir, target)
//!  │
//!  ├─ 1. input exists?                        NotFound
//!  ├─ 2. registry.lookup(file name)           UnsupportedFormat
//!  ├─ 3. normalise target (trim, lower, '.')
//!  ├─ 4. target declared by the unit?         UnsupportedTarget
//!  ├─ 5. unit.validate(input)                 MalformedInput
//!  ├─ 6. output = output_dir/<stem><target>   OutputOverwritesInput if it is the input
//!  │     (directory created, stale output removed)
//!  ├─ 7. unit.convert(...)                    ConversionFailed / Timeout / ...
//!  └─ 8. produced file exists?                Internal
//! ```
//!
//! Steps 1–6 validate before touching the filesystem: a rejected request
//! writes nothing and spawns nothing.

use crate::config::ConverterConfig;
use crate::converter::{normalize_extension, ConvertOptions, Converter};
use crate::error::ConvertError;
use crate::progress::{ConversionObserver, ConversionStage, NoopObserver};
use crate::registry::Registry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes conversion requests to registered converter units.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    observer: Arc<dyn ConversionObserver>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("observer", &"<dyn ConversionObserver>")
            .finish()
    }
}

/// A request that passed validation.
struct Accepted {
    unit: Arc<dyn Converter>,
    target: String,
    output: PathBuf,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Build a private registry from `config`.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConvertError> {
        Ok(Self::new(Arc::new(Registry::from_config(config)?)))
    }

    /// Dispatcher over the process-wide registry, if it has been initialised.
    pub fn global() -> Option<Self> {
        Registry::global().map(Self::new)
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Source extension → declared targets.
    pub fn capabilities(&self) -> BTreeMap<String, Vec<String>> {
        self.registry.capabilities()
    }

    /// Convert `input` into `output_dir` as `target_format` with default options.
    pub async fn execute(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        target_format: &str,
    ) -> Result<PathBuf, ConvertError> {
        self.execute_with_options(input, output_dir, target_format, &ConvertOptions::default())
            .await
    }

    /// Convert `input` into `output_dir` as `target_format`.
    ///
    /// Returns the path of the produced file, `output_dir/<input stem><target>`.
    pub async fn execute_with_options(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        target_format: &str,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();
        self.emit(input, ConversionStage::Received);

        self.emit(input, ConversionStage::Validating);
        let accepted = match self.accept(input, output_dir, target_format).await {
            Ok(a) => a,
            Err(e) => {
                warn!("Rejected {}: {}", input.display(), e);
                self.emit(input, ConversionStage::Rejected(e.kind()));
                return Err(e);
            }
        };

        self.emit(input, ConversionStage::Executing);
        match self.run(input, output_dir, &accepted, options).await {
            Ok(produced) => {
                info!(
                    "{} → {} via {}",
                    input.display(),
                    produced.display(),
                    accepted.unit.meta().name
                );
                self.emit(input, ConversionStage::Succeeded);
                Ok(produced)
            }
            Err(e) => {
                warn!(
                    "{} failed on {}: {}",
                    accepted.unit.meta().name,
                    input.display(),
                    e
                );
                self.emit(input, ConversionStage::Failed(e.kind()));
                Err(e)
            }
        }
    }

    // ── Steps 1–6 ────────────────────────────────────────────────────────

    async fn accept(
        &self,
        input: &Path,
        output_dir: &Path,
        target_format: &str,
    ) -> Result<Accepted, ConvertError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConvertError::NotFound {
                path: input.to_path_buf(),
            });
        }

        let file_name = input.file_name().map(Path::new).unwrap_or(input);
        let unit = self.registry.lookup(file_name)?;
        let target = normalize_extension(target_format);
        unit.meta().ensure_supported(&target)?;

        if !unit.validate(input).await {
            return Err(ConvertError::MalformedInput {
                path: input.to_path_buf(),
                detail: format!(
                    "content is not a valid {} file",
                    unit.meta().source_format
                ),
            });
        }

        let output = output_path(input, output_dir, &target);
        if same_file(input, &output).await {
            return Err(ConvertError::OutputOverwritesInput {
                path: input.to_path_buf(),
            });
        }
        debug!(
            "Accepted {} for {} → {}",
            input.display(),
            unit.meta().name,
            output.display()
        );
        Ok(Accepted {
            unit,
            target,
            output,
        })
    }

    // ── Steps 6–8 ────────────────────────────────────────────────────────

    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        accepted: &Accepted,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            ConvertError::Internal(format!(
                "cannot create output directory {}: {e}",
                output_dir.display()
            ))
        })?;

        // A file left by an earlier run must not pass the existence check
        // below when the backend exits cleanly without writing anything.
        match tokio::fs::remove_file(&accepted.output).await {
            Ok(()) => debug!("Removed stale {}", accepted.output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConvertError::Internal(format!(
                    "cannot replace existing {}: {e}",
                    accepted.output.display()
                )))
            }
        }

        let produced = accepted
            .unit
            .convert(input, &accepted.output, &accepted.target, options)
            .await?;

        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConvertError::Internal(format!(
                "{} reported success but {} does not exist",
                accepted.unit.meta().name,
                produced.display()
            )));
        }
        Ok(produced)
    }

    fn emit(&self, input: &Path, stage: ConversionStage) {
        self.observer.on_stage(input, &stage);
    }
}

/// `output_dir/<stem of input><target>`.
pub fn output_path(input: &Path, output_dir: &Path, target: &str) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_owned();
    name.push(target);
    output_dir.join(name)
}

/// `true` when both paths name one file: spelled the same, or resolving to
/// the same place through links, `..` or a case-insensitive filesystem.
async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_swaps_extension() {
        assert_eq!(
            output_path(Path::new("/in/report.final.docx"), Path::new("/out"), ".pdf"),
            PathBuf::from("/out/report.final.pdf")
        );
        assert_eq!(
            output_path(Path::new("data.JSON"), Path::new("o"), ".md"),
            PathBuf::from("o/data.md")
        );
    }

    #[tokio::test]
    async fn same_file_sees_through_dot_dot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mkv");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(same_file(&file, &file).await);
        assert!(same_file(&file, &dir.path().join("sub/../clip.mkv")).await);
        assert!(!same_file(&file, &dir.path().join("clip.mp3")).await);
    }
}
