//! # edgequake-convert
//!
//! Convert files between formats by routing each one to a pluggable backend
//! chosen from its extension.
//!
//! ## Why this crate?
//!
//! Format conversion usually means gluing together a handful of unrelated
//! tools: a JSON pretty-printer, an image codec, a PDF engine, ffmpeg,
//! LibreOffice. Each has its own calling convention and failure modes. This
//! crate puts them behind one contract ([`Converter`]), one routing table
//! ([`Registry`]) and one entry point ([`Dispatcher::execute`]) that reports
//! every failure as a typed [`ConvertError`].
//!
//! ## Backends
//!
//! | Unit | Sources | Targets | Runs |
//! |------|---------|---------|------|
//! | `json2md` | `.json` | `.md` | in-process |
//! | `image-converter-<ext>` | `.jpg .jpeg .png .webp` | `.png .jpg .jpeg .webp .pdf` | in-process |
//! | `pdf-converter` | `.pdf` | `.docx .png .txt .md` | in-process (pdfium) |
//! | `video-converter` | `.mp4 .avi .mov .mkv` | `.mp3 .gif .wav .mkv .avi` | `ffmpeg` |
//! | `office-converter` | `.docx .doc .pptx .xlsx .odt` | `.pdf` | `soffice` |
//!
//! ## Request Flow
//!
//! ```text
//! input path
//!  │
//!  ├─ 1. Route     registry lookup by lower-cased extension
//!  ├─ 2. Validate  target declared? content plausible?
//!  ├─ 3. Convert   in-process (spawn_blocking) or child process (bounded wait)
//!  └─ 4. Verify    the reported output file exists
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_convert::{ConverterConfig, Dispatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::from_config(&ConverterConfig::default())?;
//!     let out = dispatcher.execute("report.json", "out/", "md").await?;
//!     println!("wrote {}", out.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeconvert` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-convert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod converter;
pub mod converters;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod process;
pub mod progress;
pub mod registry;
pub mod text;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::schedule_cleanup;
pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use converter::{normalize_extension, ConvertOptions, Converter, ConverterMeta};
pub use dispatch::Dispatcher;
pub use error::{ConvertError, ErrorKind};
pub use input::{is_url, stage_input, StagedInput};
pub use process::{CommandRunner, ProcessOutput, SystemRunner};
pub use progress::{ConversionObserver, ConversionStage, NoopObserver};
pub use registry::{Registration, Registry, RegistryBuilder, REGISTRATIONS};
