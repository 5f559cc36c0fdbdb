//! CLI binary for edgequake-convert.
//!
//! A thin shim over the library crate: maps CLI flags to `ConverterConfig`,
//! stages each input into a private workspace, runs the dispatcher, copies
//! the result to its destination and schedules workspace cleanup.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_convert::{
    schedule_cleanup, stage_input, ConversionObserver, ConversionStage, ConvertError,
    ConvertOptions, ConverterConfig, Dispatcher, Registry,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal progress: one bar for the whole batch, the message line shows
/// the stage of the most recently active input.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn report(&self, outcome: &Outcome) {
        let line = match (&outcome.output, &outcome.error) {
            (Some(out), _) => format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                outcome.input,
                out.display(),
                dim(&format!("{:.1}s", outcome.elapsed_ms as f64 / 1000.0)),
            ),
            (None, Some(err)) => format!(
                "  {} {}  {}",
                red("✗"),
                outcome.input,
                red(&format!("[{}] {}", err.kind, err.message)),
            ),
            (None, None) => format!("  {} {}", red("?"), outcome.input),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }
}

impl ConversionObserver for CliProgress {
    fn on_stage(&self, input: &Path, stage: &ConversionStage) {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(format!("{name}: {stage}"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # JSON to Markdown (written next to the input)
  edgeconvert --to md data.json

  # Several files into one directory, 8 at a time
  edgeconvert --to pdf -o out/ -c 8 *.docx *.pptx

  # Extract audio from a video
  edgeconvert --to mp3 talk.mp4 -o talk.mp3

  # Convert a remote PDF to Word
  edgeconvert --to docx https://arxiv.org/pdf/1706.03762.pdf

  # What can be converted to what
  edgeconvert --capabilities --json

SUPPORTED CONVERSIONS:
  Source                          Targets                        Backend
  ──────────────────────────────  ─────────────────────────────  ─────────
  .json                           .md                            built-in
  .jpg .jpeg .png .webp           .png .jpg .jpeg .webp .pdf     built-in
  .pdf                            .docx .png .txt .md            pdfium
  .mp4 .avi .mov .mkv             .mp3 .gif .wav .mkv .avi       ffmpeg
  .docx .doc .pptx .xlsx .odt     .pdf                           soffice

EXIT STATUS:
  0  every input converted
  2  at least one input was rejected (missing, unsupported, malformed)
  1  otherwise (a backend failed or timed out)

ENVIRONMENT VARIABLES:
  Every option can be set through EDGECONVERT_<OPTION>, e.g.
  EDGECONVERT_FFMPEG=/opt/ffmpeg/bin/ffmpeg or EDGECONVERT_TIMEOUT=120.
  PDFIUM_LIB_PATH        libpdfium file, or a directory holding it
  PDFIUM_AUTO_CACHE_DIR  Where a downloaded libpdfium is kept
                         (default: ~/.cache/edgeconvert/pdfium-<version>/)
  RUST_LOG          Override the log filter (e.g. edgequake_convert=debug)
"#;

/// Convert files and URLs between formats.
#[derive(Parser, Debug)]
#[command(
    name = "edgeconvert",
    version,
    about = "Convert files and URLs between formats (JSON, images, PDF, video, office)",
    long_about = "Convert local files or HTTP/HTTPS URLs by routing each one to a converter \
chosen from its extension. JSON, images and PDF are handled in-process; video goes through \
ffmpeg and office documents through LibreOffice (soffice).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "capabilities")]
    inputs: Vec<String>,

    /// Target extension, with or without the dot (md, .pdf, MP3).
    #[arg(short, long, env = "EDGECONVERT_TO", required_unless_present = "capabilities")]
    to: Option<String>,

    /// Output file (single input) or directory (several inputs).
    #[arg(short, long, env = "EDGECONVERT_OUTPUT")]
    output: Option<PathBuf>,

    /// Number of inputs converted at the same time.
    #[arg(short, long, env = "EDGECONVERT_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=256))]
    concurrency: u16,

    /// ffmpeg executable.
    #[arg(long, env = "EDGECONVERT_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: String,

    /// LibreOffice executable.
    #[arg(long, env = "EDGECONVERT_SOFFICE", default_value = "soffice")]
    soffice: String,

    /// Upper bound on one ffmpeg/soffice run, in seconds.
    #[arg(long, env = "EDGECONVERT_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Width in pixels of the rendered first page (PDF → PNG).
    #[arg(long, env = "EDGECONVERT_RENDER_WIDTH", default_value_t = 1240)]
    render_width: u32,

    /// pdfium shared library, or a directory holding it. Without it the
    /// library is looked up in the cache and downloaded on first use.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "EDGECONVERT_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EDGECONVERT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Fail at startup if two converters claim one extension.
    #[arg(long, env = "EDGECONVERT_STRICT_REGISTRY")]
    strict_registry: bool,

    /// List source → target conversions and exit.
    #[arg(long)]
    capabilities: bool,

    /// Print results (or capabilities) as JSON on stdout.
    #[arg(long, env = "EDGECONVERT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDGECONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGECONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGECONVERT_QUIET")]
    quiet: bool,
}

/// Per-input result, printed as a line or serialised with `--json`.
#[derive(Debug, Serialize)]
struct Outcome {
    input: String,
    output: Option<PathBuf>,
    error: Option<OutcomeError>,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct OutcomeError {
    kind: edgequake_convert::ErrorKind,
    client_fault: bool,
    message: String,
}

impl From<&ConvertError> for OutcomeError {
    fn from(e: &ConvertError) -> Self {
        Self {
            kind: e.kind(),
            client_fault: e.is_client_fault(),
            message: e.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.capabilities;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Registry ─────────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let registry = Registry::init_global(&config).context("Failed to build converter registry")?;

    if cli.capabilities {
        print_capabilities(&registry, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    let target = cli.to.clone().context("--to is required")?;

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // Only batches that touch a PDF need it. An explicit --pdfium-lib is
    // trusted as is; otherwise the first run downloads the library into the
    // user cache and later runs find it there.
    if cli.pdfium_lib.is_none() && needs_pdfium(&cli.inputs, &target) {
        ensure_pdf_engine(cli.quiet || cli.json)?;
    }

    let progress = show_progress.then(|| CliProgress::new(cli.inputs.len()));
    let mut dispatcher = Dispatcher::new(registry);
    if let Some(ref p) = progress {
        dispatcher = dispatcher.with_observer(p.clone() as Arc<dyn ConversionObserver>);
    }

    let options = ConvertOptions {
        password: cli.password.clone(),
        timeout: None,
    };
    let plan = plan_destinations(&cli.inputs, cli.output.as_deref());

    // ── Run conversions ──────────────────────────────────────────────────
    let started = Instant::now();
    let mut results = stream::iter(plan.into_iter().map(|(input, dest)| {
        let dispatcher = &dispatcher;
        let target = target.as_str();
        let options = &options;
        let download_timeout = cli.download_timeout;
        async move {
            let t0 = Instant::now();
            let (result, cleanup) =
                convert_one(dispatcher, &input, &dest, target, options, download_timeout).await;
            let outcome = Outcome {
                output: result.as_ref().ok().cloned(),
                error: result.as_ref().err().map(OutcomeError::from),
                input,
                elapsed_ms: t0.elapsed().as_millis(),
            };
            (outcome, cleanup)
        }
    }))
    .buffer_unordered(usize::from(cli.concurrency));

    let mut outcomes = Vec::with_capacity(cli.inputs.len());
    let mut cleanups: Vec<JoinHandle<()>> = Vec::new();
    while let Some((outcome, cleanup)) = results.next().await {
        match progress {
            Some(ref p) => p.report(&outcome),
            None if !cli.quiet && !cli.json => print_outcome(&outcome),
            None => {}
        }
        cleanups.extend(cleanup);
        outcomes.push(outcome);
    }
    drop(results);

    // Workspaces are removed in the background; wait so nothing is left
    // behind when the process exits.
    for handle in cleanups {
        let _ = handle.await;
    }

    // ── Summary ──────────────────────────────────────────────────────────
    let failed: Vec<&OutcomeError> = outcomes.iter().filter_map(|o| o.error.as_ref()).collect();
    if let Some(ref p) = progress {
        p.bar.finish_and_clear();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcomes).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        let ok = outcomes.len() - failed.len();
        eprintln!(
            "{} {}/{} converted in {}ms",
            if failed.is_empty() { green("✔") } else { red("✘") },
            bold(&ok.to_string()),
            outcomes.len(),
            started.elapsed().as_millis(),
        );
    } else {
        for o in &outcomes {
            if let Some(ref e) = o.error {
                eprintln!("{}: {}", o.input, e.message);
            }
        }
    }

    Ok(ExitCode::from(exit_code(&failed)))
}

/// Map CLI args to `ConverterConfig`.
/// Whether any conversion in the batch goes through pdfium: PDF sources,
/// and images wrapped into a PDF.
fn needs_pdfium(inputs: &[String], target: &str) -> bool {
    let target = target.trim().trim_start_matches('.').to_ascii_lowercase();
    inputs.iter().any(|input| {
        let name = input.split(['?', '#']).next().unwrap_or(input);
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        ext == "pdf" || (target == "pdf" && matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp"))
    })
}

#[cfg(feature = "bundled")]
fn ensure_pdf_engine(_quiet: bool) -> Result<()> {
    tokio::task::block_in_place(pdfium_auto::ensure_pdfium_bundled)
        .context("Failed to extract bundled PDFium engine")?;
    Ok(())
}

#[cfg(not(feature = "bundled"))]
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_available() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length() != Some(t) {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .ffmpeg_path(cli.ffmpeg.clone())
        .soffice_path(cli.soffice.clone())
        .subprocess_timeout_secs(cli.timeout)
        .render_width(cli.render_width)
        .strict_registry(cli.strict_registry);
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    builder.build().context("Invalid configuration")
}

/// 0 when nothing failed, 2 when any failure is the caller's fault, else 1.
fn exit_code(failed: &[&OutcomeError]) -> u8 {
    if failed.is_empty() {
        0
    } else if failed.iter().any(|e| e.client_fault) {
        2
    } else {
        1
    }
}

/// Where the converted file for each input should end up.
///
/// * no `-o`: next to a local input, in the working directory for a URL;
/// * one input and `-o` not an existing directory: exactly `-o`;
/// * otherwise `-o` is a directory.
fn plan_destinations(inputs: &[String], output: Option<&Path>) -> Vec<(String, Destination)> {
    let single_file = match output {
        Some(o) => inputs.len() == 1 && !o.is_dir() && !o.to_string_lossy().ends_with('/'),
        None => false,
    };
    inputs
        .iter()
        .map(|input| {
            let dest = match output {
                Some(o) if single_file => Destination::File(o.to_path_buf()),
                Some(o) => Destination::Dir(o.to_path_buf()),
                None if edgequake_convert::is_url(input) => Destination::Dir(PathBuf::from(".")),
                None => Destination::Dir(
                    Path::new(input)
                        .parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from(".")),
                ),
            };
            (input.clone(), dest)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Destination {
    File(PathBuf),
    Dir(PathBuf),
}

/// Stage, convert and copy out one input; returns the cleanup task for its workspace.
async fn convert_one(
    dispatcher: &Dispatcher,
    input: &str,
    dest: &Destination,
    target: &str,
    options: &ConvertOptions,
    download_timeout: u64,
) -> (Result<PathBuf, ConvertError>, Option<JoinHandle<()>>) {
    let staged = match stage_input(input, download_timeout).await {
        Ok(s) => s,
        Err(e) => return (Err(e), None),
    };

    let result = match dispatcher
        .execute_with_options(&staged.input, &staged.output_dir, target, options)
        .await
    {
        Ok(produced) => deliver(&produced, dest).await,
        Err(e) => Err(e),
    };

    let cleanup = schedule_cleanup(vec![staged.workspace]);
    (result, Some(cleanup))
}

/// Copy the produced file out of its workspace.
async fn deliver(produced: &Path, dest: &Destination) -> Result<PathBuf, ConvertError> {
    let final_path = match dest {
        Destination::File(f) => f.clone(),
        Destination::Dir(d) => d.join(produced.file_name().unwrap_or_default()),
    };
    if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ConvertError::Internal(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    tokio::fs::copy(produced, &final_path).await.map_err(|e| {
        ConvertError::Internal(format!(
            "cannot copy result to {}: {e}",
            final_path.display()
        ))
    })?;
    Ok(final_path)
}

fn print_outcome(outcome: &Outcome) {
    match (&outcome.output, &outcome.error) {
        (Some(out), _) => eprintln!("{} {} → {}", green("✓"), outcome.input, out.display()),
        (None, Some(err)) => eprintln!("{} {}: {}", red("✗"), outcome.input, err.message),
        (None, None) => {}
    }
}

fn print_capabilities(registry: &Registry, json: bool) -> Result<()> {
    let caps = registry.capabilities();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&caps).context("Failed to serialise capabilities")?
        );
        return Ok(());
    }
    for (source, unit) in registry.converters() {
        println!(
            "{:<7} → {:<32} {}",
            source,
            caps.get(source).map(|t| t.join(" ")).unwrap_or_default(),
            dim(&unit.meta().name),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_convert_invocation() {
        let cli = Cli::try_parse_from(["edgeconvert", "--to", "pdf", "-c", "2", "a.docx", "b.pptx"])
            .unwrap();
        assert_eq!(cli.to.as_deref(), Some("pdf"));
        assert_eq!(cli.inputs, vec!["a.docx", "b.pptx"]);
        assert_eq!(cli.concurrency, 2);
        assert_eq!(cli.timeout, 600);
    }

    #[test]
    fn capabilities_needs_no_target() {
        let cli = Cli::try_parse_from(["edgeconvert", "--capabilities", "--json"]).unwrap();
        assert!(cli.capabilities && cli.json);
        assert!(cli.inputs.is_empty());
    }

    #[test]
    fn target_is_required_for_conversion() {
        assert!(Cli::try_parse_from(["edgeconvert", "a.json"]).is_err());
    }

    #[test]
    fn destinations_default_next_to_input() {
        let plan = plan_destinations(
            &["docs/a.json".to_string(), "https://x/y.png".to_string()],
            None,
        );
        assert_eq!(plan[0].1, Destination::Dir(PathBuf::from("docs")));
        assert_eq!(plan[1].1, Destination::Dir(PathBuf::from(".")));
    }

    #[test]
    fn single_input_output_is_a_file() {
        let plan = plan_destinations(&["a.json".to_string()], Some(Path::new("/tmp/nope/x.md")));
        assert_eq!(plan[0].1, Destination::File(PathBuf::from("/tmp/nope/x.md")));

        let plan = plan_destinations(
            &["a.json".to_string(), "b.json".to_string()],
            Some(Path::new("out")),
        );
        assert!(plan.iter().all(|(_, d)| *d == Destination::Dir(PathBuf::from("out"))));
    }

    #[test]
    fn pdf_engine_only_for_pdf_work() {
        let inputs = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(needs_pdfium(&inputs(&["a.json", "paper.PDF"]), "md"));
        assert!(needs_pdfium(&inputs(&["https://x/doc.pdf?dl=1"]), "txt"));
        assert!(needs_pdfium(&inputs(&["scan.png"]), ".PDF"));
        assert!(!needs_pdfium(&inputs(&["scan.png"]), "webp"));
        assert!(!needs_pdfium(&inputs(&["a.json", "talk.mp4"]), "mp3"));
        assert!(!needs_pdfium(&inputs(&["report.docx"]), "pdf"));
    }

    #[test]
    fn exit_code_prefers_client_fault() {
        let client = OutcomeError::from(&ConvertError::UnsupportedFormat {
            extension: ".xyz".into(),
        });
        let server = OutcomeError::from(&ConvertError::failed("x", "boom"));
        assert_eq!(exit_code(&[]), 0);
        assert_eq!(exit_code(&[&server]), 1);
        assert_eq!(exit_code(&[&server, &client]), 2);
    }
}
