//! # pdfium-auto
//!
//! Make the [PDFium](https://pdfium.googlesource.com/pdfium/) shared library
//! available to `pdfium-render` without manual installation.
//!
//! ## Resolution order
//!
//! [`find_pdfium_library`] never touches the network. It checks, in order:
//!
//! 1. an explicit hint (a library file, or a directory holding one);
//! 2. `PDFIUM_LIB_PATH` (file or directory);
//! 3. the per-version cache, `~/.cache/edgeconvert/pdfium-{VERSION}/`;
//! 4. the working directory.
//!
//! [`ensure_pdfium_library`] adds a fifth step: download the platform archive
//! from [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//! and unpack the library into the cache. With the `bundled` feature,
//! [`ensure_pdfium_bundled`] unpacks a copy embedded at compile time instead.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_auto::{bind_pdfium_from_path, ensure_pdfium_library};
//!
//! let path = ensure_pdfium_library(Some(&|downloaded, total| {
//!     if let Some(t) = total {
//!         eprint!("\rDownloading PDFium: {}/{} bytes", downloaded, t);
//!     }
//! })).expect("download failed");
//! let pdfium = bind_pdfium_from_path(&path).expect("bind failed");
//! ```
//!
//! ## Environment variable overrides
//!
//! - `PDFIUM_LIB_PATH`: existing pdfium library (or its directory); skips download.
//! - `PDFIUM_AUTO_CACHE_DIR`: override the default cache directory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

/// Directory name under the user cache directory.
const CACHE_NAMESPACE: &str = "edgeconvert";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by pdfium-auto operations.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    /// The current OS/architecture combination has no published binary.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create or write the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform metadata ────────────────────────────────────────────────────────

struct PlatformInfo {
    /// Asset filename in the GitHub release, e.g. `pdfium-mac-arm64.tgz`.
    archive_name: &'static str,
    /// Relative path inside the archive, e.g. `lib/libpdfium.dylib`.
    lib_path_in_archive: &'static str,
    /// Filename on disk, e.g. `libpdfium.dylib`.
    lib_name: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, PdfiumAutoError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_for(os: &str, arch: &str) -> Result<PlatformInfo, PdfiumAutoError> {
    let (archive_name, lib_path_in_archive, lib_name) = match (os, arch) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
        (os, arch) => {
            return Err(PdfiumAutoError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(PlatformInfo {
        archive_name,
        lib_path_in_archive,
        lib_name,
    })
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Per-version cache directory for the PDFium library.
///
/// Defaults to `<user cache dir>/edgeconvert/pdfium-{VERSION}/`; override
/// the base with `PDFIUM_AUTO_CACHE_DIR`.
pub fn pdfium_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("PDFIUM_AUTO_CACHE_DIR") {
        return versioned(Path::new(&override_dir));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    versioned(&base.join(CACHE_NAMESPACE))
}

fn versioned(base: &Path) -> PathBuf {
    base.join(format!("pdfium-{PDFIUM_VERSION}"))
}

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Lookup (no network) ──────────────────────────────────────────────────────

/// The library file a hint refers to: the hint itself when it is a file, or
/// the platform library inside it when it is a directory.
pub fn library_in(hint: &Path) -> Option<PathBuf> {
    if hint.is_file() {
        return Some(hint.to_path_buf());
    }
    if hint.is_dir() {
        let candidate = hint.join(detect_platform().ok()?.lib_name);
        return candidate.is_file().then_some(candidate);
    }
    None
}

/// Find an already-present PDFium library without downloading anything.
///
/// See the crate docs for the resolution order.
pub fn find_pdfium_library(hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(found) = hint.and_then(library_in) {
        return Some(found);
    }
    if let Some(path) = RESOLVED_PATH.get() {
        return Some(path.clone());
    }
    if let Some(found) = std::env::var_os("PDFIUM_LIB_PATH").and_then(|p| library_in(Path::new(&p))) {
        return Some(found);
    }
    if let Some(found) = library_in(&pdfium_cache_dir()) {
        return Some(found);
    }
    library_in(Path::new("."))
}

/// `true` when [`find_pdfium_library`] would succeed without a download.
pub fn is_pdfium_available() -> bool {
    find_pdfium_library(None).is_some()
}

// ── Provisioning ─────────────────────────────────────────────────────────────

/// Ensure the PDFium library is on disk, downloading it on first use.
///
/// `on_progress` receives `(bytes_downloaded, total_size)` during the
/// download. Safe to call from several threads; the resolved path is
/// remembered for the rest of the process.
pub fn ensure_pdfium_library(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = find_pdfium_library(None) {
        let _ = RESOLVED_PATH.set(path.clone());
        return Ok(path);
    }
    if let Some(p) = std::env::var_os("PDFIUM_LIB_PATH") {
        warn!(
            "PDFIUM_LIB_PATH '{}' holds no pdfium library; downloading",
            Path::new(&p).display()
        );
    }

    let info = detect_platform()?;
    let cache_dir = pdfium_cache_dir();
    let lib_path = cache_dir.join(info.lib_name);

    let url = format!(
        "{}/chromium%2F{}/{}",
        BASE_URL, PDFIUM_VERSION, info.archive_name
    );
    info!("Downloading PDFium {} from {}", PDFIUM_VERSION, url);

    std::fs::create_dir_all(&cache_dir).map_err(PdfiumAutoError::CacheDir)?;
    let archive_bytes = download_bytes(&url, on_progress)?;
    extract_library(&archive_bytes, info.lib_path_in_archive, &lib_path)?;

    let _ = RESOLVED_PATH.set(lib_path.clone());
    Ok(lib_path)
}

#[cfg(feature = "bundled")]
mod bundled {
    include!(concat!(env!("OUT_DIR"), "/bundled.rs"));
}

/// Unpack the library embedded at compile time into the cache directory.
///
/// Rewrites the cached copy when its size differs from the embedded bytes.
#[cfg(feature = "bundled")]
pub fn ensure_pdfium_bundled() -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let info = detect_platform()?;
    let cache_dir = pdfium_cache_dir();
    let lib_path = cache_dir.join(info.lib_name);

    let current = std::fs::metadata(&lib_path)
        .map(|m| m.len() == bundled::PDFIUM_BYTES.len() as u64)
        .unwrap_or(false);
    if !current {
        debug!("Unpacking bundled PDFium to {}", lib_path.display());
        std::fs::create_dir_all(&cache_dir).map_err(PdfiumAutoError::CacheDir)?;
        write_atomic(&lib_path, bundled::PDFIUM_BYTES)?;
    }

    let _ = RESOLVED_PATH.set(lib_path.clone());
    Ok(lib_path)
}

/// Bind to a PDFium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Stream a URL into memory, calling `on_progress` every 64 KiB.
fn download_bytes(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut buf = Vec::with_capacity(total.unwrap_or(35 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("Read error: {e}"))),
        }
    }

    debug!("Downloaded {} bytes", downloaded);
    Ok(buf)
}

/// Extract one file from a gzipped tar archive into `dest_path`.
fn extract_library(
    archive_bytes: &[u8],
    lib_path_in_archive: &str,
    dest_path: &Path,
) -> Result<(), PdfiumAutoError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(archive_bytes));
    let entries = archive
        .entries()
        .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?
            .to_string_lossy()
            == lib_path_in_archive;
        if matches {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| PdfiumAutoError::Extract(format!("Read failed: {e}")))?;
            return write_atomic(dest_path, &bytes);
        }
    }

    Err(PdfiumAutoError::Extract(format!(
        "Library '{}' not found in archive",
        lib_path_in_archive
    )))
}

/// Write to `<path>.partial`, then rename, so a concurrent reader never
/// loads a half-written library.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PdfiumAutoError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(PdfiumAutoError::CacheDir)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        PdfiumAutoError::CacheDir(e)
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
