//! Concrete converter units.
//!
//! | Module | Unit | Runs |
//! |--------|------|------|
//! | [`json`] | `json2md` | in-process |
//! | [`image`] | `image-converter-<ext>` | in-process, blocking pool |
//! | [`pdf`] | `pdf-converter` | in-process (pdfium), blocking pool |
//! | [`media`] | `video-converter` | `ffmpeg` child process |
//! | [`office`] | `office-converter` | `soffice` child process |
//!
//! [`docx`] is the WordprocessingML writer used by the PDF unit, and
//! [`layout`] maps positioned page content onto it.

pub mod docx;
pub mod image;
pub mod json;
pub mod layout;
pub mod media;
pub mod office;
pub mod pdf;

pub use self::image::ImageConverter;
pub use self::json::JsonToMarkdownConverter;
pub use self::media::MediaConverter;
pub use self::office::OfficeConverter;
pub use self::pdf::PdfConverter;

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename, so readers
/// never observe a half-written output.
pub(crate) async fn write_atomic(
    converter: &str,
    path: &Path,
    bytes: &[u8],
) -> Result<(), ConvertError> {
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| ConvertError::failed(converter, format!("writing {}: {e}", tmp.display())))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ConvertError::failed(
            converter,
            format!("renaming {} → {}: {e}", tmp.display(), path.display()),
        ));
    }

    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Blocking twin of [`write_atomic`] for code already on the blocking pool.
pub(crate) fn write_atomic_blocking(
    converter: &str,
    path: &Path,
    bytes: &[u8],
) -> Result<(), ConvertError> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes)
        .map_err(|e| ConvertError::failed(converter, format!("writing {}: {e}", tmp.display())))?;

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(ConvertError::failed(
            converter,
            format!("renaming {} → {}: {e}", tmp.display(), path.display()),
        ));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/out/report.md")),
            PathBuf::from("/out/report.md.tmp")
        );
    }

    #[tokio::test]
    async fn write_atomic_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "old").unwrap();

        write_atomic("test", &path, b"new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join("a.txt.tmp").exists());
    }

    #[tokio::test]
    async fn write_atomic_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a.txt");
        let err = write_atomic("test", &path, b"x").await.unwrap_err();
        assert!(matches!(err, ConvertError::ConversionFailed { .. }));
    }
}
