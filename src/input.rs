//! Input staging: copy a local file or download a URL into a private
//! workspace before conversion.
//!
//! ## Why stage at all?
//!
//! Converters write next to paths they are given, and soffice in particular
//! picks its own output name inside `--outdir`. Running each request in its
//! own temporary directory means concurrent requests for files with the same
//! name never collide, and the user's source directory is never written to.
//!
//! The workspace is released from `TempDir`'s drop guard with
//! [`tempfile::TempDir::keep`]: the caller copies the result out and then
//! hands the directory to [`crate::cleanup::schedule_cleanup`].

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Fallback file name when a URL carries none.
const DEFAULT_DOWNLOAD_NAME: &str = "download";

/// An input copied into its private workspace.
#[derive(Debug, Clone)]
pub struct StagedInput {
    /// Root of the workspace; remove it once the result has been copied out.
    pub workspace: PathBuf,
    /// The staged copy of the input.
    pub input: PathBuf,
    /// Directory the converter should write into.
    pub output_dir: PathBuf,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Stage `source` (a local path or an HTTP/HTTPS URL) into a new workspace.
pub async fn stage_input(source: &str, download_timeout_secs: u64) -> Result<StagedInput, ConvertError> {
    if is_url(source) {
        let workspace = new_workspace()?;
        match download_url(source, &workspace, download_timeout_secs).await {
            Ok(staged) => Ok(staged),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&workspace).await;
                Err(e)
            }
        }
    } else {
        stage_local(Path::new(source)).await
    }
}

fn new_workspace() -> Result<PathBuf, ConvertError> {
    let dir = tempfile::Builder::new()
        .prefix("edgeconvert-")
        .tempdir()
        .map_err(|e| ConvertError::Internal(format!("cannot create workspace: {e}")))?;
    let root = dir.keep();
    std::fs::create_dir_all(root.join("out"))
        .map_err(|e| ConvertError::Internal(format!("cannot create workspace: {e}")))?;
    Ok(root)
}

fn staged(workspace: PathBuf, file_name: &str) -> StagedInput {
    StagedInput {
        input: workspace.join(file_name),
        output_dir: workspace.join("out"),
        workspace,
    }
}

/// Copy a local file into a new workspace, keeping its file name.
async fn stage_local(path: &Path) -> Result<StagedInput, ConvertError> {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ConvertError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConvertError::NotFound {
            path: path.to_path_buf(),
        })?;

    let workspace = new_workspace()?;
    let staged = staged(workspace, &file_name);
    if let Err(e) = tokio::fs::copy(path, &staged.input).await {
        let _ = tokio::fs::remove_dir_all(&staged.workspace).await;
        return Err(ConvertError::Internal(format!(
            "cannot stage {}: {e}",
            path.display()
        )));
    }

    debug!("Staged {} → {}", path.display(), staged.input.display());
    Ok(staged)
}

/// Download a URL into `workspace`.
async fn download_url(
    url: &str,
    workspace: &Path,
    timeout_secs: u64,
) -> Result<StagedInput, ConvertError> {
    info!("Downloading from: {}", url);
    let failed = |reason: String| ConvertError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let file_name = extract_filename(url, disposition.as_deref());

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let staged = staged(workspace.to_path_buf(), &file_name);
    tokio::fs::write(&staged.input, &bytes)
        .await
        .map_err(|e| ConvertError::Internal(format!("Failed to write downloaded file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), staged.input.display());
    Ok(staged)
}

/// Pick a file name from `Content-Disposition`, then the URL path, then a default.
///
/// Only the final path component is ever used, so a hostile name cannot
/// escape the workspace.
fn extract_filename(url: &str, content_disposition: Option<&str>) -> String {
    let from_header = content_disposition.and_then(|h| {
        h.split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("filename="))
            .map(|v| v.trim_matches('"').to_string())
    });

    let from_url = || {
        reqwest::Url::parse(url).ok().and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
    };

    from_header
        .into_iter()
        .chain(from_url())
        .filter_map(|candidate| {
            Path::new(&candidate)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .find(|name| name.contains('.') && !name.starts_with('.'))
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            extract_filename("https://example.com/files/report.pdf?x=1", None),
            "report.pdf"
        );
    }

    #[test]
    fn filename_prefers_content_disposition() {
        assert_eq!(
            extract_filename(
                "https://example.com/get?id=7",
                Some(r#"attachment; filename="clip.mp4""#)
            ),
            "clip.mp4"
        );
    }

    #[test]
    fn filename_never_escapes_workspace() {
        assert_eq!(
            extract_filename("https://x/y", Some(r#"attachment; filename="../../etc/evil.json""#)),
            "evil.json"
        );
    }

    #[test]
    fn filename_falls_back_to_default() {
        assert_eq!(extract_filename("https://example.com/", None), "download");
    }

    #[tokio::test]
    async fn local_file_is_copied_into_workspace() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("data.json");
        std::fs::write(&src, "{}").unwrap();

        let staged = stage_input(src.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(staged.input.file_name().unwrap(), "data.json");
        assert_eq!(std::fs::read_to_string(&staged.input).unwrap(), "{}");
        assert!(staged.output_dir.is_dir());
        assert!(staged.input.starts_with(&staged.workspace));

        std::fs::remove_dir_all(&staged.workspace).unwrap();
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let err = stage_input("/definitely/not/here.json", 5).await.unwrap_err();
        assert!(matches!(err, ConvertError::NotFound { .. }));
    }
}
