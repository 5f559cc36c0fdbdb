//! Deferred, best-effort removal of request workspaces.
//!
//! Cleanup never blocks the response and never fails it: removal runs in a
//! detached tokio task, a path that is already gone counts as removed, and
//! any other failure is logged with `warn!` and dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Remove every path in `paths` (files or whole directories) in the background.
///
/// The returned handle may be awaited (the CLI does, before exiting) or
/// dropped; dropping it does not cancel the task.
pub fn schedule_cleanup(paths: Vec<PathBuf>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for path in paths {
            remove_path(&path).await;
        }
    })
}

async fn remove_path(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!("Cleaned up {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => debug!("Already gone: {}", path.display()),
        Err(e) => warn!("Cleanup of {} failed: {}", path.display(), e),
    }
}
