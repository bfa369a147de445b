//! Shared temp-file directory for subprocess-based steps.
//!
//! All concurrent requests share one directory; filenames are UUID-keyed so
//! they never collide. Files created for a single call are tracked by a
//! [`TempGuard`] and removed on every exit path. A separate fire-and-forget
//! sweeper catches anything a crashed process left behind.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, warn};
use uuid::Uuid;

/// Process-wide temp directory.
pub fn temp_root() -> PathBuf {
    std::env::temp_dir().join("obiwon-transcriber")
}

/// Ensure the temp directory exists and return it.
pub fn ensure_temp_root() -> std::io::Result<PathBuf> {
    let root = temp_root();
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

/// Build a request-unique path under the temp root. `ext` may be empty for
/// extension-less paths such as whisper output prefixes.
pub fn request_path(prefix: &str, ext: &str) -> PathBuf {
    let name = if ext.is_empty() {
        format!("{}-{}", prefix, Uuid::new_v4())
    } else {
        format!("{}-{}.{}", prefix, Uuid::new_v4(), ext)
    };
    temp_root().join(name)
}

/// Removes its tracked files when dropped.
///
/// Scoped to one preprocessing or transcription call: success, failure, and
/// timeout all unwind through the same drop.
#[derive(Debug, Default)]
pub struct TempGuard {
    paths: Vec<PathBuf>,
}

impl TempGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` for removal.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
            }
        }
    }
}

/// Spawn the periodic sweep of stale temp files.
///
/// Housekeeping only: runs independent of any request and never touches
/// files younger than `max_age`. The returned handle can be dropped; the
/// task keeps running for the life of the runtime.
pub fn spawn_sweeper(max_age: Duration, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            sweep_once(&temp_root(), max_age);
        }
    })
}

fn sweep_once(root: &Path, max_age: Duration) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return, // nothing created yet
    };

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        if matches!(age, Some(age) if age > max_age) && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(removed, root = %root.display(), "swept stale temp files");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_paths_are_unique() {
        let a = request_path("clip", "webm");
        let b = request_path("clip", "webm");
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(".webm"));
    }

    #[test]
    fn guard_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scratch.webm");
        std::fs::write(&file, b"bytes").unwrap();

        {
            let mut guard = TempGuard::new();
            guard.track(&file);
        }
        assert!(!file.exists());
    }

    #[test]
    fn guard_tolerates_already_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = TempGuard::new();
        guard.track(dir.path().join("never-created.txt"));
        drop(guard); // must not panic
    }

    #[test]
    fn sweep_removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale.webm");
        let fresh = dir.path().join("fresh.webm");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&fresh, b"new").unwrap();

        // Zero max age: everything qualifies as stale.
        sweep_once(dir.path(), Duration::from_secs(0));
        assert!(!stale.exists());

        std::fs::write(&fresh, b"new").unwrap();
        // Generous max age: nothing qualifies.
        sweep_once(dir.path(), Duration::from_secs(3600));
        assert!(fresh.exists());
    }
}
