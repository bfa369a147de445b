//! Discovery of external executables.
//!
//! Tool availability is checked through the [`BinaryLocator`] seam rather
//! than by shelling out, so tests can substitute a fake without spawning
//! real subprocesses. The result of a probe is cached for the life of the
//! process: install locations do not change underneath a running service.

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

/// Capability interface for finding an executable on this machine.
pub trait BinaryLocator: Send + Sync {
    /// Return the first candidate that resolves to an existing executable.
    /// Bare names (no path separator) are searched on `PATH`.
    fn locate(&self, candidates: &[PathBuf]) -> Option<PathBuf>;
}

/// Real filesystem-backed locator.
#[derive(Debug, Default)]
pub struct FsBinaryLocator;

impl BinaryLocator for FsBinaryLocator {
    fn locate(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        for candidate in candidates {
            if candidate.components().count() > 1 {
                if is_file(candidate) {
                    return Some(candidate.clone());
                }
            } else if let Some(found) = search_path(candidate) {
                return Some(found);
            }
        }
        None
    }
}

fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|full| is_file(full))
}

/// One-time lazily-cached probe for a specific tool.
pub struct CachedProbe {
    locator: Box<dyn BinaryLocator>,
    candidates: Vec<PathBuf>,
    resolved: OnceCell<Option<PathBuf>>,
}

impl CachedProbe {
    pub fn new(locator: Box<dyn BinaryLocator>, candidates: Vec<PathBuf>) -> Self {
        Self {
            locator,
            candidates,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve the tool, probing at most once per process.
    pub fn resolve(&self) -> Option<&Path> {
        self.resolved
            .get_or_init(|| self.locator.locate(&self.candidates))
            .as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.resolve().is_some()
    }
}

impl std::fmt::Debug for CachedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedProbe")
            .field("candidates", &self.candidates)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
