//! Supervisor executable lookup.
//!
//! Candidates are checked in order on every call; nothing is cached, so
//! installing or removing Homebrew while brewbar runs is picked up on the
//! next refresh.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::SyncError;

const APPLE_SILICON_BREW: &str = "/opt/homebrew/bin/brew";
const INTEL_BREW: &str = "/usr/local/bin/brew";
const LINUXBREW: &str = "/home/linuxbrew/.linuxbrew/bin/brew";

/// Default candidate paths for the running architecture, most likely first.
pub fn default_candidates() -> Vec<PathBuf> {
    defaults_for_arch(std::env::consts::ARCH)
}

fn defaults_for_arch(arch: &str) -> Vec<PathBuf> {
    let ordered = if arch == "aarch64" {
        [APPLE_SILICON_BREW, INTEL_BREW, LINUXBREW]
    } else {
        [INTEL_BREW, APPLE_SILICON_BREW, LINUXBREW]
    };
    ordered.iter().map(PathBuf::from).collect()
}

/// Ordered list of places the supervisor binary may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableLocator {
    candidates: Vec<PathBuf>,
}

impl ExecutableLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// User overrides first, then the architecture defaults.
    pub fn with_overrides<I, S>(overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        let mut candidates: Vec<PathBuf> = overrides.into_iter().map(Into::into).collect();
        for default in default_candidates() {
            if !candidates.contains(&default) {
                candidates.push(default);
            }
        }
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Return the first candidate that exists and is executable.
    pub fn locate(&self) -> Result<PathBuf, SyncError> {
        for candidate in &self.candidates {
            if is_executable(candidate) {
                debug!(path = %candidate.display(), "located supervisor");
                return Ok(candidate.clone());
            }
            trace!(path = %candidate.display(), "candidate not executable");
        }
        Err(SyncError::ExecutableNotFound {
            candidates: self.candidates.clone(),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
