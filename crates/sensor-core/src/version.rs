//! Persistence of the running firmware version.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Longest version string accepted from the file; anything this size
/// or larger is treated as garbage.
const MAX_VERSION_LEN: usize = 20;

/// The running firmware version, backed by a single-line file.
///
/// A missing, empty or implausibly long stored value resets to the
/// compiled-in version and rewrites the file, so the value on disk is
/// always the one the rest of the system reasons with.
pub struct VersionStore {
    path: PathBuf,
    current: String,
}

impl VersionStore {
    pub fn open(path: impl AsRef<Path>, compiled: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let stored = fs::read_to_string(&path)
            .map(|raw| raw.trim().to_string())
            .unwrap_or_default();

        let current = if !stored.is_empty() && stored.len() < MAX_VERSION_LEN {
            stored
        } else {
            debug!(
                path = %path.display(),
                compiled,
                "no usable stored version, resetting to compiled-in"
            );
            if let Err(err) = fs::write(&path, format!("{compiled}\n")) {
                warn!(error = %err, "failed to rewrite version file");
            }
            compiled.to_string()
        };
        Self { path, current }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Persists `version` as the running version.
    pub fn save(&mut self, version: &str) -> io::Result<()> {
        fs::write(&self.path, format!("{version}\n"))?;
        self.current = version.to_string();
        Ok(())
    }
}
