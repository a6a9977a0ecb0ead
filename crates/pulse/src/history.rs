//! JSON-file transfer history.
//!
//! The whole history is one pretty-printed JSON array. Each record rewrites
//! the file with the new entry appended and the oldest entries dropped past
//! `max_entries`.

use std::io;
use std::path::{Path, PathBuf};

use pulse_core::config::HistoryConfig;
use pulse_transfer::{HistoryEntry, HistorySink};

pub struct JsonHistory {
    path: PathBuf,
    max_entries: usize,
}

impl JsonHistory {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(expand_home(&config.path), config.max_entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries, oldest first. A missing file is an empty history.
    pub fn load(&self) -> io::Result<Vec<HistoryEntry>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn save(&self, entries: &[HistoryEntry]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, text)?;
        restrict_permissions(&self.path)?;
        tracing::debug!(path = %self.path.display(), entries = entries.len(), "history saved");
        Ok(())
    }
}

impl HistorySink for JsonHistory {
    fn record(&mut self, entry: HistoryEntry) -> io::Result<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
        self.save(&entries)
    }
}

/// `~/x` → `$HOME/x`. Other paths are returned unchanged.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
