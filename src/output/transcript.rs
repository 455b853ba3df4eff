//! Append-only log file of raw tool output.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct TranscriptLog {
    path: PathBuf,
    file: Mutex<fs_err::File>,
}

impl TranscriptLog {
    /// Open (or create) the log file for appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context("Failed to open log file")?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped entry
    pub fn record(&self, message: &str) {
        let entry = format!(
            "{} - {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message.trim()
        );

        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("Log file lock poisoned, dropping entry");
            return;
        };
        if let Err(e) = file.write_all(entry.as_bytes()) {
            tracing::warn!("Could not write to {}: {}", self.path.display(), e);
        }
    }
}
