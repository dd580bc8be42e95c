//! Writes the state snapshot to disk for display clients.

use crate::domain::broadcast::Broadcast;
use crate::domain::endpoint::Endpoint;
use crate::domain::snapshot::SharedSnapshot;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use tracing::{error, trace};

/// Rewrites the whole snapshot file after every global broadcast.
///
/// The file is written next to its final location and renamed into place,
/// so readers see either the previous or the new content.
pub struct SnapshotPersister {
    snapshot: SharedSnapshot,
    path: PathBuf,
}

impl SnapshotPersister {
    pub fn new(snapshot: SharedSnapshot, path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn persist(&self) -> Result<()> {
        let copy = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let json = copy.to_json()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, json)
            .with_context(|| format!("Writing {}", temp.display()))?;
        std::fs::rename(&temp, &self.path)
            .with_context(|| format!("Replacing {}", self.path.display()))?;

        trace!(path = %self.path.display(), entries = copy.len(), "Snapshot persisted");
        Ok(())
    }
}

impl Endpoint for SnapshotPersister {
    fn name(&self) -> &str {
        "persistence"
    }

    fn receive(&self, message: &Broadcast) {
        if !message.is_global() {
            return;
        }
        if let Err(e) = self.persist() {
            error!(error = %e, "Failed to persist snapshot");
        }
    }
}
