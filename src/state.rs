//! On-disk allocation records.
//!
//! Each networked container has one `<container-id>.json` file in the state
//! directory holding exactly the bytes produced by `Allocation::serialize`.
//! On startup the whole directory is fed to `Fence::recover_all`.
//!
//! ```text
//! /var/lib/netfence/
//! |-- web-1.json     # {"Ipn":"10.254.0.0/30","ContainerIP":"10.254.0.2"}
//! \-- db.json        # {"Ipn":"10.254.0.4/30","ContainerIP":"10.254.0.6"}
//! ```

use crate::fence::Allocation;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const RECORD_EXTENSION: &str = "json";

/// Directory of persisted allocation records
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Open the state directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("Failed to create state directory '{}'", root.display()))?;
        Ok(StateDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All records, sorted by container id
    pub fn records(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = fs::read_dir(&self.root)
            .wrap_err_with(|| format!("Failed to read state directory '{}'", self.root.display()))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != RECORD_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() {
                continue;
            }

            let bytes = fs::read(&path)
                .wrap_err_with(|| format!("Failed to read allocation record '{}'", path.display()))?;
            records.push((id.to_string(), bytes));
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    pub fn contains(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.record_path(id).exists()
    }

    /// Persist `allocation` as the record for `id`, replacing any previous one
    pub fn save(&self, id: &str, allocation: &Allocation) -> Result<PathBuf> {
        validate_id(id)?;
        let path = self.record_path(id);
        let bytes = allocation.serialize()?;

        // Records are replaced atomically: stage beside the target, then rename
        let staging = self.root.join(format!(".{}.tmp", id));
        fs::write(&staging, bytes)
            .wrap_err_with(|| format!("Failed to write allocation record '{}'", staging.display()))?;
        fs::rename(&staging, &path)
            .wrap_err_with(|| format!("Failed to move allocation record into '{}'", path.display()))?;

        debug!("Saved {} to {}", allocation, path.display());
        Ok(path)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let path = self.record_path(id);
        fs::remove_file(&path)
            .wrap_err_with(|| format!("Failed to remove allocation record '{}'", path.display()))?;
        debug!("Removed {}", path.display());
        Ok(())
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, RECORD_EXTENSION))
    }
}

/// Container ids become file names, so they must be a single path component
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("Container id cannot be empty");
    }
    if id.contains('/') || id.contains('\0') || id.starts_with('.') {
        bail!("Invalid container id '{}'", id);
    }
    Ok(())
}
