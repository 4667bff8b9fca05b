//! Persistent records of live mounts.
//!
//! The library hands a [`Mount`] back to its caller and forgets about it. A
//! command-line caller exits between `mount` and `unmount`, so this module
//! keeps each mount as a JSON record under `<marker>/mounts/` until it is
//! released.

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::constants::{DIR_PERMISSION, MOUNTS_DIR};
use super::context::{read_record, write_secret_record, Context};
use super::error::{ContextError, Result};
use super::mount::Mount;

/// A stored mount, addressable by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    /// Unique identifier of the record
    pub id: String,
    /// Root of the context the mount belongs to
    pub context_root: PathBuf,
    /// Directory the points were linked into
    pub mount_root: PathBuf,
    /// The mount itself
    pub mount: Mount,
}

/// Stores, lists and releases mount records for one context.
pub struct MountRegistry {
    /// Directory where mount records are stored
    records_dir: PathBuf,
    context_root: PathBuf,
}

impl MountRegistry {
    /// Opens the registry of `context`, creating its directory if needed.
    ///
    /// # Errors
    /// * `Io` if the records directory cannot be created
    pub fn new(context: &Context) -> Result<Self> {
        let records_dir = context.marker_dir().join(MOUNTS_DIR);
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_PERMISSION)
            .create(&records_dir)
            .map_err(ContextError::io(&records_dir))?;
        Ok(Self {
            records_dir,
            context_root: context.root().to_path_buf(),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.records_dir.join(format!("{}.json", id))
    }

    /// Stores `mount`, linked into `mount_root`.
    ///
    /// # Returns
    /// * `Ok(String)` - id of the new record
    /// * `Err` if the record cannot be written
    pub fn save(&self, mount_root: &Path, mount: Mount) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = MountRecord {
            id: id.clone(),
            context_root: self.context_root.clone(),
            mount_root: mount_root.to_path_buf(),
            mount,
        };
        write_secret_record(&self.record_path(&id), &record)?;
        info!("Recorded mount {}", id);
        Ok(id)
    }

    /// Stores `mount`, tearing it down again if it cannot be recorded.
    ///
    /// An unrecorded mount could never be released later, so on failure the
    /// links and created directories are removed before the error is returned.
    pub fn record(&self, mount_root: &Path, mount: Mount) -> Result<String> {
        match self.save(mount_root, mount.clone()) {
            Ok(id) => Ok(id),
            Err(e) => {
                error!("Failed to record mount, undoing it: {}", e);
                if let Err(undo) = mount.unmount() {
                    error!("Failed to undo unrecorded mount: {}", undo);
                }
                Err(e)
            }
        }
    }

    /// Lists all readable records, sorted by id.
    ///
    /// Files that fail to parse are skipped.
    pub fn list(&self) -> Result<Vec<MountRecord>> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.records_dir).map_err(ContextError::io(&self.records_dir))?;
        for entry in entries {
            let entry = entry.map_err(ContextError::io(&self.records_dir))?;
            match read_record::<MountRecord>(&entry.path()) {
                Ok(record) => records.push(record),
                Err(e) => error!("Skipping unreadable mount record: {}", e),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Looks up one record.
    ///
    /// # Returns
    /// * `Ok(Some(MountRecord))` if the record exists
    /// * `Ok(None)` if it doesn't
    /// * `Err` if it exists but cannot be read
    pub fn get(&self, id: &str) -> Result<Option<MountRecord>> {
        match read_record(&self.record_path(id)) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tears down the mount `id` and deletes its record.
    ///
    /// The record is kept when teardown fails so it can be retried.
    ///
    /// # Errors
    /// * `MountNotFound` if no such record exists
    pub fn release(&self, id: &str) -> Result<()> {
        let record = self
            .get(id)?
            .ok_or_else(|| ContextError::MountNotFound(id.to_string()))?;
        record.mount.unmount()?;

        let path = self.record_path(id);
        fs::remove_file(&path).map_err(ContextError::io(&path))?;
        info!("Released mount {}", id);
        Ok(())
    }

    /// Releases every stored mount.
    ///
    /// # Returns
    /// * `Ok(usize)` - number of mounts released
    pub fn purge(&self) -> Result<usize> {
        let mut released = 0;
        for record in self.list()? {
            match self.release(&record.id) {
                Ok(()) => released += 1,
                Err(e) => error!("Failed to release mount {}: {}", record.id, e),
            }
        }
        info!("Purged {} mounts", released);
        Ok(released)
    }
}
