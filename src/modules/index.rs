//! Cached metadata for remotely tracked files.

use serde::{Deserialize, Deserializer, Serialize};

/// Metadata for one remotely tracked file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Remote file identifier
    pub file_id: String,
    /// Entity tag reported by the remote side
    pub etag: String,
    /// MD5 checksum of the content
    pub md5_checksum: String,
    /// MIME type
    pub mime_type: String,
    /// Modification time as a Unix timestamp
    pub mod_time: i64,
    /// Monotonic version counter
    pub version: i64,
    /// Whether the authoritative copy is remote
    pub remote: bool,
}

/// A named collection of index entries, persisted as `<marker>/indices`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    /// Collection name
    pub name: String,
    /// Entries in insertion order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub index: Vec<IndexEntry>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<IndexEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<IndexEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

impl IndexFile {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: Vec::new(),
        }
    }

    /// Looks up the entry for `file_id`.
    pub fn entry(&self, file_id: &str) -> Option<&IndexEntry> {
        self.index.iter().find(|e| e.file_id == file_id)
    }

    /// Inserts `entry`, replacing any entry with the same file id in place.
    ///
    /// Returns the replaced entry, if any.
    pub fn upsert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        match self.index.iter_mut().find(|e| e.file_id == entry.file_id) {
            Some(slot) => Some(std::mem::replace(slot, entry)),
            None => {
                self.index.push(entry);
                None
            }
        }
    }

    /// Removes and returns the entry for `file_id`.
    pub fn remove(&mut self, file_id: &str) -> Option<IndexEntry> {
        let pos = self.index.iter().position(|e| e.file_id == file_id)?;
        Some(self.index.remove(pos))
    }
}
