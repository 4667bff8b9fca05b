//! Context discovery and persistence.
//!
//! A context is a directory carrying a marker subdirectory (`.gd` by default).
//! The marker holds the credential record and the remote-file index cache.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use super::constants::*;
use super::error::{ContextError, Result};
use super::index::IndexFile;
use super::probe::PathProbe;

/// Settings shared by discovery, initialization and the path probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Name of the marker directory identifying a context root
    pub marker: String,
    /// Separator used when walking paths as text
    pub separator: char,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            separator: MAIN_SEPARATOR,
        }
    }
}

/// OAuth client credentials stored with a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
}

// On-disk shape of the credential record. Empty strings mean "absent".
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    refresh_token: String,
}

impl CredentialRecord {
    fn into_credentials(self, path: &Path) -> Result<Option<Credentials>> {
        let present = [&self.client_id, &self.client_secret, &self.refresh_token]
            .iter()
            .filter(|field| !field.is_empty())
            .count();
        match present {
            0 => Ok(None),
            3 => Ok(Some(Credentials {
                client_id: self.client_id,
                client_secret: self.client_secret,
                refresh_token: self.refresh_token,
            })),
            _ => Err(ContextError::malformed(path, "partial credentials")),
        }
    }
}

impl From<Option<&Credentials>> for CredentialRecord {
    fn from(credentials: Option<&Credentials>) -> Self {
        match credentials {
            Some(c) => Self {
                client_id: c.client_id.clone(),
                client_secret: c.client_secret.clone(),
                refresh_token: c.refresh_token.clone(),
            },
            None => Self::default(),
        }
    }
}

/// A working root together with its stored credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    root: PathBuf,
    marker_dir: PathBuf,
    /// Stored credentials, `None` when unauthenticated
    pub credentials: Option<Credentials>,
}

impl Context {
    fn new(root: PathBuf, marker: &str) -> Self {
        let marker_dir = root.join(marker);
        Self {
            root,
            marker_dir,
            credentials: None,
        }
    }

    /// The context root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The marker directory under the root.
    pub fn marker_dir(&self) -> &Path {
        &self.marker_dir
    }

    /// True when a full credential triple is stored.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Joins a context-relative path onto the root.
    pub fn abs_path_of<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        let rel = rel.as_ref();
        self.root.join(rel.strip_prefix("/").unwrap_or(rel))
    }

    /// Resolves a mount root given relative to the context.
    ///
    /// Returns the name prefix for mount points (leading separators removed,
    /// matching what [`Context::abs_path_of`] joins) and the absolute root.
    pub fn mount_target<'a>(&self, rel: &'a str) -> (&'a str, PathBuf) {
        let rel = rel.trim_start_matches('/');
        (rel, self.abs_path_of(rel))
    }

    /// Path of the credential record.
    pub fn credentials_path(&self) -> PathBuf {
        self.marker_dir.join(CREDENTIALS_FILE)
    }

    /// Path of the index cache.
    pub fn indices_path(&self) -> PathBuf {
        self.marker_dir.join(INDICES_FILE)
    }

    /// Reloads the credential record from disk.
    ///
    /// # Errors
    ///
    /// `Io` when the record cannot be read, `MalformedRecord` when it does not
    /// parse or holds a partial credential triple.
    pub fn read(&mut self) -> Result<()> {
        let path = self.credentials_path();
        let record: CredentialRecord = read_record(&path)?;
        self.credentials = record.into_credentials(&path)?;
        Ok(())
    }

    /// Stores the credential record with owner-only permissions.
    pub fn write(&self) -> Result<()> {
        let record = CredentialRecord::from(self.credentials.as_ref());
        write_secret_record(&self.credentials_path(), &record)
    }

    /// Loads the index cache.
    pub fn read_indices(&self) -> Result<IndexFile> {
        read_record(&self.indices_path())
    }

    /// Stores the index cache with owner-only permissions.
    pub fn write_indices(&self, index: &IndexFile) -> Result<()> {
        write_secret_record(&self.indices_path(), index)
    }
}

/// Outcome of [`ContextStore::initialize`].
#[derive(Debug)]
pub struct Initialized {
    /// Path of the marker directory
    pub marker_path: PathBuf,
    /// True when the marker did not exist before this call
    pub first_init: bool,
    /// The freshly written context
    pub context: Context,
}

/// Finds and creates contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    config: ContextConfig,
    probe: PathProbe,
}

impl ContextStore {
    /// Creates a store using `config` for the marker name and path separator.
    pub fn new(config: ContextConfig) -> Self {
        let probe = PathProbe::new(config.separator);
        Self { config, probe }
    }

    /// The probe configured with this store's separator.
    pub fn probe(&self) -> PathProbe {
        self.probe
    }

    /// The marker directory for a candidate root.
    pub fn marker_path(&self, root: &Path) -> PathBuf {
        root.join(&self.config.marker)
    }

    /// Walks upward from `start` looking for the marker directory and loads
    /// the context found there.
    ///
    /// # Errors
    ///
    /// `NoContextFound` when no ancestor (including `start`) carries the
    /// marker. Failures loading the credential record propagate unchanged.
    pub fn discover(&self, start: &Path) -> Result<Context> {
        let cleaned = clean_path(start);
        let mut current = Some(cleaned.as_path());
        while let Some(dir) = current {
            let marker = self.marker_path(dir);
            if marker.is_dir() {
                debug!("Found context marker at {}", marker.display());
                let mut context = Context::new(dir.to_path_buf(), &self.config.marker);
                context.read()?;
                return Ok(context);
            }
            current = dir.parent();
        }
        Err(ContextError::NoContextFound(start.to_path_buf()))
    }

    /// Creates (or re-creates) the marker directory at `abs_path` and writes
    /// an empty credential record.
    ///
    /// # Errors
    ///
    /// `NotADirectory` when the marker path is occupied by something else, `Io`
    /// for stat failures other than absence and for creation failures.
    pub fn initialize(&self, abs_path: &Path) -> Result<Initialized> {
        let marker_path = self.marker_path(abs_path);

        let first_init = match fs::metadata(&marker_path) {
            Ok(meta) if !meta.is_dir() => {
                return Err(ContextError::NotADirectory(marker_path));
            }
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(ContextError::io(&marker_path)(e)),
        };

        DirBuilder::new()
            .recursive(true)
            .mode(DIR_PERMISSION)
            .create(&marker_path)
            .map_err(ContextError::io(&marker_path))?;

        let context = Context::new(abs_path.to_path_buf(), &self.config.marker);
        context.write()?;

        if first_init {
            info!("Initialized context at {}", abs_path.display());
        } else {
            info!("Re-initialized context at {}", abs_path.display());
        }

        Ok(Initialized {
            marker_path,
            first_init,
            context,
        })
    }
}

// Lexical cleanup: drops `.` and folds `..` into its parent without touching
// the filesystem, so the upward walk only visits real ancestors.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

pub(crate) fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(ContextError::io(path))?;
    serde_json::from_slice(&data).map_err(|e| ContextError::malformed(path, e))
}

pub(crate) fn write_secret_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let data = serde_json::to_vec(record).map_err(|e| ContextError::malformed(path, e))?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(SECRET_PERMISSION)
        .open(path)
        .map_err(ContextError::io(path))?;
    // mode() only applies on creation
    file.set_permissions(Permissions::from_mode(SECRET_PERMISSION))
        .map_err(ContextError::io(path))?;
    file.write_all(&data).map_err(ContextError::io(path))?;
    Ok(())
}
