//! Fixed names, permission modes and defaults shared by the context modules.

// Context layout

/// Default name of the marker directory that identifies a context root.
pub const DEFAULT_MARKER: &str = ".gd";
/// Credential record file name, relative to the marker directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";
/// Remote-file index cache file name, relative to the marker directory.
pub const INDICES_FILE: &str = "indices";
/// Directory holding persisted mount records, relative to the marker directory.
pub const MOUNTS_DIR: &str = "mounts";
/// Mount root used by the command line when none is given, relative to the context root.
pub const DEFAULT_MOUNT_DIR: &str = "mnt";

// Permissions

/// Mode for directories created by this crate.
pub const DIR_PERMISSION: u32 = 0o755;
/// Owner-only mode for records that may hold secrets.
pub const SECRET_PERMISSION: u32 = 0o600;

// Mount naming

/// Leading character of hidden entries.
pub const HIDDEN_PREFIX: char = '.';
/// Separator used in caller-facing mount point names.
pub const NAME_SEPARATOR: &str = "/";
