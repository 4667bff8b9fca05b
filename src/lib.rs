#![doc(html_root_url = "https://docs.rs/gdctx/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! gdctx: working-tree contexts and reversible symlink mounts
//!
//! A context is a directory marked by a `.gd` subdirectory holding stored
//! credentials and a cached remote-file index. Inside a context, arbitrary
//! paths can be exposed under one mount root as symbolic links, and later
//! removed again without touching anything that existed beforehand.
//!
//! ## Features
//!
//! - Upward context discovery from any nested directory
//! - Owner-only persistence of credentials and the index cache
//! - Deduplicated, collision-aware symlink overlays
//! - Exact teardown of the links and directories a mount created
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gdctx::{ContextStore, MountBuilder};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = ContextStore::default();
//! let context = store.discover(Path::new("/work/projects"))?;
//!
//! let sources = vec![PathBuf::from("/home/u/docs")];
//! let mount_root = context.abs_path_of("mnt");
//! let (mount, _) = MountBuilder::new(store.probe())
//!     .mount_points("mnt", &mount_root, &sources, false)?;
//!
//! if let Some(mount) = mount {
//!     mount.unmount()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Teardown
//!
//! - Links that already existed when a mount was made are never removed
//! - Directories created to hold the mount root are removed from the
//!   topmost one down, and only when the mount created them

pub mod modules;

pub use modules::context::{Context, ContextConfig, ContextStore, Credentials, Initialized};
pub use modules::error::{ContextError, Result};
pub use modules::index::{IndexEntry, IndexFile};
pub use modules::mount::{CreatedRoot, LinkOutcome, LinkReport, Mount, MountBuilder, MountPoint};
pub use modules::probe::PathProbe;
pub use modules::registry::{MountRecord, MountRegistry};
