//! Core context and mount modules.
//!
//! This module provides the main components of the crate:
//!
//! - `constants`: Fixed names, permission modes and defaults
//! - `context`: Context discovery, initialization and record persistence
//! - `error`: Error taxonomy
//! - `index`: Cached remote-file metadata
//! - `mount`: Symlink mount overlays and teardown
//! - `probe`: Path existence and missing-ancestor probes
//! - `registry`: Persistent records of live mounts

pub mod constants;
pub mod context;
pub mod error;
pub mod index;
/// Mount overlay construction and teardown.
pub mod mount;
pub mod probe;
pub mod registry;
