//! Filesystem existence probes.
//!
//! `PathProbe` walks paths as text, splitting on a separator it is given at
//! construction time. Nothing here mutates the filesystem.

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Answers existence questions about paths and their ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathProbe {
    separator: char,
}

impl Default for PathProbe {
    fn default() -> Self {
        Self::new(MAIN_SEPARATOR)
    }
}

impl PathProbe {
    /// Creates a probe splitting paths on `separator`.
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    /// The separator this probe splits on.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// True iff an entry of any type is present at `path`.
    ///
    /// Symbolic links are not followed, so a dangling link still counts.
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    /// Returns the topmost directory that would have to be created to
    /// materialize `path`.
    ///
    /// Walks from `path` towards the root, one component at a time, until an
    /// existing entry is found. The last missing path seen is returned, without
    /// a trailing separator. `None` means `path` already exists (or is empty).
    pub fn highest_non_existent_ancestor(&self, path: &str) -> Option<PathBuf> {
        let mut last = None;
        let mut current = path.trim_end_matches(self.separator);

        while !current.is_empty() {
            if self.exists(current) {
                break;
            }
            last = Some(current);
            current = self.parent_of(current);
        }

        last.map(PathBuf::from)
    }

    // "/a/b" -> "/a", "/a" -> "", "a" -> "", "/a//b/" -> "/a"
    fn parent_of<'a>(&self, path: &'a str) -> &'a str {
        let trimmed = path.trim_end_matches(self.separator);
        match trimmed.rfind(self.separator) {
            Some(idx) => trimmed[..idx].trim_end_matches(self.separator),
            None => "",
        }
    }
}
