//! Symlink mount overlays and their exact teardown.
//!
//! [`MountBuilder::mount_points`] exposes a list of source paths as symbolic
//! links under one mount root. It records which directories it had to create
//! so that [`Mount::unmount`] removes exactly what the call added and nothing
//! that existed before it.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::{Path, PathBuf};

use super::constants::{DIR_PERMISSION, HIDDEN_PREFIX, NAME_SEPARATOR};
use super::error::{ContextError, Result};
use super::probe::PathProbe;

/// One source path exposed as a symbolic link inside a mount root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    /// Absolute path of the linked source
    pub source: PathBuf,
    /// Absolute path of the link inside the mount root
    pub mount_path: PathBuf,
    /// Caller-facing name, e.g. `/docs` or `/mnt/docs`
    pub name: String,
    /// Whether this session created the link and may remove it
    pub cleanable: bool,
}

impl MountPoint {
    /// Removes the link if this session created it.
    ///
    /// Non-cleanable points belong to an earlier, unrelated run and are left
    /// alone. The flag is trusted as-is: the link target is not re-checked.
    pub fn unmount(&self) -> Result<()> {
        if !self.cleanable {
            debug!("Leaving {} in place (not created by us)", self.mount_path.display());
            return Ok(());
        }
        remove_path(&self.mount_path)
    }
}

/// Directories materialized by a mount call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoot {
    /// The mount root itself
    pub mount_dir: PathBuf,
    /// Topmost ancestor that did not exist before the call
    pub shortest_root: PathBuf,
}

/// Aggregate result of one [`MountBuilder::mount_points`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Mount points in source order
    pub points: Vec<MountPoint>,
    /// Set only when the call created the mount root
    pub created_root: Option<CreatedRoot>,
}

impl Mount {
    /// Tears the mount down.
    ///
    /// Every point is unmounted even if an earlier one fails, then the created
    /// directory tree (if any) is removed. Returns the first error seen.
    pub fn unmount(&self) -> Result<()> {
        let mut first_err = None;

        for point in &self.points {
            if let Err(e) = point.unmount() {
                warn!("Failed to unmount {}: {}", point.name, e);
                first_err.get_or_insert(e);
            }
        }

        if let Some(created) = &self.created_root {
            info!("Removing created mount root {}", created.shortest_root.display());
            if let Err(e) = remove_path(&created.shortest_root) {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

/// What happened to a single source path during a mount call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new link was created
    Created,
    /// A link with the same name already existed; kept as non-cleanable
    Collided,
    /// The same path appeared earlier in the list
    SkippedDuplicate,
    /// Hidden entries were excluded
    SkippedHidden,
    /// The source could not be statted
    SkippedMissing,
    /// Link creation failed for another reason
    Failed,
}

impl LinkOutcome {
    /// Whether this outcome produces a mount point.
    pub fn produces_point(self) -> bool {
        matches!(self, LinkOutcome::Created | LinkOutcome::Collided)
    }
}

/// Per-source report, including the mount point when one was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    /// Source path as given by the caller
    pub source: PathBuf,
    /// What happened to it
    pub outcome: LinkOutcome,
    /// The resulting mount point, for `Created` and `Collided`
    pub point: Option<MountPoint>,
}

/// Builds symlink overlays under a mount root.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountBuilder {
    probe: PathProbe,
}

impl MountBuilder {
    /// Creates a builder using `probe` to find missing ancestors.
    pub fn new(probe: PathProbe) -> Self {
        Self { probe }
    }

    /// Links every usable source under `context_abs_path`.
    ///
    /// `context_rel_path` only shapes the caller-facing names. The second
    /// element of the result lists the shortest mount root when this call
    /// created directories, so the caller can clean up even when no mount
    /// point was produced (the mount is `None` in that case).
    ///
    /// # Errors
    ///
    /// Only root preparation fails the call: a stat error other than absence,
    /// or failure creating the root. Individual sources never do.
    pub fn mount_points<S: AsRef<Path>>(
        &self,
        context_rel_path: &str,
        context_abs_path: &Path,
        sources: &[S],
        include_hidden: bool,
    ) -> Result<(Option<Mount>, Vec<PathBuf>)> {
        let created_root = self.prepare_root(context_abs_path)?;
        let mut created = Vec::new();
        if let Some(root) = &created_root {
            created.push(root.shortest_root.clone());
        }

        let points: Vec<MountPoint> = self
            .link_sources(context_rel_path, context_abs_path, sources, include_hidden)
            .into_iter()
            .filter_map(|report| report.point)
            .collect();

        if points.is_empty() {
            info!("Nothing mounted under {}", context_abs_path.display());
            return Ok((None, created));
        }

        info!(
            "Mounted {} path(s) under {}",
            points.len(),
            context_abs_path.display()
        );
        Ok((
            Some(Mount {
                points,
                created_root,
            }),
            created,
        ))
    }

    /// Ensures the mount root exists, returning the bookkeeping record when
    /// this call had to create it.
    pub fn prepare_root(&self, context_abs_path: &Path) -> Result<Option<CreatedRoot>> {
        match fs::metadata(context_abs_path) {
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ContextError::io(context_abs_path)(e)),
        }

        let text = context_abs_path
            .to_str()
            .ok_or_else(|| ContextError::InvalidPath(context_abs_path.to_path_buf()))?;
        let shortest_root = self
            .probe
            .highest_non_existent_ancestor(text)
            .unwrap_or_else(|| context_abs_path.to_path_buf());

        DirBuilder::new()
            .recursive(true)
            .mode(DIR_PERMISSION)
            .create(context_abs_path)
            .map_err(ContextError::io(context_abs_path))?;

        debug!(
            "Created mount root {} (topmost new directory {})",
            context_abs_path.display(),
            shortest_root.display()
        );
        Ok(Some(CreatedRoot {
            mount_dir: context_abs_path.to_path_buf(),
            shortest_root,
        }))
    }

    /// Links each source and reports what happened to it, in input order.
    ///
    /// The mount root must already exist.
    pub fn link_sources<S: AsRef<Path>>(
        &self,
        context_rel_path: &str,
        context_abs_path: &Path,
        sources: &[S],
        include_hidden: bool,
    ) -> Vec<LinkReport> {
        let mut seen: HashSet<&OsStr> = HashSet::new();

        sources
            .iter()
            .map(|source| {
                let source = source.as_ref();
                let (outcome, point) = if seen.insert(source.as_os_str()) {
                    self.link_one(context_rel_path, context_abs_path, source, include_hidden)
                } else {
                    (LinkOutcome::SkippedDuplicate, None)
                };
                debug!("{}: {:?}", source.display(), outcome);
                LinkReport {
                    source: source.to_path_buf(),
                    outcome,
                    point,
                }
            })
            .collect()
    }

    fn link_one(
        &self,
        context_rel_path: &str,
        context_abs_path: &Path,
        source: &Path,
        include_hidden: bool,
    ) -> (LinkOutcome, Option<MountPoint>) {
        if fs::metadata(source).is_err() {
            return (LinkOutcome::SkippedMissing, None);
        }

        let base = match source.file_name() {
            Some(base) => base,
            None => {
                warn!("Cannot derive a link name for {}", source.display());
                return (LinkOutcome::Failed, None);
            }
        };
        let base_str = base.to_string_lossy();

        if !include_hidden && base_str.starts_with(HIDDEN_PREFIX) {
            return (LinkOutcome::SkippedHidden, None);
        }

        let mount_path = context_abs_path.join(base);
        let outcome = match symlink(source, &mount_path) {
            Ok(()) => LinkOutcome::Created,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(
                    "{} already exists; keeping it but it will not be cleaned up",
                    mount_path.display()
                );
                LinkOutcome::Collided
            }
            Err(e) => {
                warn!("Failed to link {}: {}", source.display(), e);
                return (LinkOutcome::Failed, None);
            }
        };

        let point = MountPoint {
            source: source.to_path_buf(),
            mount_path,
            name: point_name(context_rel_path, &base_str),
            cleanable: outcome == LinkOutcome::Created,
        };
        (outcome, Some(point))
    }
}

fn point_name(context_rel_path: &str, base: &str) -> String {
    if context_rel_path.is_empty() {
        ["", base].join(NAME_SEPARATOR)
    } else {
        ["", context_rel_path, base].join(NAME_SEPARATOR)
    }
}

// Unlinks symlinks and files, removes directories recursively. Missing is fine.
fn remove_path(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(ContextError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn setup_test_builder() -> (TempDir, MountBuilder) {
        let temp_dir = tempfile::tempdir().unwrap();
        (temp_dir, MountBuilder::default())
    }

    fn create_sources(parent: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
        let home = parent.join("home").join("u");
        fs::create_dir_all(&home)?;
        names
            .iter()
            .map(|name| -> Result<PathBuf> {
                let path = home.join(name);
                fs::create_dir_all(&path)?;
                fs::write(path.join("test.txt"), "test content")?;
                Ok(path)
            })
            .collect()
    }

    // Every path below `root`, relative, so two snapshots can be compared.
    fn snapshot(root: &Path) -> Result<BTreeSet<PathBuf>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|entry| -> Result<PathBuf> {
                Ok(entry?.path().strip_prefix(root)?.to_path_buf())
            })
            .collect()
    }

    #[test]
    fn test_mount_into_missing_root() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", ".secret"])?;
        let docs = sources[0].clone();
        let secret = sources[1].clone();

        let work = temp_dir.path().join("work");
        let mount_root = work.join(".gd").join("mnt");

        let (mount, created) =
            builder.mount_points("", &mount_root, &[docs.clone(), secret, docs.clone()], false)?;
        let mount = mount.expect("mount");

        assert!(work.is_dir());
        assert!(mount_root.is_dir());
        assert_eq!(created, vec![work.clone()]);

        assert_eq!(mount.points.len(), 1);
        let point = &mount.points[0];
        assert_eq!(point.name, "/docs");
        assert_eq!(point.source, docs);
        assert_eq!(point.mount_path, mount_root.join("docs"));
        assert!(point.cleanable);
        assert_eq!(fs::read_link(&point.mount_path)?, docs);

        assert_eq!(
            mount.created_root,
            Some(CreatedRoot {
                mount_dir: mount_root.clone(),
                shortest_root: work,
            })
        );
        Ok(())
    }

    #[test]
    fn test_link_outcomes_are_reported_per_source() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", ".secret"])?;
        let mount_root = temp_dir.path().join("mnt");
        fs::create_dir(&mount_root)?;

        let missing = temp_dir.path().join("missing");
        let input = vec![
            sources[0].clone(),
            sources[1].clone(),
            sources[0].clone(),
            missing,
        ];
        let reports = builder.link_sources("", &mount_root, &input, false);

        let outcomes: Vec<LinkOutcome> = reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                LinkOutcome::Created,
                LinkOutcome::SkippedHidden,
                LinkOutcome::SkippedDuplicate,
                LinkOutcome::SkippedMissing,
            ]
        );
        assert!(reports[0].point.is_some());
        assert!(reports[1..].iter().all(|r| r.point.is_none()));
        Ok(())
    }

    #[test]
    fn test_source_without_base_name_fails_alone() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");
        fs::create_dir(&mount_root)?;

        let unnamed = sources[0].join("..");
        let input = vec![unnamed, sources[0].clone()];
        let reports = builder.link_sources("", &mount_root, &input, false);

        assert_eq!(reports[0].outcome, LinkOutcome::Failed);
        assert!(reports[0].point.is_none());
        assert_eq!(reports[1].outcome, LinkOutcome::Created);
        assert_eq!(fs::read_link(mount_root.join("docs"))?, sources[0]);
        Ok(())
    }

    #[test]
    fn test_link_failure_other_than_collision_is_skipped() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", "notes"])?;
        // Root vanished after preparation: symlink fails with NotFound
        let mount_root = temp_dir.path().join("gone");

        let reports = builder.link_sources("", &mount_root, &sources, false);
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.outcome, LinkOutcome::Failed);
            assert!(report.point.is_none());
        }
        assert!(!mount_root.exists());
        Ok(())
    }

    #[test]
    fn test_include_hidden() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &[".secret"])?;
        let mount_root = temp_dir.path().join("mnt");

        let (mount, _) = builder.mount_points("", &mount_root, &sources, true)?;
        let mount = mount.expect("mount");
        assert_eq!(mount.points.len(), 1);
        assert_eq!(mount.points[0].name, "/.secret");
        Ok(())
    }

    #[test]
    fn test_dedup_is_on_exact_path() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");

        let (mount, _) = builder.mount_points(
            "",
            &mount_root,
            &[sources[0].clone(), sources[0].clone(), sources[0].clone()],
            false,
        )?;
        assert_eq!(mount.expect("mount").points.len(), 1);
        Ok(())
    }

    #[test]
    fn test_names_include_context_rel_path() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");

        let (mount, _) = builder.mount_points("projects/q3", &mount_root, &sources, false)?;
        assert_eq!(mount.expect("mount").points[0].name, "/projects/q3/docs");
        Ok(())
    }

    #[test]
    fn test_existing_root_has_no_bookkeeping() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");
        fs::create_dir(&mount_root)?;

        let (mount, created) = builder.mount_points("", &mount_root, &sources, false)?;
        assert!(created.is_empty());
        assert_eq!(mount.expect("mount").created_root, None);
        Ok(())
    }

    #[test]
    fn test_nothing_mounted_returns_none_but_reports_created_root() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let mount_root = temp_dir.path().join("a").join("mnt");
        let missing = temp_dir.path().join("missing");

        let (mount, created) = builder.mount_points("", &mount_root, &[missing], false)?;
        assert!(mount.is_none());
        assert!(mount_root.is_dir());
        assert_eq!(created, vec![temp_dir.path().join("a")]);
        Ok(())
    }

    #[test]
    fn test_root_blocked_by_file_fails_without_points() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "file")?;

        let result = builder.mount_points("", &blocker.join("mnt"), &sources, false);
        assert!(matches!(result, Err(ContextError::Io { .. })));
        Ok(())
    }

    #[test]
    fn test_collision_with_real_file_is_not_cleanable() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");
        fs::create_dir(&mount_root)?;
        let existing = mount_root.join("docs");
        fs::write(&existing, "real file")?;

        let reports = builder.link_sources("", &mount_root, &sources, false);
        assert_eq!(reports[0].outcome, LinkOutcome::Collided);

        let (mount, _) = builder.mount_points("", &mount_root, &sources, false)?;
        let mount = mount.expect("mount");
        let point = &mount.points[0];
        assert!(!point.cleanable);
        assert_eq!(point.name, "/docs");

        point.unmount()?;
        mount.unmount()?;
        assert_eq!(fs::read_to_string(&existing)?, "real file");
        Ok(())
    }

    #[test]
    fn test_collision_with_prior_link_leaves_it_untouched() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", "other"])?;
        let mount_root = temp_dir.path().join("mnt");
        fs::create_dir(&mount_root)?;
        let prior = mount_root.join("docs");
        symlink(&sources[1], &prior)?;

        let (mount, _) = builder.mount_points("", &mount_root, &sources[..1], false)?;
        let mount = mount.expect("mount");
        assert!(!mount.points[0].cleanable);

        mount.unmount()?;
        assert_eq!(fs::read_link(&prior)?, sources[1]);
        Ok(())
    }

    #[test]
    fn test_same_base_name_collides_within_one_call() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let first = temp_dir.path().join("a").join("docs");
        let second = temp_dir.path().join("b").join("docs");
        fs::create_dir_all(&first)?;
        fs::create_dir_all(&second)?;
        let mount_root = temp_dir.path().join("mnt");

        let (mount, _) =
            builder.mount_points("", &mount_root, &[first.clone(), second], false)?;
        let mount = mount.expect("mount");
        assert_eq!(mount.points.len(), 2);
        assert!(mount.points[0].cleanable);
        assert!(!mount.points[1].cleanable);
        assert_eq!(fs::read_link(mount_root.join("docs"))?, first);
        Ok(())
    }

    #[test]
    fn test_unmount_removes_only_created_links() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs"])?;
        let mount_root = temp_dir.path().join("mnt");

        let (mount, _) = builder.mount_points("", &mount_root, &sources, false)?;
        let point = mount.expect("mount").points.remove(0);

        point.unmount()?;
        assert!(fs::symlink_metadata(&point.mount_path).is_err());
        assert!(sources[0].join("test.txt").is_file());
        // already gone
        point.unmount()?;
        Ok(())
    }

    #[test]
    fn test_teardown_restores_previous_state() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", "notes", ".cache"])?;
        fs::create_dir(temp_dir.path().join("work"))?;
        fs::write(temp_dir.path().join("work").join("keep.txt"), "keep")?;

        let before = snapshot(temp_dir.path())?;

        let mount_root = temp_dir.path().join("work").join("deep").join(".gd").join("mnt");
        let (mount, _) = builder.mount_points("", &mount_root, &sources, false)?;
        let mount = mount.expect("mount");
        assert_eq!(mount.points.len(), 2);
        assert_eq!(
            mount.created_root.as_ref().map(|c| c.shortest_root.clone()),
            Some(temp_dir.path().join("work").join("deep"))
        );

        mount.unmount()?;
        assert_eq!(snapshot(temp_dir.path())?, before);
        Ok(())
    }

    #[test]
    fn test_mount_is_deterministic() -> Result<()> {
        let (temp_dir, builder) = setup_test_builder();
        let sources = create_sources(temp_dir.path(), &["docs", "notes"])?;
        let mount_root = temp_dir.path().join("work").join("mnt");

        let (first, _) = builder.mount_points("", &mount_root, &sources, false)?;
        let first = first.expect("mount");
        first.unmount()?;

        let (second, _) = builder.mount_points("", &mount_root, &sources, false)?;
        let second = second.expect("mount");
        assert_eq!(first, second);
        second.unmount()?;
        Ok(())
    }

    #[test]
    fn test_mount_record_serializes() -> Result<()> {
        let mount = Mount {
            points: vec![MountPoint {
                source: PathBuf::from("/home/u/docs"),
                mount_path: PathBuf::from("/work/mnt/docs"),
                name: "/docs".to_string(),
                cleanable: true,
            }],
            created_root: None,
        };
        let json = serde_json::to_string(&mount)?;
        assert_eq!(serde_json::from_str::<Mount>(&json)?, mount);
        Ok(())
    }

    #[test]
    fn test_point_name() {
        assert_eq!(point_name("", "docs"), "/docs");
        assert_eq!(point_name("mnt", "docs"), "/mnt/docs");
    }

    #[test]
    fn test_produces_point() {
        assert!(LinkOutcome::Created.produces_point());
        assert!(LinkOutcome::Collided.produces_point());
        assert!(!LinkOutcome::SkippedHidden.produces_point());
        assert!(!LinkOutcome::Failed.produces_point());
    }
}
