//! Apply a validated patch to the working tree.
//!
//! Applying is split in two: [`plan_effects`] turns a patch into a list of
//! [`FileEffect`]s without touching the disk, and a [`FileSink`] performs
//! them. Planning rejects unsafe paths up front, so a bad patch never leaves
//! the tree half-written.

use super::{ChangeAction, Patch};
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A single file-system effect derived from a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEffect {
    /// Overwrite (or create) the whole file, creating parent directories.
    Write { path: PathBuf, content: String },
    /// Remove the file if present.
    Remove { path: PathBuf },
}

/// Destination for file effects.
pub trait FileSink {
    /// Write the complete content of `path`, creating parent directories.
    fn write_file(&mut self, path: &Path, content: &str) -> Result<()>;
    /// Remove `path`. Absence is not an error.
    fn remove_file(&mut self, path: &Path) -> Result<()>;
}

/// Turn a patch into ordered file effects.
///
/// Fails if any path is empty, absolute, or climbs out of the repository, or
/// if a create/update change has no content.
pub fn plan_effects(patch: &Patch) -> Result<Vec<FileEffect>> {
    let mut effects = Vec::with_capacity(patch.changes.len());
    for change in &patch.changes {
        let path = checked_relative_path(&change.path)?;
        let effect = match change.action {
            ChangeAction::Delete => FileEffect::Remove { path },
            ChangeAction::Create | ChangeAction::Update => {
                let content = change.content.clone().ok_or_else(|| {
                    anyhow!(
                        "Missing content for {} {}",
                        change.action.as_str(),
                        change.path
                    )
                })?;
                FileEffect::Write { path, content }
            }
        };
        effects.push(effect);
    }
    Ok(effects)
}

/// Perform effects in order, stopping at the first failure.
pub fn perform_effects(effects: &[FileEffect], sink: &mut dyn FileSink) -> Result<()> {
    for effect in effects {
        match effect {
            FileEffect::Write { path, content } => sink
                .write_file(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            FileEffect::Remove { path } => sink
                .remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?,
        }
    }
    Ok(())
}

/// Plan and perform a patch against `sink`.
pub fn apply_patch(patch: &Patch, sink: &mut dyn FileSink) -> Result<Vec<FileEffect>> {
    let effects = plan_effects(patch)?;
    perform_effects(&effects, sink)?;
    Ok(effects)
}

fn checked_relative_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Patch contains an empty path"));
    }
    let path = PathBuf::from(trimmed);
    if path.is_absolute() || path.has_root() {
        return Err(anyhow!("Absolute paths are not allowed: {}", trimmed));
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(anyhow!("Parent traversal is not allowed: {}", trimmed));
    }
    Ok(path)
}

/// Writes effects into a directory on disk (the repository root).
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of `path` inside the root.
    ///
    /// No component along the way may be a symlink, so the result cannot
    /// leave the repository.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let relative = checked_relative_path(&path.to_string_lossy())?;
        let mut current = self
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", self.root.display()))?;
        for component in relative.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            current.push(part);
            if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
                bail!("Symlinks are not allowed: {}", relative.display());
            }
        }
        Ok(current)
    }
}

impl FileSink for FsSink {
    fn write_file(&mut self, path: &Path, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, content)?;
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        match fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Change;
    use crate::test_support::MemorySink;
    use tempfile::tempdir;

    fn patch(changes: Vec<Change>) -> Patch {
        Patch {
            summary: "test".to_string(),
            changes,
        }
    }

    #[test]
    fn plan_preserves_order_and_actions() {
        let p = patch(vec![
            Change::write("docs/a.md", ChangeAction::Create, "a"),
            Change::delete("b.txt"),
            Change::write("c.rs", ChangeAction::Update, "c"),
        ]);
        let effects = plan_effects(&p).unwrap();
        assert_eq!(
            effects,
            vec![
                FileEffect::Write {
                    path: PathBuf::from("docs/a.md"),
                    content: "a".to_string()
                },
                FileEffect::Remove {
                    path: PathBuf::from("b.txt")
                },
                FileEffect::Write {
                    path: PathBuf::from("c.rs"),
                    content: "c".to_string()
                },
            ]
        );
    }

    #[test]
    fn plan_rejects_escaping_paths_before_any_effect() {
        let mut sink = MemorySink::default();
        let p = patch(vec![
            Change::write("ok.md", ChangeAction::Create, "fine"),
            Change::write("../outside.md", ChangeAction::Create, "nope"),
        ]);
        let err = apply_patch(&p, &mut sink).unwrap_err();
        assert!(err.to_string().contains("Parent traversal"));
        assert!(sink.files.is_empty());

        assert!(plan_effects(&patch(vec![Change::delete("/etc/passwd")])).is_err());
        assert!(plan_effects(&patch(vec![Change::delete("   ")])).is_err());
    }

    #[test]
    fn memory_sink_applies_full_overwrites() {
        let mut sink = MemorySink::default();
        sink.files
            .insert(PathBuf::from("README.md"), "old text".to_string());
        let p = patch(vec![
            Change::write("README.md", ChangeAction::Update, "new text"),
            Change::delete("missing.txt"),
        ]);
        apply_patch(&p, &mut sink).unwrap();
        assert_eq!(sink.files[&PathBuf::from("README.md")], "new text");
        assert_eq!(sink.removed, vec![PathBuf::from("missing.txt")]);
    }

    #[test]
    fn fs_sink_creates_parents_and_deletes_idempotently() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path());
        let p = patch(vec![
            Change::write("nested/deep/file.txt", ChangeAction::Create, "hello"),
            Change::delete("never-existed.txt"),
        ]);
        apply_patch(&p, &mut sink).unwrap();
        let written = fs::read_to_string(dir.path().join("nested/deep/file.txt")).unwrap();
        assert_eq!(written, "hello");

        let p = patch(vec![Change::delete("nested/deep/file.txt")]);
        apply_patch(&p, &mut sink).unwrap();
        apply_patch(&p, &mut sink).unwrap();
        assert!(!dir.path().join("nested/deep/file.txt").exists());
    }

    #[test]
    fn fs_sink_overwrites_instead_of_appending() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a much longer original body").unwrap();
        let mut sink = FsSink::new(dir.path());
        apply_patch(
            &patch(vec![Change::write("a.txt", ChangeAction::Update, "short")]),
            &mut sink,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "short");
    }

    #[cfg(unix)]
    #[test]
    fn fs_sink_refuses_to_write_through_symlinks() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let mut sink = FsSink::new(dir.path());

        let err = sink
            .write_file(Path::new("link/escape.txt"), "nope")
            .unwrap_err();
        assert!(err.to_string().contains("Symlinks are not allowed"));
        assert!(!outside.path().join("escape.txt").exists());
        assert!(sink.remove_file(Path::new("link")).is_err());

        sink.write_file(Path::new("plain.txt"), "ok").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("plain.txt")).unwrap(), "ok");
    }
}
