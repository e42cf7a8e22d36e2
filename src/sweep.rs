//! Sweeper (spec section 2 row J, section 4.9).
//!
//! Grounded on `pool.rs`'s gc-by-walk pattern (`walkdir::WalkDir` over a
//! tree, comparing what's found against a retained set) - generalised from
//! "orphaned pool entries" to "mirror files no longer named by any current
//! index".

use std::path::Path;

use anyhow::{Context, Error};
use walkdir::WalkDir;

use crate::path::sanitise;
use crate::reference::ReferenceSet;

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepTotals {
    pub files_deleted: u64,
    pub bytes_deleted: u64,
    pub directories_pruned: u64,
}

/// Walk `repo_mirror_root` (the sanitised subtree for one repository under
/// the live mirror) and return every regular file path (sanitised,
/// relative to `mirror_root`) that is NOT in `reference`. Symlinks are
/// never followed and are always retained, regardless of `reference`.
pub fn compute_candidates(
    mirror_root: &Path,
    repo_mirror_root: &Path,
    reference: &ReferenceSet,
) -> Result<Vec<String>, Error> {
    let mut candidates = Vec::new();

    if !repo_mirror_root.is_dir() {
        return Ok(candidates);
    }

    for entry in WalkDir::new(repo_mirror_root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", repo_mirror_root.display()))?;
        let file_type = entry.file_type();
        if file_type.is_symlink() || !file_type.is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(mirror_root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), mirror_root.display()))?;
        let sanitised = sanitise(&relative.to_string_lossy().replace('\\', "/"));

        if !reference.contains(&sanitised) {
            candidates.push(sanitised);
        }
    }

    Ok(candidates)
}

/// Delete every file in `candidates` (sanitised paths under `mirror_root`)
/// and prune directories left empty behind them. `test_mode` computes and
/// returns totals without deleting anything.
pub fn sweep(
    mirror_root: &Path,
    candidates: &[String],
    test_mode: bool,
) -> Result<SweepTotals, Error> {
    let mut totals = SweepTotals::default();
    let mut touched_dirs = std::collections::HashSet::new();

    for sanitised in candidates {
        let native = crate::path::to_native(mirror_root, sanitised);
        let size = std::fs::metadata(&native).map(|m| m.len()).unwrap_or(0);

        if !test_mode {
            std::fs::remove_file(&native)
                .with_context(|| format!("removing {}", native.display()))?;
        }

        totals.files_deleted += 1;
        totals.bytes_deleted += size;
        if let Some(parent) = native.parent() {
            touched_dirs.insert(parent.to_path_buf());
        }
    }

    if !test_mode {
        for dir in touched_dirs {
            totals.directories_pruned += prune_empty_ancestors(dir, mirror_root)?;
        }
    }

    Ok(totals)
}

fn prune_empty_ancestors(mut dir: std::path::PathBuf, root: &Path) -> Result<u64, Error> {
    let mut pruned = 0;
    while dir.starts_with(root) && dir != root {
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            break;
        }
        std::fs::remove_dir(&dir).with_context(|| format!("removing {}", dir.display()))?;
        pruned += 1;
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn candidates_excludes_referenced_files() {
        let dir = tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        let repo_root = mirror.join("example.com").join("ubuntu");
        fs::create_dir_all(&repo_root).unwrap();
        fs::write(repo_root.join("keep.deb"), b"x").unwrap();
        fs::write(repo_root.join("stale.deb"), b"x").unwrap();

        let mut reference = ReferenceSet::new();
        reference.insert("example.com/ubuntu/keep.deb");

        let candidates = compute_candidates(&mirror, &repo_root, &reference).unwrap();
        assert_eq!(candidates, vec!["example.com/ubuntu/stale.deb".to_string()]);
    }

    #[test]
    fn test_mode_computes_totals_without_deleting() {
        let dir = tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        fs::create_dir_all(mirror.join("a")).unwrap();
        fs::write(mirror.join("a/stale.deb"), b"12345").unwrap();

        let totals = sweep(&mirror, &["a/stale.deb".to_string()], true).unwrap();
        assert_eq!(totals.files_deleted, 1);
        assert_eq!(totals.bytes_deleted, 5);
        assert!(mirror.join("a/stale.deb").exists());
    }

    #[test]
    fn sweep_deletes_file_and_prunes_empty_directory() {
        let dir = tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        fs::create_dir_all(mirror.join("a/b")).unwrap();
        fs::write(mirror.join("a/b/stale.deb"), b"x").unwrap();

        let totals = sweep(&mirror, &["a/b/stale.deb".to_string()], false).unwrap();
        assert_eq!(totals.files_deleted, 1);
        assert!(!mirror.join("a/b/stale.deb").exists());
        assert!(!mirror.join("a/b").exists());
    }

    #[test]
    fn symlinks_are_never_candidates() {
        let dir = tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        let repo_root = mirror.join("example.com");
        fs::create_dir_all(&repo_root).unwrap();
        let target = repo_root.join("real.deb");
        fs::write(&target, b"x").unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, repo_root.join("link.deb")).unwrap();
            let reference = ReferenceSet::new();
            let candidates = compute_candidates(&mirror, &repo_root, &reference).unwrap();
            assert!(!candidates.iter().any(|c| c.ends_with("link.deb")));
        }
    }
}
