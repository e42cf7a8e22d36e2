//! Promoter (spec section 2 row K, section 4.10).
//!
//! Grounded on `original_source/refrapt/refrapt.py`'s "copy skel to main
//! archive" step (stage 6 of the original's pipeline), reworked into the
//! mtime-gated copy the spec demands instead of an unconditional copy.

use std::path::Path;

use anyhow::{Context, Error};

use crate::path::to_native;
use crate::reference::ReferenceSet;

#[derive(Debug, Default, Clone, Copy)]
pub struct PromoteTotals {
    pub files_copied: u64,
    pub bytes_copied: u64,
}

/// For every path in `reference`, if it exists under `staging_root`, copy
/// it to the corresponding location under `mirror_root`, creating parent
/// directories as needed. Copies only when the staging mtime is strictly
/// newer than the mirror file's (or the mirror file is absent) - this must
/// run before [`crate::sweep::sweep`] so a newly required file can never
/// be swept in the same cycle it is promoted.
pub fn promote(
    staging_root: &Path,
    mirror_root: &Path,
    reference: &ReferenceSet,
) -> Result<PromoteTotals, Error> {
    let mut totals = PromoteTotals::default();

    for sanitised in reference.iter() {
        let staged = to_native(staging_root, sanitised);
        let Ok(staged_metadata) = std::fs::metadata(&staged) else {
            continue;
        };
        if !staged_metadata.is_file() {
            continue;
        }

        let live = to_native(mirror_root, sanitised);
        let should_copy = match std::fs::metadata(&live) {
            Ok(live_metadata) => mtime(&staged_metadata) > mtime(&live_metadata),
            Err(_) => true,
        };
        if !should_copy {
            continue;
        }

        if let Some(parent) = live.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = std::fs::copy(&staged, &live)
            .with_context(|| format!("copying {} to {}", staged.display(), live.display()))?;

        totals.files_copied += 1;
        totals.bytes_copied += bytes;
    }

    Ok(totals)
}

fn mtime(metadata: &std::fs::Metadata) -> std::time::SystemTime {
    metadata.modified().unwrap_or(std::time::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, when: std::time::SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn copies_file_absent_from_mirror() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("skel");
        let mirror = dir.path().join("mirror");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("pkg.deb"), b"data").unwrap();

        let mut reference = ReferenceSet::new();
        reference.insert("pkg.deb");

        let totals = promote(&staging, &mirror, &reference).unwrap();
        assert_eq!(totals.files_copied, 1);
        assert!(mirror.join("pkg.deb").exists());
    }

    #[test]
    fn skips_when_mirror_copy_is_not_older() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("skel");
        let mirror = dir.path().join("mirror");
        fs::create_dir_all(&staging).unwrap();
        fs::create_dir_all(&mirror).unwrap();

        let now = std::time::SystemTime::now();
        fs::write(staging.join("pkg.deb"), b"data").unwrap();
        set_mtime(&staging.join("pkg.deb"), now);
        fs::write(mirror.join("pkg.deb"), b"data").unwrap();
        set_mtime(&mirror.join("pkg.deb"), now + Duration::from_secs(10));

        let mut reference = ReferenceSet::new();
        reference.insert("pkg.deb");

        let totals = promote(&staging, &mirror, &reference).unwrap();
        assert_eq!(totals.files_copied, 0);
    }

    #[test]
    fn missing_staged_file_is_skipped_not_an_error() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("skel");
        let mirror = dir.path().join("mirror");

        let mut reference = ReferenceSet::new();
        reference.insert("ghost.deb");

        let totals = promote(&staging, &mirror, &reference).unwrap();
        assert_eq!(totals.files_copied, 0);
    }
}
