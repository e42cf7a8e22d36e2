//! Lock Manager (spec section 2 row L, section 4.11).
//!
//! Grounded on `pool.rs`'s `Pool::lock`/`PoolLockGuard`, which uses
//! `proxmox_sys::fs::open_file_locked` + `CreateOptions` for an flock-based
//! exclusive file - the one piece of the teacher's storage layer that maps
//! directly onto this spec's lock manager. Unlike the teacher (and the
//! Python original, which both tolerate lock files surviving a clean
//! release on unix), this implementation removes its own lock files on
//! release - deterministic teardown, per spec section 9.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Error};
use proxmox_sys::fs::{open_file_locked, CreateOptions};

use crate::path::sanitise;

const APP_LOCK_NAME: &str = "apt-mirror-sync.lock";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-instance app lock held for the duration of a run.
///
/// If the lock file already existed on disk *before* this run opened it,
/// the previous run did not tear down cleanly (crash or kill) - the flock
/// itself is always released by the OS when a process dies, but this
/// implementation additionally removes the file on a clean exit, so a
/// surviving file is unambiguous evidence of an unclean one.
pub struct AppLock {
    _file: File,
    path: PathBuf,
}

impl AppLock {
    /// Acquire the app lock under `var_root`, creating the directory if
    /// needed. Returns the lock guard plus whether the previous run was
    /// interrupted.
    pub fn acquire(var_root: &Path) -> Result<(AppLock, bool), Error> {
        std::fs::create_dir_all(var_root)
            .with_context(|| format!("creating {}", var_root.display()))?;
        let path = var_root.join(APP_LOCK_NAME);
        let interrupted_previous_run = path.exists();

        let file = open_file_locked(&path, ACQUIRE_TIMEOUT, true, CreateOptions::default())
            .with_context(|| format!("acquiring app lock at {}", path.display()))?;

        Ok((AppLock { _file: file, path }, interrupted_previous_run))
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn url_lock_file_name(url: &str) -> String {
    sanitise(url).replace('/', "_")
}

fn url_locks_dir(var_root: &Path) -> PathBuf {
    var_root.join("locks")
}

/// One exclusive file per active download, recording the URL being
/// fetched. Held by a worker for the duration of one transfer.
pub struct UrlLock {
    path: PathBuf,
}

impl UrlLock {
    pub fn acquire(var_root: &Path, url: &str) -> Result<UrlLock, Error> {
        let dir = url_locks_dir(var_root);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(url_lock_file_name(url));
        std::fs::write(&path, url).with_context(|| format!("writing {}", path.display()))?;
        Ok(UrlLock { path })
    }

    pub fn release(self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

/// Scan `var_root`'s lock directory for URL locks left over from an
/// interrupted run, remove the corresponding partial file from staging (or
/// the live mirror if staging doesn't have it), and remove the stale lock.
/// Returns the recovered URLs, for logging.
pub fn recover_interrupted_downloads(
    var_root: &Path,
    staging_root: &Path,
    mirror_root: &Path,
) -> Result<Vec<String>, Error> {
    let dir = url_locks_dir(var_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut recovered = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let lock_path = entry.path();
        let url = match std::fs::read_to_string(&lock_path) {
            Ok(url) => url,
            Err(_) => {
                let _ = std::fs::remove_file(&lock_path);
                continue;
            }
        };

        let sanitised_path = sanitise(&url);
        let staging_partial = crate::path::to_native(staging_root, &sanitised_path);
        let mirror_partial = crate::path::to_native(mirror_root, &sanitised_path);
        let _ = std::fs::remove_file(&staging_partial);
        let _ = std::fs::remove_file(&mirror_partial);
        let _ = std::fs::remove_file(&lock_path);

        recovered.push(url);
    }

    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_var_root_is_not_interrupted() {
        let dir = tempdir().unwrap();
        let (lock, interrupted) = AppLock::acquire(dir.path()).unwrap();
        assert!(!interrupted);
        drop(lock);
        assert!(!dir.path().join(APP_LOCK_NAME).exists());
    }

    #[test]
    fn stale_lock_file_marks_previous_run_interrupted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(APP_LOCK_NAME), b"").unwrap();
        let (_lock, interrupted) = AppLock::acquire(dir.path()).unwrap();
        assert!(interrupted);
    }

    #[test]
    fn url_lock_round_trip() {
        let dir = tempdir().unwrap();
        let lock = UrlLock::acquire(dir.path(), "http://example.com/main/Packages").unwrap();
        assert!(lock.path.exists());
        lock.release().unwrap();
    }

    #[test]
    fn recover_removes_partial_and_lock() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("skel");
        let mirror = dir.path().join("mirror");
        let var = dir.path().join("var");

        let url = "http://example.com/main/Packages";
        let _lock = UrlLock::acquire(&var, url).unwrap();

        let partial = crate::path::to_native(&staging, &sanitise(url));
        std::fs::create_dir_all(partial.parent().unwrap()).unwrap();
        std::fs::write(&partial, b"partial").unwrap();

        let recovered = recover_interrupted_downloads(&var, &staging, &mirror).unwrap();
        assert_eq!(recovered, vec![url.to_string()]);
        assert!(!partial.exists());
        assert!(std::fs::read_dir(url_locks_dir(&var)).unwrap().next().is_none());
    }
}
