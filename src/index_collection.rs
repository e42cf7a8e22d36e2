//! Index Collection (spec section 2 row E, section 3, section 4.5).
//!
//! A per-repository registry of expected index files together with the
//! timestamp pair that drives change detection. Binary repositories key
//! entries by `(component, architecture)`; Source repositories key by
//! `component` alone. Represented as a sum type over one shared capability
//! set (`IndexCollectionOps`) rather than inheritance, per the design note
//! in spec section 9 - there is no single teacher file to ground this on,
//! the teacher's pool is content-addressed and has no notion of "modified
//! since last run" at all.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::deb822::release::IndexKey;
use crate::path::to_native;

/// `current` is the staged file's mtime before a sync cycle;  `download` is
/// its mtime after. Default `(0, 0)` counts as unmodified by definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampPair {
    pub current: f64,
    pub download: f64,
}

impl Default for TimestampPair {
    fn default() -> Self {
        TimestampPair { current: 0.0, download: 0.0 }
    }
}

impl TimestampPair {
    pub fn modified(&self) -> bool {
        self.current != self.download
    }
}

fn mtime_seconds(staging_root: &Path, sanitised_path: &str) -> Option<f64> {
    let native = to_native(staging_root, sanitised_path);
    let metadata = std::fs::metadata(native).ok()?;
    let modified = metadata.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs_f64())
}

const FLAT_COMPONENT: &str = "Flat";

#[derive(Debug, Default)]
pub struct BinaryCollection {
    entries: HashMap<(String, String), HashMap<String, TimestampPair>>,
}

#[derive(Debug, Default)]
pub struct SourceCollection {
    entries: HashMap<String, HashMap<String, TimestampPair>>,
}

#[derive(Debug)]
pub enum IndexCollection {
    Binary(BinaryCollection),
    Source(SourceCollection),
}

/// The capability set both variants share (spec section 9).
pub trait IndexCollectionOps {
    /// Register `path` under `key`, creating the bucket if needed.
    /// `key`/collection-kind mismatches (e.g. a `Source` key against a
    /// `Binary` collection) are ignored rather than panicking: the caller
    /// already filtered by repository kind before reaching here.
    fn add(&mut self, key: &IndexKey, path: String);

    fn determine_current_timestamps(&mut self, staging_root: &Path);
    fn determine_download_timestamps(&mut self, staging_root: &Path);

    fn modified_files(&self, force: bool) -> Vec<(IndexKey, String)>;
    fn unmodified_files(&self, force: bool) -> Vec<(IndexKey, String)>;
}

impl IndexCollectionOps for IndexCollection {
    fn add(&mut self, key: &IndexKey, path: String) {
        match (self, key) {
            (IndexCollection::Binary(collection), IndexKey::Binary { component, architecture }) => {
                collection
                    .entries
                    .entry((component.clone(), architecture.clone()))
                    .or_default()
                    .entry(path)
                    .or_insert_with(TimestampPair::default);
            }
            (IndexCollection::Binary(collection), IndexKey::Flat) => {
                collection
                    .entries
                    .entry((FLAT_COMPONENT.to_string(), FLAT_COMPONENT.to_string()))
                    .or_default()
                    .entry(path)
                    .or_insert_with(TimestampPair::default);
            }
            (IndexCollection::Source(collection), IndexKey::Source { component }) => {
                collection
                    .entries
                    .entry(component.clone())
                    .or_default()
                    .entry(path)
                    .or_insert_with(TimestampPair::default);
            }
            _ => {}
        }
    }

    fn determine_current_timestamps(&mut self, staging_root: &Path) {
        match self {
            IndexCollection::Binary(collection) => {
                for bucket in collection.entries.values_mut() {
                    for (path, pair) in bucket.iter_mut() {
                        pair.current = mtime_seconds(staging_root, path).unwrap_or(0.0);
                    }
                }
            }
            IndexCollection::Source(collection) => {
                for bucket in collection.entries.values_mut() {
                    for (path, pair) in bucket.iter_mut() {
                        pair.current = mtime_seconds(staging_root, path).unwrap_or(0.0);
                    }
                }
            }
        }
    }

    fn determine_download_timestamps(&mut self, staging_root: &Path) {
        match self {
            IndexCollection::Binary(collection) => {
                for bucket in collection.entries.values_mut() {
                    bucket.retain(|path, pair| match mtime_seconds(staging_root, path) {
                        Some(mtime) => {
                            pair.download = mtime;
                            true
                        }
                        None => false,
                    });
                }
            }
            IndexCollection::Source(collection) => {
                for bucket in collection.entries.values_mut() {
                    bucket.retain(|path, pair| match mtime_seconds(staging_root, path) {
                        Some(mtime) => {
                            pair.download = mtime;
                            true
                        }
                        None => false,
                    });
                }
            }
        }
    }

    fn modified_files(&self, force: bool) -> Vec<(IndexKey, String)> {
        select(self, force, |pair| pair.modified())
    }

    fn unmodified_files(&self, force: bool) -> Vec<(IndexKey, String)> {
        select(self, force, |pair| !pair.modified())
    }
}

fn select(
    collection: &IndexCollection,
    force: bool,
    predicate: impl Fn(&TimestampPair) -> bool,
) -> Vec<(IndexKey, String)> {
    let mut out = Vec::new();
    match collection {
        IndexCollection::Binary(collection) => {
            for ((component, architecture), bucket) in &collection.entries {
                for (path, pair) in bucket {
                    if force || predicate(pair) {
                        let key = if component == FLAT_COMPONENT && architecture == FLAT_COMPONENT {
                            IndexKey::Flat
                        } else {
                            IndexKey::Binary {
                                component: component.clone(),
                                architecture: architecture.clone(),
                            }
                        };
                        out.push((key, path.clone()));
                    }
                }
            }
        }
        IndexCollection::Source(collection) => {
            for (component, bucket) in &collection.entries {
                for (path, pair) in bucket {
                    if force || predicate(pair) {
                        out.push((IndexKey::Source { component: component.clone() }, path.clone()));
                    }
                }
            }
        }
    }
    out
}
