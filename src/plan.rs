//! Plan Builder (spec section 2 row M, section 4.6).
//!
//! Grounded on `original_source/refrapt/refrapt.py::ProcessIndex`/
//! `NeedUpdate`: walk every paragraph of a decompressed Packages/Sources
//! index, decide per-artifact whether the copy already on disk is current,
//! and accumulate every named artifact into the Reference Set regardless -
//! a file that is already current still must not be swept.

use std::path::Path;

use crate::deb822::packages::Paragraph;
use crate::path::to_native;
use crate::reference::ReferenceSet;

/// One artifact the index declares. `latest == true` means the copy
/// already on disk matches what the index expects; only `latest == false`
/// entries participate in the artifact fetch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub filename: String,
    pub size: u64,
    pub latest: bool,
}

/// A file needs fetching if it is missing, its on-disk size disagrees with
/// what the index declared, or `force_update` is set.
pub fn needs_update(disk_path: &Path, declared_size: u64, force_update: bool) -> bool {
    if force_update {
        return true;
    }
    match std::fs::metadata(disk_path) {
        Ok(metadata) => metadata.len() != declared_size,
        Err(_) => true,
    }
}

fn join_relative(root: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if root.is_empty() {
        rel.to_string()
    } else {
        format!("{root}/{rel}")
    }
}

fn push_package(
    packages: &mut Vec<Package>,
    reference: &mut ReferenceSet,
    mirror_root: &Path,
    sanitised: String,
    size: u64,
    force_update: bool,
) {
    let disk_path = to_native(mirror_root, &sanitised);
    let stale = needs_update(&disk_path, size, force_update);
    reference.insert(sanitised.clone());
    packages.push(Package {
        filename: sanitised,
        size,
        latest: !stale,
    });
}

/// Run the plan builder over one index's already-parsed paragraphs.
/// `repo_root` is the sanitised path prefix this repository's artifacts
/// live under (e.g. `example.com/ubuntu`); `mirror_root` is the live
/// mirror's filesystem root used to check what is currently on disk.
///
/// Every named artifact is added to `reference` whether or not it needs
/// fetching - the caller is responsible for filtering `latest == false`
/// before handing the result to the Fetcher.
pub fn build_plan(
    paragraphs: &[Paragraph],
    repo_root: &str,
    mirror_root: &Path,
    reference: &mut ReferenceSet,
    force_update: bool,
) -> Vec<Package> {
    let mut packages = Vec::new();

    for paragraph in paragraphs {
        if let Some(raw_filename) = paragraph.get("Filename") {
            let trimmed = raw_filename.strip_prefix("./").unwrap_or(raw_filename);
            let sanitised = join_relative(repo_root, trimmed);
            let size = paragraph
                .get("Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            push_package(&mut packages, reference, mirror_root, sanitised, size, force_update);
            continue;
        }

        if let Some(files) = paragraph.get("Files") {
            let directory = paragraph.get("Directory").unwrap_or("");
            for line in files.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 3 {
                    eprintln!("malformed Files entry '{line}', skipping");
                    continue;
                }
                let size: u64 = match fields[1].parse() {
                    Ok(size) => size,
                    Err(_) => {
                        eprintln!("malformed Files entry '{line}', skipping");
                        continue;
                    }
                };
                let filename = fields[2].strip_prefix("./").unwrap_or(fields[2]);
                let sanitised = join_relative(repo_root, &format!("{}/{}", directory.trim_end_matches('/'), filename));
                push_package(&mut packages, reference, mirror_root, sanitised, size, force_update);
            }
        }
    }

    packages
}
