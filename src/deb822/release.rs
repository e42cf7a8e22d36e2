//! *Release* file parser (spec section 4.3(a)) and the Release -> Index
//! Selection Policy (spec section 4.4).

use std::collections::{HashMap, HashSet};

use anyhow::Error;

use crate::config::Config;
use crate::repository::{Repository, RepositoryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    Sha256,
    Sha1,
    Md5Sum,
}

impl ChecksumKind {
    fn header_name(self) -> &'static str {
        match self {
            ChecksumKind::Sha256 => "SHA256",
            ChecksumKind::Sha1 => "SHA1",
            ChecksumKind::Md5Sum => "MD5Sum",
        }
    }

    /// Matches what `by-hash` URLs use as the path segment.
    pub fn by_hash_dir(self) -> &'static str {
        match self {
            ChecksumKind::Sha256 => "SHA256",
            ChecksumKind::Sha1 => "SHA1",
            ChecksumKind::Md5Sum => "MD5Sum",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChecksumEntry {
    pub kind: ChecksumKind,
    pub checksum: String,
    pub size: u64,
}

/// A parsed *Release* file: the union of every checksum block, keyed by the
/// path the block entry names. If a path reappears in a later block (e.g.
/// listed under both `SHA256:` and `SHA1:`), the later block wins - see
/// DESIGN.md's "checksum-kind preference" decision.
#[derive(Debug, Default, Clone)]
pub struct ReleaseFile {
    pub entries: HashMap<String, ChecksumEntry>,
}

impl ReleaseFile {
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut entries = HashMap::new();
        let mut block: Option<ChecksumKind> = None;

        for line in text.lines() {
            if let Some(kind) = header_kind(line) {
                block = Some(kind);
                continue;
            }

            let Some(kind) = block else { continue };

            if !line.starts_with(' ') && !line.starts_with('\t') {
                block = None;
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                eprintln!("malformed checksum line '{line}', skipping");
                continue;
            }

            let size: u64 = match fields[1].parse() {
                Ok(size) => size,
                Err(_) => {
                    eprintln!("malformed checksum line '{line}', skipping");
                    continue;
                }
            };

            entries.insert(
                fields[2].to_string(),
                ChecksumEntry {
                    kind,
                    checksum: fields[0].to_string(),
                    size,
                },
            );
        }

        Ok(ReleaseFile { entries })
    }
}

fn header_kind(line: &str) -> Option<ChecksumKind> {
    if line.contains("Hash:") {
        return None;
    }
    match line {
        "SHA256:" => Some(ChecksumKind::Sha256),
        "SHA1:" => Some(ChecksumKind::Sha1),
        "MD5Sum:" => Some(ChecksumKind::Md5Sum),
        _ => None,
    }
}

/// The component/architecture key an accepted Packages/Sources index is
/// registered under in the Index Collection (spec section 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Binary { component: String, architecture: String },
    Source { component: String },
    Flat,
}

#[derive(Debug, Default)]
pub struct Selection {
    /// Every index-file path to fetch, relative to the repository's
    /// `dists/<distribution>/` root (or the repository root itself, for a
    /// flat layout), already de-duplicated.
    pub urls: Vec<String>,
    /// The subset of `urls` that are Packages/Sources indices, paired with
    /// the key they're registered under in the Index Collection.
    pub registrations: Vec<(IndexKey, String)>,
}

const PACKAGE_SUFFIXES: [&str; 4] = ["", ".gz", ".bz2", ".xz"];

fn is_package_index(basename: &str) -> Option<&'static str> {
    for suffix in PACKAGE_SUFFIXES {
        if basename == format!("Packages{suffix}") {
            return Some("Packages");
        }
    }
    None
}

fn is_source_index(basename: &str) -> Option<&'static str> {
    for suffix in PACKAGE_SUFFIXES {
        if basename == format!("Sources{suffix}") {
            return Some("Sources");
        }
    }
    None
}

/// Compute the set of index-file URLs to fetch for `repository`, given its
/// parsed Release file and the run's configuration. Pure function: no
/// filesystem or network access, fully unit-testable (spec scenarios
/// S1-S3).
pub fn select_indices(release: &ReleaseFile, repository: &Repository, config: &Config) -> Selection {
    let mut out = Selection::default();
    let mut seen = HashSet::new();

    let mut push = |out: &mut Selection, seen: &mut HashSet<String>, path: String| {
        if seen.insert(path.clone()) {
            out.urls.push(path);
        }
    };

    if repository.flat() {
        for path in release.entries.keys() {
            push(&mut out, &mut seen, path.clone());
            if let Some(basename) = path.rsplit('/').next() {
                if is_package_index(basename).is_some() {
                    out.registrations
                        .push((IndexKey::Flat, path.clone()));
                }
            }
        }
        return out;
    }

    match repository.kind {
        RepositoryType::Binary => {
            for component in &repository.components {
                for arch in &repository.architectures {
                    push(
                        &mut out,
                        &mut seen,
                        format!("{component}/binary-{arch}/Release"),
                    );

                    for matched in prefix_matches(release, &format!("{component}/binary-{arch}/Packages")) {
                        push(&mut out, &mut seen, matched.clone());
                        if let Some(basename) = matched.rsplit('/').next() {
                            if is_package_index(basename).is_some() {
                                out.registrations.push((
                                    IndexKey::Binary {
                                        component: component.clone(),
                                        architecture: arch.clone(),
                                    },
                                    matched.clone(),
                                ));
                            }
                        }
                        maybe_by_hash(&mut out, &mut seen, release, config, component, &matched, "binary", arch);
                    }

                    for matched in prefix_matches(release, &format!("{component}/cnf/Commands-{arch}")) {
                        push(&mut out, &mut seen, matched.clone());
                        maybe_by_hash(&mut out, &mut seen, release, config, component, &matched, "cnf", arch);
                    }
                    for matched in
                        prefix_matches(release, &format!("{component}/i18n/cnf/Commands-{arch}"))
                    {
                        push(&mut out, &mut seen, matched.clone());
                        maybe_by_hash(&mut out, &mut seen, release, config, component, &matched, "i18n", arch);
                    }

                    push(&mut out, &mut seen, format!("{component}/i18n/Index"));

                    for matched in
                        prefix_matches(release, &format!("{component}/dep11/Components-{arch}.yml"))
                    {
                        push(&mut out, &mut seen, matched.clone());
                        maybe_by_hash(&mut out, &mut seen, release, config, component, &matched, "dep11", arch);
                    }
                    for matched in prefix_matches(release, &format!("{component}/dep11/icons-")) {
                        if matched.contains(".tar") {
                            push(&mut out, &mut seen, matched.clone());
                            maybe_by_hash(&mut out, &mut seen, release, config, component, &matched, "dep11", arch);
                        }
                    }

                    if config.contents {
                        for matched in prefix_matches(release, &format!("Contents-{arch}")) {
                            push(&mut out, &mut seen, matched);
                        }
                        for matched in
                            prefix_matches(release, &format!("{component}/Contents-{arch}"))
                        {
                            push(&mut out, &mut seen, matched);
                        }
                    }
                }

                for language in &config.languages {
                    for matched in
                        prefix_matches(release, &format!("{component}/i18n/Translation-{language}"))
                    {
                        push(&mut out, &mut seen, matched);
                    }
                }
            }
        }
        RepositoryType::Source => {
            for component in &repository.components {
                push(&mut out, &mut seen, format!("{component}/source/Release"));
                for matched in prefix_matches(release, &format!("{component}/source/Sources")) {
                    push(&mut out, &mut seen, matched.clone());
                    if let Some(basename) = matched.rsplit('/').next() {
                        if is_source_index(basename).is_some() {
                            out.registrations.push((
                                IndexKey::Source {
                                    component: component.clone(),
                                },
                                matched,
                            ));
                        }
                    }
                }
            }
        }
    }

    out
}

/// Entries whose path starts with `prefix` and, past the prefix, contains
/// no further `/` (i.e. the prefix plus an optional `*`-style remainder in
/// the same path segment) - this is the crate's glob matcher for the
/// `Foo*` patterns in spec section 4.4.
fn prefix_matches<'a>(release: &'a ReleaseFile, prefix: &str) -> Vec<String> {
    release
        .entries
        .keys()
        .filter(|path| {
            path.strip_prefix(prefix)
                .map(|rest| !rest.contains('/'))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn maybe_by_hash(
    out: &mut Selection,
    seen: &mut HashSet<String>,
    release: &ReleaseFile,
    config: &Config,
    component: &str,
    matched_path: &str,
    family: &str,
    arch: &str,
) {
    if !config.by_hash {
        return;
    }
    let Some(entry) = release.entries.get(matched_path) else {
        return;
    };
    let family_dir = match family {
        "binary" => format!("binary-{arch}"),
        other => other.to_string(),
    };
    let pseudo = format!(
        "{component}/{family_dir}/by-hash/{}/{}",
        entry.kind.by_hash_dir(),
        entry.checksum
    );
    if seen.insert(pseudo.clone()) {
        out.urls.push(pseudo);
    }
}
