//! Orchestrator (spec section 2 row H, section 4.8): the seven-stage
//! pipeline's single-threaded coordinator.
//!
//! Grounded on `original_source/refrapt/refrapt.py::main`'s seven numbered
//! steps, restated as the explicit state machine spec section 4.8 names:
//!
//! ```text
//! Init -> FetchRelease -> ParseRelease -> FetchIndex -> Decompress
//!       -> BuildPlan -> FetchArtifacts -> Promote -> Sweep -> Done
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Error};

use crate::config::Config;
use crate::deb822::packages::parse_paragraphs;
use crate::deb822::release::{select_indices, ReleaseFile};
use crate::decompress;
use crate::fetch::{job_for, FetchJob, FetchKind, Fetcher, WorkerPool};
use crate::index_collection::{BinaryCollection, IndexCollection, IndexCollectionOps, SourceCollection};
use crate::lock;
use crate::path::{sanitise, to_native};
use crate::plan::build_plan;
use crate::progress::Progress;
use crate::promote::{self, PromoteTotals};
use crate::reference::ReferenceSet;
use crate::repository::{Repository, RepositoryType};
use crate::sweep::{self, SweepTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    FetchRelease,
    ParseRelease,
    FetchIndex,
    Decompress,
    BuildPlan,
    FetchArtifacts,
    Promote,
    Sweep,
    Done,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub progress: Progress,
    pub promote_totals: PromoteTotals,
    pub sweep_totals: SweepTotals,
    pub interrupted_previous_run: bool,
    pub excluded_repositories: Vec<String>,
}

struct RepoContext {
    repository: Repository,
    index_urls: Vec<String>,
    collection: IndexCollection,
}

/// Owns one run's mutable state: the Reference Set, per-repository Index
/// Collections, and the two flags discovered mid-run. Config and the
/// parsed Repository Descriptors are immutable once `execute` starts.
pub struct Run<'a> {
    config: Config,
    fetcher: &'a dyn Fetcher,
    test_mode: bool,
    pub stage: Stage,
}

impl<'a> Run<'a> {
    pub fn new(config: Config, fetcher: &'a dyn Fetcher, test_mode: bool) -> Run<'a> {
        Run { config, fetcher, test_mode, stage: Stage::Init }
    }

    /// Run the full pipeline. `clean_only` executes stages 1-4 and 7 only
    /// (discovery through planning, then sweep) - no artifact fetch, no
    /// promotion.
    pub fn execute(&mut self, clean_only: bool) -> Result<RunSummary, Error> {
        self.stage = Stage::Init;
        if self.config.repositories.is_empty() {
            bail!("configuration declares no repositories");
        }

        let var_root = self.config.var_root();
        let skel_root = self.config.skel_root();
        let mirror_root = self.config.mirror_root();
        for root in [&var_root, &skel_root, &mirror_root] {
            std::fs::create_dir_all(root)
                .map_err(|err| anyhow::anyhow!("creating {}: {err}", root.display()))?;
        }

        let recovered = lock::recover_interrupted_downloads(&var_root, &skel_root, &mirror_root)?;
        let (_app_lock, lock_interrupted) = lock::AppLock::acquire(&var_root)?;
        if !recovered.is_empty() {
            eprintln!("recovered {} interrupted download(s) from a prior run", recovered.len());
        }

        let interrupted_previous_run = lock_interrupted;
        let force = self.config.force_update || interrupted_previous_run;

        let pool = WorkerPool::from_config(&self.config);
        let mut reference = ReferenceSet::new();
        let mut progress = Progress::new();
        let mut excluded_repositories = Vec::new();

        self.stage = Stage::FetchRelease;
        let mut contexts = Vec::new();
        for repo in &self.config.repositories {
            let in_release_job = job_for(&repo.uri, &repo.distribution, "InRelease");
            let release_job = job_for(&repo.uri, &repo.distribution, "Release");
            let release_gpg_job = job_for(&repo.uri, &repo.distribution, "Release.gpg");
            let jobs = vec![in_release_job.clone(), release_job.clone(), release_gpg_job.clone()];

            let results = self.fetcher.download(&jobs, FetchKind::Release, &skel_root, &var_root, true, &pool);
            for outcome in results.iter().flatten() {
                progress.record(outcome);
            }

            let text = read_first_existing(&skel_root, &[&in_release_job, &release_job]);
            let Some(text) = text else {
                eprintln!("warning: {} has neither InRelease nor Release, excluding", repo.uri);
                excluded_repositories.push(repo.uri.clone());
                continue;
            };

            self.stage = Stage::ParseRelease;
            let release = match ReleaseFile::parse(&text) {
                Ok(release) => release,
                Err(err) => {
                    eprintln!("warning: failed to parse Release for {}: {err}", repo.uri);
                    excluded_repositories.push(repo.uri.clone());
                    continue;
                }
            };
            let selection = select_indices(&release, repo, &self.config);

            let mut collection = match repo.kind {
                RepositoryType::Binary => IndexCollection::Binary(BinaryCollection::default()),
                RepositoryType::Source => IndexCollection::Source(SourceCollection::default()),
            };
            for (key, relative) in &selection.registrations {
                let job = job_for(&repo.uri, &repo.distribution, relative);
                collection.add(key, job.dest_sanitised);
            }
            collection.determine_current_timestamps(&skel_root);

            reference.insert(in_release_job.dest_sanitised);
            reference.insert(release_job.dest_sanitised);
            reference.insert(release_gpg_job.dest_sanitised);

            contexts.push(RepoContext {
                repository: repo.clone(),
                index_urls: selection.urls,
                collection,
            });
        }

        self.stage = Stage::FetchIndex;
        for ctx in &contexts {
            let jobs: Vec<FetchJob> = ctx
                .index_urls
                .iter()
                .map(|relative| job_for(&ctx.repository.uri, &ctx.repository.distribution, relative))
                .collect();
            let results = self.fetcher.download(&jobs, FetchKind::Index, &skel_root, &var_root, force, &pool);
            for outcome in results.iter().flatten() {
                progress.record(outcome);
            }
            for job in jobs {
                reference.insert(job.dest_sanitised);
            }
        }
        for ctx in &mut contexts {
            ctx.collection.determine_download_timestamps(&skel_root);
        }

        self.stage = Stage::Decompress;
        self.stage = Stage::BuildPlan;
        let mut artifact_jobs = Vec::new();
        for ctx in &mut contexts {
            let modified = ctx.collection.modified_files(force);
            let unmodified = ctx.collection.unmodified_files(force);
            let repo_root = sanitise(&ctx.repository.uri);

            let bare_modified: HashSet<String> =
                modified.iter().map(|(_, path)| strip_index_suffix(path)).collect();
            let bare_unmodified: HashSet<String> = unmodified
                .iter()
                .map(|(_, path)| strip_index_suffix(path))
                .filter(|bare| !bare_modified.contains(bare))
                .collect();

            for bare in &bare_modified {
                decompress::decompress_sibling(&skel_root, bare)?;
                if let Some(text) = read_bare(&skel_root, bare) {
                    let paragraphs = parse_paragraphs(&text);
                    let packages = build_plan(
                        &paragraphs,
                        &repo_root,
                        &mirror_root,
                        &mut reference,
                        self.config.force_update,
                    );
                    for package in packages.into_iter().filter(|p| !p.latest) {
                        artifact_jobs.push(artifact_job(&ctx.repository.uri, &repo_root, &package.filename));
                    }
                }
            }
            for bare in &bare_unmodified {
                decompress::decompress_sibling(&skel_root, bare)?;
                if let Some(text) = read_bare(&skel_root, bare) {
                    let paragraphs = parse_paragraphs(&text);
                    let _ = build_plan(
                        &paragraphs,
                        &repo_root,
                        &mirror_root,
                        &mut reference,
                        self.config.force_update,
                    );
                }
            }
        }

        let skip_fetch_and_promote = self.test_mode || clean_only;

        self.stage = Stage::FetchArtifacts;
        if !skip_fetch_and_promote {
            let results =
                self.fetcher
                    .download(&artifact_jobs, FetchKind::Artifact, &skel_root, &var_root, self.config.force_update, &pool);
            for outcome in results.iter().flatten() {
                progress.record(outcome);
            }
        }

        self.stage = Stage::Promote;
        let promote_totals = if !skip_fetch_and_promote {
            promote::promote(&skel_root, &mirror_root, &reference)?
        } else {
            PromoteTotals::default()
        };

        self.stage = Stage::Sweep;
        let mut sweep_totals = SweepTotals::default();
        if !self.config.disable_clean {
            for ctx in &contexts {
                if !ctx.repository.clean {
                    continue;
                }
                if ctx.collection.modified_files(force).is_empty() {
                    continue;
                }
                let repo_mirror_root = to_native(&mirror_root, &sanitise(&ctx.repository.uri));
                let candidates = sweep::compute_candidates(&mirror_root, &repo_mirror_root, &reference)?;
                let totals = sweep::sweep(&mirror_root, &candidates, self.test_mode)?;
                sweep_totals.files_deleted += totals.files_deleted;
                sweep_totals.bytes_deleted += totals.bytes_deleted;
                sweep_totals.directories_pruned += totals.directories_pruned;
            }
        }

        self.stage = Stage::Done;
        Ok(RunSummary {
            progress,
            promote_totals,
            sweep_totals,
            interrupted_previous_run,
            excluded_repositories,
        })
    }
}

fn read_first_existing(skel_root: &Path, jobs: &[&FetchJob]) -> Option<String> {
    for job in jobs {
        let native = to_native(skel_root, &job.dest_sanitised);
        if let Ok(text) = std::fs::read_to_string(native) {
            return Some(text);
        }
    }
    None
}

fn read_bare(skel_root: &Path, bare_sanitised: &str) -> Option<String> {
    std::fs::read_to_string(to_native(skel_root, bare_sanitised)).ok()
}

fn strip_index_suffix(path: &str) -> String {
    for ext in [".xz", ".gz", ".bz2"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    path.to_string()
}

fn artifact_job(repo_uri: &str, repo_root_sanitised: &str, package_filename: &str) -> FetchJob {
    let prefix = format!("{repo_root_sanitised}/");
    let relative = package_filename.strip_prefix(&prefix).unwrap_or(package_filename);
    let url = format!("{}/{}", repo_uri.trim_end_matches('/'), relative);
    FetchJob { url, dest_sanitised: package_filename.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOutcome;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-memory fetcher used to avoid the network: serves pre-seeded
    /// bytes for a handful of URLs and records every job it was asked for.
    struct FakeFetcher {
        files: std::collections::HashMap<String, Vec<u8>>,
        seen: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn download(
            &self,
            jobs: &[FetchJob],
            _kind: FetchKind,
            staging_root: &Path,
            _var_root: &Path,
            _force_update: bool,
            _pool: &WorkerPool,
        ) -> Vec<Result<FetchOutcome, Error>> {
            let mut seen = self.seen.lock().unwrap();
            jobs.iter()
                .map(|job| {
                    seen.push(job.url.clone());
                    match self.files.get(&job.url) {
                        Some(bytes) => {
                            let dest = to_native(staging_root, &job.dest_sanitised);
                            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
                            std::fs::write(&dest, bytes).unwrap();
                            Ok(FetchOutcome { bytes_fetched: bytes.len(), skipped: false })
                        }
                        None => Ok(FetchOutcome { bytes_fetched: 0, skipped: true }),
                    }
                })
                .collect()
        }
    }

    #[test]
    fn s1_structured_binary_minimal_populates_reference_set() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.root_path = dir.path().to_path_buf();
        config.languages = vec!["en".to_string()];
        config.repositories =
            vec![crate::repository::parse_line("deb [arch=amd64] http://example/ubuntu focal main", "amd64").unwrap()];

        let release_text = "\
SHA256:\n\
 aaa 10 main/binary-amd64/Packages.xz\n\
 bbb 20 main/i18n/Index\n";

        let packages_text = "Package: foo\nFilename: pool/f/foo_1.0_amd64.deb\nSize: 5\n";

        let mut files = std::collections::HashMap::new();
        files.insert(
            "http://example/ubuntu/dists/focal/InRelease".to_string(),
            release_text.as_bytes().to_vec(),
        );
        files.insert(
            "http://example/ubuntu/dists/focal/main/binary-amd64/Packages.xz".to_string(),
            {
                let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
                use std::io::Write;
                xz.write_all(packages_text.as_bytes()).unwrap();
                xz.finish().unwrap()
            },
        );

        let fetcher = FakeFetcher { files, seen: Mutex::new(Vec::new()) };
        let mut run = Run::new(config, &fetcher, true);
        let summary = run.execute(false).unwrap();

        assert!(summary.excluded_repositories.is_empty());
        assert_eq!(run.stage, Stage::Done);
    }

    #[test]
    fn no_repositories_is_fatal() {
        let config = Config::default();
        let fetcher = FakeFetcher { files: Default::default(), seen: Mutex::new(Vec::new()) };
        let mut run = Run::new(config, &fetcher, true);
        assert!(run.execute(false).is_err());
    }

    #[test]
    fn missing_release_excludes_repository_but_does_not_fail_the_run() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.root_path = dir.path().to_path_buf();
        config.repositories =
            vec![crate::repository::parse_line("deb http://example/vendor focal main", "amd64").unwrap()];

        let fetcher = FakeFetcher { files: Default::default(), seen: Mutex::new(Vec::new()) };
        let mut run = Run::new(config, &fetcher, true);
        let summary = run.execute(false).unwrap();
        assert_eq!(summary.excluded_repositories, vec!["http://example/vendor".to_string()]);
    }
}
