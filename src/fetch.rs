//! Fetcher contract (spec section 2 row G, section 6c) and the
//! bounded-parallel worker pool every pipeline stage's fan-out runs
//! through (spec section 5).
//!
//! `HttpFetcher` is grounded on `mirror.rs`'s `fetch_repo_file` (a
//! `proxmox_http::client::sync::Client` wrapped with a header map and a
//! `max_size`-bounded reader) - dropped the checksum-verification call (no
//! signature/checksum verification in scope here) and the pool-based dedup
//! (this design has no content-addressed pool). `WorkerPool` has no
//! grounding in the teacher - nothing in the pack reaches for a
//! thread-pool crate, so this follows suit with plain `std::thread` +
//! `std::sync::mpsc`.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Error};
use proxmox_http::{client::sync::Client, HttpClient, HttpOptions, ProxyConfig};

use crate::config::{Config, FetcherOptions};
use crate::lock::UrlLock;
use crate::path::{sanitise, to_native};

/// Which pipeline stage a batch of jobs belongs to - purely for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Release,
    Index,
    Artifact,
}

/// One file to retrieve: an absolute source URL and the staging-relative
/// destination it should land at.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub url: String,
    pub dest_sanitised: String,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub bytes_fetched: usize,
    /// `true` if the job was skipped because a locally newer copy already
    /// exists and `force_update` was not set.
    pub skipped: bool,
}

/// Bounded-parallel fetch collaborator. The core is agnostic to the
/// transport; `HttpFetcher` is the default, network-backed implementation,
/// and tests use an in-memory implementation to avoid the network.
pub trait Fetcher: Send + Sync {
    fn download(
        &self,
        jobs: &[FetchJob],
        kind: FetchKind,
        staging_root: &Path,
        var_root: &Path,
        force_update: bool,
        pool: &WorkerPool,
    ) -> Vec<Result<FetchOutcome, Error>>;
}

/// A small pool of worker threads sized to `Config::threads` (itself
/// defaulting to `std::thread::available_parallelism()`). Jobs within one
/// `map` call run in unspecified order; `map` itself is a join barrier.
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        WorkerPool { size: size.max(1) }
    }

    pub fn from_config(config: &Config) -> Self {
        WorkerPool::new(config.threads)
    }

    /// Run `f` over every item in `items`, distributing work across this
    /// pool's worker threads. Returns all results in unspecified order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let queue: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(items.into_iter().collect()));
        let f = Arc::new(f);
        let (tx, rx) = std::sync::mpsc::channel();
        let worker_count = self.size.min(queue.lock().unwrap().len());

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let f = Arc::clone(&f);
            let tx = tx.clone();
            handles.push(std::thread::spawn(move || loop {
                let item = queue.lock().unwrap().pop_front();
                match item {
                    Some(item) => {
                        if tx.send(f(item)).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }));
        }
        drop(tx);

        let results: Vec<R> = rx.into_iter().collect();
        for handle in handles {
            let _ = handle.join();
        }
        results
    }
}

/// Default network-backed [`Fetcher`], using the teacher's own HTTP client
/// wrapper (`proxmox_http::client::sync::Client`). Held behind an `Arc` so
/// worker-thread closures can share one client without requiring `Client`
/// itself to be `Clone`.
pub struct HttpFetcher {
    client: Arc<Client>,
    rate_limit_bytes_per_sec: Option<u64>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<HttpFetcher, Error> {
        let proxy_config = configure_proxy_env(&config.fetcher)?;

        let options = HttpOptions {
            user_agent: Some(concat!("apt-mirror-sync/", env!("CARGO_PKG_VERSION")).to_string()),
            proxy_config,
            ..Default::default()
        };

        // `auth_no_challenge`/`unlink`/`no_check_certificate`/`certificate`/
        // `ca_certificate`/`private_key` have no counterpart on
        // `proxmox_http`'s sync client - it exposes no TLS-override or
        // preemptive-auth surface to wire them into. They are parsed and
        // kept on `Config` for grammar completeness but not consulted here.
        Ok(HttpFetcher {
            client: Arc::new(Client::new(options)),
            rate_limit_bytes_per_sec: parse_rate_limit(config.limit_rate.as_deref()),
        })
    }
}

/// Resolve the proxy `HttpOptions` expects. If the config names an explicit
/// proxy, it is exported into the environment `ProxyConfig::from_proxy_env`
/// reads from (the only constructor this client exposes); otherwise the
/// environment is consulted as-is.
fn configure_proxy_env(fetcher: &FetcherOptions) -> Result<Option<ProxyConfig>, Error> {
    if fetcher.use_proxy {
        if let Some(proxy) = &fetcher.https_proxy {
            std::env::set_var("https_proxy", with_userinfo(proxy, fetcher));
        }
        if let Some(proxy) = &fetcher.http_proxy {
            std::env::set_var("http_proxy", with_userinfo(proxy, fetcher));
        }
    }
    ProxyConfig::from_proxy_env()
}

fn with_userinfo(proxy_url: &str, fetcher: &FetcherOptions) -> String {
    let Some(user) = &fetcher.proxy_user else {
        return proxy_url.to_string();
    };
    let pass = fetcher.proxy_pass.as_deref().unwrap_or("");
    match proxy_url.split_once("://") {
        Some((scheme, rest)) => format!("{scheme}://{user}:{pass}@{rest}"),
        None => format!("{user}:{pass}@{proxy_url}"),
    }
}

/// Parse a `limitRate`-style value (plain byte count, or `k`/`m`/`g`
/// suffixed, matching wget's `--limit-rate`) into bytes per second.
fn parse_rate_limit(value: Option<&str>) -> Option<u64> {
    let value = value?.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('k') | Some('K') => (&value[..value.len() - 1], 1024),
        Some('m') | Some('M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let base: u64 = digits.trim().parse().ok()?;
    Some(base * multiplier)
}

/// Caps throughput by sleeping once a one-second window's budget is spent.
struct ThrottledReader<R> {
    inner: R,
    limit_bytes_per_sec: u64,
    window_start: std::time::Instant,
    window_bytes: u64,
}

impl<R: Read> Read for ThrottledReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Ok(n);
        }
        let elapsed = self.window_start.elapsed();
        if elapsed >= std::time::Duration::from_secs(1) {
            self.window_start = std::time::Instant::now();
            self.window_bytes = n as u64;
            return Ok(n);
        }
        self.window_bytes += n as u64;
        let allowed = self.limit_bytes_per_sec * elapsed.as_millis().max(1) as u64 / 1000;
        if self.window_bytes > allowed {
            let overage = self.window_bytes - allowed;
            let sleep_ms = overage * 1000 / self.limit_bytes_per_sec;
            std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
        }
        Ok(n)
    }
}

fn fetch_one(
    client: &Client,
    job: &FetchJob,
    dest: &Path,
    rate_limit_bytes_per_sec: Option<u64>,
) -> Result<usize, Error> {
    let response = client
        .get(&job.url, None::<&HashMap<String, String>>)
        .with_context(|| format!("GET {}", job.url))?;
    let body: Box<dyn Read> = response.into_body();
    let mut reader: Box<dyn Read> = match rate_limit_bytes_per_sec {
        Some(limit_bytes_per_sec) if limit_bytes_per_sec > 0 => Box::new(ThrottledReader {
            inner: body,
            limit_bytes_per_sec,
            window_start: std::time::Instant::now(),
            window_bytes: 0,
        }),
        _ => body,
    };
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .with_context(|| format!("reading body of {}", job.url))?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(dest, &data).with_context(|| format!("writing {}", dest.display()))?;
    Ok(data.len())
}

impl Fetcher for HttpFetcher {
    fn download(
        &self,
        jobs: &[FetchJob],
        kind: FetchKind,
        staging_root: &Path,
        var_root: &Path,
        force_update: bool,
        pool: &WorkerPool,
    ) -> Vec<Result<FetchOutcome, Error>> {
        eprintln!("fetching {} {:?} job(s)", jobs.len(), kind);

        let jobs: Vec<(FetchJob, PathBuf)> = jobs
            .iter()
            .map(|job| (job.clone(), to_native(staging_root, &job.dest_sanitised)))
            .collect();

        let var_root = var_root.to_path_buf();
        let client = Arc::clone(&self.client);
        let rate_limit_bytes_per_sec = self.rate_limit_bytes_per_sec;

        pool.map(jobs, move |(job, dest)| -> Result<FetchOutcome, Error> {
            if !force_update && dest.is_file() {
                return Ok(FetchOutcome { bytes_fetched: 0, skipped: true });
            }

            let lock = UrlLock::acquire(&var_root, &job.url)?;
            let result = fetch_one(&client, &job, &dest, rate_limit_bytes_per_sec);
            lock.release()?;

            result.map(|bytes_fetched| FetchOutcome { bytes_fetched, skipped: false })
        })
    }
}

/// Build the `dists/<distribution>/<relative>` (or flat-root) URL and
/// staging-relative destination for one index/artifact path of a
/// repository.
pub fn job_for(repository_uri: &str, distribution: &str, relative: &str) -> FetchJob {
    let url = if distribution.is_empty() {
        format!("{}/{}", repository_uri.trim_end_matches('/'), relative)
    } else {
        format!(
            "{}/dists/{}/{}",
            repository_uri.trim_end_matches('/'),
            distribution,
            relative
        )
    };
    let dest_sanitised = sanitise(&url);
    FetchJob { url, dest_sanitised }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn worker_pool_processes_every_item() {
        let pool = WorkerPool::new(4);
        let items: Vec<u32> = (0..50).collect();
        let results = pool.map(items, |n| n * 2);
        let mut sorted = results;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn worker_pool_handles_empty_input() {
        let pool = WorkerPool::new(4);
        let results: Vec<u32> = pool.map(Vec::<u32>::new(), |n| n);
        assert!(results.is_empty());
    }

    #[test]
    fn worker_pool_uses_at_most_configured_threads() {
        let pool = WorkerPool::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..20).collect();

        let c1 = Arc::clone(&concurrent);
        let m1 = Arc::clone(&max_seen);
        pool.map(items, move |_| {
            let now = c1.fetch_add(1, Ordering::SeqCst) + 1;
            m1.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            c1.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn job_for_builds_dist_rooted_url_for_structured_repo() {
        let job = job_for("http://example.com/ubuntu", "focal", "main/binary-amd64/Release");
        assert_eq!(job.url, "http://example.com/ubuntu/dists/focal/main/binary-amd64/Release");
        assert_eq!(job.dest_sanitised, "example.com/ubuntu/dists/focal/main/binary-amd64/Release");
    }

    #[test]
    fn job_for_builds_flat_url_without_dists() {
        let job = job_for("http://vendor.example/repo", "", "Packages.gz");
        assert_eq!(job.url, "http://vendor.example/repo/Packages.gz");
    }
}
