//! Config Model (spec section 2, row A): an immutable snapshot of the
//! tunables a run is parameterised by, and the hand-rolled parser that
//! builds one from a configuration file.
//!
//! Grounded on `original_source/refrapt/classes.py::Settings`: the file
//! grammar is `set name = value` directives plus bare `deb`/`deb-src`
//! repository lines and `clean <uri> False` opt-outs, with no section
//! headers - a generic section-config crate would be the wrong tool here.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Error};

use crate::repository::{parse_line, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(value: &str) -> Option<LogLevel> {
        match value.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

/// Fetcher-only options, passed through verbatim (spec section 6 table).
#[derive(Debug, Clone, Default)]
pub struct FetcherOptions {
    pub auth_no_challenge: bool,
    pub no_check_certificate: bool,
    pub unlink: bool,
    pub use_proxy: bool,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub proxy_user: Option<String>,
    pub proxy_pass: Option<String>,
    pub certificate: Option<String>,
    pub ca_certificate: Option<String>,
    pub private_key: Option<String>,
}

/// An immutable snapshot of every tunable a run is parameterised by.
///
/// `root_path`/`mirror_path`/`skel_path`/`var_path` compose exactly as
/// string concatenation of `root_path` with the relative path fragments
/// below, matching the original's `rootPath + mirrorPath` style - they are
/// not independently-rooted paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub root_path: PathBuf,
    pub mirror_path: PathBuf,
    pub skel_path: PathBuf,
    pub var_path: PathBuf,
    pub architecture: String,
    pub contents: bool,
    pub threads: usize,
    pub limit_rate: Option<String>,
    pub languages: Vec<String>,
    pub force_update: bool,
    pub force_download: bool,
    pub by_hash: bool,
    pub log_level: LogLevel,
    pub test: bool,
    pub disable_clean: bool,
    pub fetcher: FetcherOptions,
    pub repositories: Vec<Repository>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_path: PathBuf::from("/var/spool/apt-mirror-sync"),
            mirror_path: PathBuf::from("mirror"),
            skel_path: PathBuf::from("skel"),
            var_path: PathBuf::from("var"),
            architecture: "amd64".to_string(),
            contents: false,
            threads: default_threads(),
            limit_rate: None,
            languages: Vec::new(),
            force_update: false,
            force_download: false,
            by_hash: false,
            log_level: LogLevel::Info,
            test: false,
            disable_clean: false,
            fetcher: FetcherOptions::default(),
            repositories: Vec::new(),
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Collapse a `xx_YY`-style region code to its base language `xx`.
fn collapse_language(code: &str) -> String {
    match code.split_once('_') {
        Some((base, _)) => base.to_string(),
        None => code.to_string(),
    }
}

impl Config {
    /// Parse a configuration file's contents. Unknown `set` keys are logged
    /// and ignored (spec error kind 6); a single unparseable repository line
    /// is likewise skipped with a warning rather than aborting the whole
    /// file.
    pub fn parse(text: &str) -> Result<Config, Error> {
        let mut config = Config::default();
        let mut root_path_set = false;
        let mut languages_seen = HashSet::new();
        let mut clean_overrides: Vec<(String, bool)> = Vec::new();

        for raw_line in text.lines() {
            let line = match raw_line.find('#') {
                Some(idx) => &raw_line[..idx],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("set ") {
                let Some((name, value)) = rest.split_once('=') else {
                    eprintln!("malformed 'set' directive '{line}', ignoring");
                    continue;
                };
                let name = name.trim();
                let value = value.trim();
                apply_setting(&mut config, name, value, &mut root_path_set, &mut languages_seen);
                continue;
            }

            if let Some(rest) = line.strip_prefix("clean ") {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                match tokens.as_slice() {
                    [uri, flag] => {
                        let clean = !flag.eq_ignore_ascii_case("false");
                        clean_overrides.push((uri.to_string(), clean));
                    }
                    _ => eprintln!("malformed 'clean' directive '{line}', ignoring"),
                }
                continue;
            }

            if line.starts_with("deb") {
                match parse_line(line, &config.architecture) {
                    Ok(repo) => config.repositories.push(repo),
                    Err(err) => eprintln!("skipping unparseable repository line '{line}': {err}"),
                }
                continue;
            }

            eprintln!("unrecognised configuration line '{line}', ignoring");
        }

        for (uri, clean) in clean_overrides {
            for repo in config.repositories.iter_mut() {
                if repo.uri == uri {
                    repo.clean = clean;
                }
            }
        }

        if config.repositories.is_empty() {
            bail!("configuration declares no repositories");
        }

        Ok(config)
    }

    pub fn mirror_root(&self) -> PathBuf {
        self.root_path.join(&self.mirror_path)
    }

    pub fn skel_root(&self) -> PathBuf {
        self.root_path.join(&self.skel_path)
    }

    pub fn var_root(&self) -> PathBuf {
        self.root_path.join(&self.var_path)
    }
}

fn apply_setting(
    config: &mut Config,
    name: &str,
    value: &str,
    root_path_set: &mut bool,
    languages_seen: &mut HashSet<String>,
) {
    match name {
        "rootPath" => {
            config.root_path = PathBuf::from(value);
            *root_path_set = true;
        }
        "mirrorPath" => config.mirror_path = PathBuf::from(value),
        "skelPath" => config.skel_path = PathBuf::from(value),
        "varPath" => config.var_path = PathBuf::from(value),
        "architecture" => config.architecture = value.to_string(),
        "contents" => config.contents = parse_bool(value),
        "threads" => {
            if let Ok(n) = value.parse() {
                config.threads = n;
            } else {
                eprintln!("invalid 'threads' value '{value}', ignoring");
            }
        }
        "limitRate" => config.limit_rate = Some(value.to_string()),
        "language" => {
            for code in value.split(',') {
                let code = code.trim();
                if code.is_empty() {
                    continue;
                }
                let collapsed = collapse_language(code);
                if languages_seen.insert(collapsed.clone()) {
                    config.languages.push(collapsed);
                }
            }
        }
        "forceUpdate" => config.force_update = parse_bool(value),
        "forceDownload" => config.force_download = parse_bool(value),
        "byHash" => config.by_hash = parse_bool(value),
        "test" => config.test = parse_bool(value),
        "disableClean" => config.disable_clean = parse_bool(value),
        "logLevel" => match LogLevel::parse(value) {
            Some(level) => config.log_level = level,
            None => eprintln!("invalid 'logLevel' value '{value}', ignoring"),
        },
        "authNoChallenge" => config.fetcher.auth_no_challenge = parse_bool(value),
        "noCheckCertificate" => config.fetcher.no_check_certificate = parse_bool(value),
        "unlink" => config.fetcher.unlink = parse_bool(value),
        "useProxy" => config.fetcher.use_proxy = parse_bool(value),
        "httpProxy" => config.fetcher.http_proxy = Some(value.to_string()),
        "httpsProxy" => config.fetcher.https_proxy = Some(value.to_string()),
        "proxyUser" => config.fetcher.proxy_user = Some(value.to_string()),
        "proxyPass" => config.fetcher.proxy_pass = Some(value.to_string()),
        "certificate" => config.fetcher.certificate = Some(value.to_string()),
        "caCertificate" => config.fetcher.ca_certificate = Some(value.to_string()),
        "privateKey" => config.fetcher.private_key = Some(value.to_string()),
        other => eprintln!("unknown configuration key '{other}', ignoring"),
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_settings_and_repository() {
        let text = "\
set rootPath = /srv/mirror
set architecture = amd64
set contents = true
set language = en_US, de
deb [arch=amd64] http://example/ubuntu focal main
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.root_path, PathBuf::from("/srv/mirror"));
        assert!(config.contents);
        assert_eq!(config.languages, vec!["en", "de"]);
        assert_eq!(config.repositories.len(), 1);
    }

    #[test]
    fn unknown_key_is_ignored_not_fatal() {
        let text = "\
set bogusKey = 1
deb http://example/vendor
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.repositories.len(), 1);
    }

    #[test]
    fn malformed_repository_line_is_skipped_not_fatal() {
        let text = "\
deb
deb http://example/vendor
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.repositories.len(), 1);
    }

    #[test]
    fn clean_directive_overrides_default() {
        let text = "\
deb http://example/vendor
clean http://example/vendor False
";
        let config = Config::parse(text).unwrap();
        assert!(!config.repositories[0].clean);
    }

    #[test]
    fn no_repositories_is_fatal() {
        let text = "set rootPath = /srv/mirror\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn language_region_codes_collapse_and_dedup() {
        let text = "\
set language = en_US, en_GB, de
deb http://example/vendor
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.languages, vec!["en", "de"]);
    }

    #[test]
    fn mirror_root_composes_from_root_and_relative_fragment() {
        let mut config = Config::default();
        config.root_path = PathBuf::from("/srv/mirror");
        config.mirror_path = PathBuf::from("mirror");
        assert_eq!(config.mirror_root(), PathBuf::from("/srv/mirror/mirror"));
    }
}
