//! Repository Descriptor: one parsed `deb`/`deb-src` configuration line.

use anyhow::{bail, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    Binary,
    Source,
}

/// An immutable, already-validated repository descriptor.
///
/// `flat` holds iff `distribution` is empty and `components` is empty - the
/// invariant is enforced in [`parse_line`], so a constructed `Repository` is
/// never in an inconsistent combination of the two.
#[derive(Debug, Clone)]
pub struct Repository {
    pub kind: RepositoryType,
    pub architectures: Vec<String>,
    pub uri: String,
    pub distribution: String,
    pub components: Vec<String>,
    pub clean: bool,
}

impl Repository {
    pub fn flat(&self) -> bool {
        self.distribution.is_empty() && self.components.is_empty()
    }
}

/// Parse a single `deb`/`deb-src` configuration line.
///
/// `default_arch` is used when the line carries no explicit `[arch=...]`
/// bracket. Strips a trailing `#...` comment before tokenising on
/// whitespace.
pub fn parse_line(line: &str, default_arch: &str) -> Result<Repository, Error> {
    let line = strip_comment(line);
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let kind = match tokens.first() {
        Some(&"deb") => RepositoryType::Binary,
        Some(&"deb-src") => RepositoryType::Source,
        Some(other) => bail!("unknown repository line kind '{other}'"),
        None => bail!("empty repository line"),
    };

    let mut rest = &tokens[1..];

    let architectures = if let Some(first) = rest.first() {
        if let Some(arch_csv) = first.strip_prefix("[arch=").and_then(|s| s.strip_suffix(']')) {
            rest = &rest[1..];
            let archs: Vec<String> = arch_csv
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            if archs.is_empty() {
                bail!("empty architecture list in bracket '{first}'");
            }
            archs
        } else if first.starts_with('[') {
            bail!("malformed architecture bracket '{first}'");
        } else {
            vec![default_arch.to_string()]
        }
    } else {
        vec![default_arch.to_string()]
    };

    let uri = match rest.first() {
        Some(uri) => {
            if uri.starts_with('[') {
                bail!("architecture bracket must precede the URI, found '{uri}' after it");
            }
            uri.to_string()
        }
        None => bail!("repository line is missing a URI"),
    };
    rest = &rest[1..];

    let (distribution, components) = match rest.first() {
        Some(&"/") | None => (String::new(), Vec::new()),
        Some(dist) => {
            let components: Vec<String> = rest[1..].iter().map(|s| s.to_string()).collect();
            (dist.to_string(), components)
        }
    };

    if kind == RepositoryType::Source && distribution.is_empty() && components.is_empty() {
        bail!("flat Source layouts are not supported");
    }

    Ok(Repository {
        kind,
        architectures,
        uri,
        distribution,
        components,
        clean: true,
    })
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_binary_minimal() {
        let repo =
            parse_line("deb [arch=amd64] http://example/ubuntu focal main", "i386").unwrap();
        assert_eq!(repo.kind, RepositoryType::Binary);
        assert_eq!(repo.architectures, vec!["amd64"]);
        assert_eq!(repo.uri, "http://example/ubuntu");
        assert_eq!(repo.distribution, "focal");
        assert_eq!(repo.components, vec!["main"]);
        assert!(!repo.flat());
    }

    #[test]
    fn flat_binary() {
        let repo = parse_line("deb http://vendor/repo", "amd64").unwrap();
        assert!(repo.flat());
        assert_eq!(repo.components, Vec::<String>::new());
        assert_eq!(repo.distribution, "");
    }

    #[test]
    fn multi_arch() {
        let repo = parse_line(
            "deb [arch=amd64,i386] http://m/d buster main",
            "amd64",
        )
        .unwrap();
        assert_eq!(repo.architectures, vec!["amd64", "i386"]);
    }

    #[test]
    fn default_arch_used_without_bracket() {
        let repo = parse_line("deb http://m/d buster main", "riscv64").unwrap();
        assert_eq!(repo.architectures, vec!["riscv64"]);
    }

    #[test]
    fn inline_comment_is_stripped() {
        let repo = parse_line(
            "deb http://m/d buster main # trailing comment with # hash",
            "amd64",
        )
        .unwrap();
        assert_eq!(repo.components, vec!["main"]);
    }

    #[test]
    fn flat_source_rejected() {
        let err = parse_line("deb-src http://vendor/repo", "amd64").unwrap_err();
        assert!(err.to_string().contains("flat"));
    }

    #[test]
    fn source_non_flat_ok() {
        let repo = parse_line("deb-src http://m/d buster main contrib", "amd64").unwrap();
        assert_eq!(repo.kind, RepositoryType::Source);
        assert_eq!(repo.components, vec!["main", "contrib"]);
    }

    #[test]
    fn missing_kind_errors() {
        assert!(parse_line("", "amd64").is_err());
    }

    #[test]
    fn unknown_kind_errors() {
        assert!(parse_line("rpm http://m/d", "amd64").is_err());
    }

    #[test]
    fn missing_uri_errors() {
        assert!(parse_line("deb", "amd64").is_err());
    }

    #[test]
    fn bracket_after_uri_errors() {
        assert!(parse_line("deb http://m/d [arch=amd64] buster main", "amd64").is_err());
    }

    #[test]
    fn invariant_flat_iff_empty_components() {
        for line in [
            "deb http://a/b",
            "deb [arch=amd64] http://a/b focal main",
            "deb http://a/b focal main contrib",
        ] {
            let repo = parse_line(line, "amd64").unwrap();
            assert_eq!(repo.flat(), repo.components.is_empty());
            assert!(!repo.architectures.is_empty());
        }
    }
}
