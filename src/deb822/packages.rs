//! *Packages*/*Sources* paragraph parser (spec section 4.3(b)).
//!
//! Grounded on `original_source/refrapt/classes.py::Index.GetPackages`:
//! paragraphs are blank-line separated, a field's value continues on
//! following lines until the next recognised `Key:` header or blank line,
//! and only a small allow-list of fields is retained - deb822 paragraphs
//! carry plenty of metadata this crate never reads.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref KEY_RE: Regex = Regex::new(r"^([A-Za-z0-9_-]+):").unwrap();
}

const KEYWORDS: [&str; 7] = [
    "Filename",
    "MD5sum",
    "SHA1",
    "SHA256",
    "Size",
    "Files",
    "Directory",
];

/// One parsed paragraph, holding only the allow-listed fields present.
#[derive(Debug, Default, Clone)]
pub struct Paragraph {
    pub fields: HashMap<String, String>,
}

impl Paragraph {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

/// Split `text` (the already-decompressed contents of a Packages/Sources
/// index) into its paragraphs.
pub fn parse_paragraphs(text: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::default();
    let mut key: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.fields.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            key = None;
            continue;
        }

        if let Some(caps) = KEY_RE.captures(line) {
            let field = caps[1].to_string();
            if KEYWORDS.contains(&field.as_str()) {
                let value = line.splitn(2, ':').nth(1).unwrap_or("").trim().to_string();
                current.fields.insert(field.clone(), value);
                key = Some(field);
            } else {
                key = None;
            }
            continue;
        }

        if let Some(active) = &key {
            if let Some(value) = current.fields.get_mut(active) {
                value.push('\n');
                value.push_str(line.trim());
            }
        }
    }

    if !current.fields.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_paragraph() {
        let text = "\
Package: foo
Filename: pool/main/f/foo/foo_1.0_amd64.deb
Size: 1234
SHA256: abc123
Description: a tool
 with a continuation line that is not a keyword
";
        let paragraphs = parse_paragraphs(text);
        assert_eq!(paragraphs.len(), 1);
        let p = &paragraphs[0];
        assert_eq!(p.get("Filename"), Some("pool/main/f/foo/foo_1.0_amd64.deb"));
        assert_eq!(p.get("Size"), Some("1234"));
        assert!(p.get("Description").is_none());
        assert!(p.get("Package").is_none());
    }

    #[test]
    fn two_paragraphs_split_on_blank_line() {
        let text = "Filename: a.deb\nSize: 1\n\nFilename: b.deb\nSize: 2\n";
        let paragraphs = parse_paragraphs(text);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].get("Filename"), Some("a.deb"));
        assert_eq!(paragraphs[1].get("Filename"), Some("b.deb"));
    }

    #[test]
    fn trailing_paragraph_without_final_blank_line_is_flushed() {
        let text = "Filename: a.deb\nSize: 1";
        let paragraphs = parse_paragraphs(text);
        assert_eq!(paragraphs.len(), 1);
    }

    #[test]
    fn source_paragraph_retains_directory_and_files() {
        let text = "\
Package: foo
Directory: pool/main/f/foo
Files:
 abc123 2048 foo_1.0.tar.gz
 def456 512 foo_1.0.dsc
";
        let paragraphs = parse_paragraphs(text);
        let p = &paragraphs[0];
        assert_eq!(p.get("Directory"), Some("pool/main/f/foo"));
        assert_eq!(p.get("Files"), Some("\nabc123 2048 foo_1.0.tar.gz\ndef456 512 foo_1.0.dsc"));
    }

    #[test]
    fn continuation_value_preserves_colon_in_value() {
        let text = "Filename: http://example/a.deb\n";
        let paragraphs = parse_paragraphs(text);
        assert_eq!(paragraphs[0].get("Filename"), Some("http://example/a.deb"));
    }

    #[test]
    fn empty_input_yields_no_paragraphs() {
        assert!(parse_paragraphs("").is_empty());
        assert!(parse_paragraphs("\n\n\n").is_empty());
    }
}
