//! Deterministic URI -> filesystem path transform.
//!
//! Every other component compares paths in the *sanitised* domain (a
//! forward-slash string with scheme and port stripped) and only converts to
//! a native [`PathBuf`] at the point of an actual filesystem call. This is
//! the resolution of the open question in spec section 9: mixing
//! `normpath`-style and URL-style joins is exactly the bug class this split
//! avoids.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCHEME_RE: Regex = Regex::new(r"^[A-Za-z0-9]+://").unwrap();
    static ref PORT_RE: Regex = Regex::new(r":\d+").unwrap();
}

/// Strip the `scheme://` prefix and any `:<port>` token from `uri`.
///
/// Does not percent-decode and does not lowercase. Idempotent: calling this
/// on an already-sanitised string returns it unchanged.
pub fn sanitise(uri: &str) -> String {
    let without_scheme = SCHEME_RE.replace(uri, "");
    PORT_RE.replace_all(&without_scheme, "").into_owned()
}

/// Join a sanitised, forward-slash path onto a root directory, producing a
/// native path. This is the one place a sanitised path is allowed to touch
/// the filesystem's separator convention.
pub fn to_native(root: &Path, sanitised: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in sanitised.split('/') {
        if !component.is_empty() {
            path.push(component);
        }
    }
    path
}
