//! Decompressor (spec section 2 row F, section 4.7).
//!
//! Grounded on `mirror.rs`'s compression match arms (`GzDecoder`,
//! `bzip2::read::BzDecoder`, `xz2::read::XzDecoder`), generalised from
//! "decompress one already-identified reference" to "probe for whichever
//! compressed sibling of a bare index filename exists".

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Error};
use bzip2::read::BzDecoder;
use flate2::bufread::GzDecoder;
use xz2::read::XzDecoder;

/// Probe order, per spec section 4.7: try `.xz`, then `.gz`, then `.bz2`.
const CANDIDATE_EXTENSIONS: [&str; 3] = ["xz", "gz", "bz2"];

/// Given a bare index path `F` (no compression extension) under
/// `staging_root`, find the first compressed sibling that exists and
/// stream-expand it to `F`. Returns `Ok(true)` if a sibling was found and
/// expanded, `Ok(false)` if none of the three exist (a warning, not an
/// error - some indices are served uncompressed).
pub fn decompress_sibling(staging_root: &Path, bare_sanitised_path: &str) -> Result<bool, Error> {
    let bare_native = crate::path::to_native(staging_root, bare_sanitised_path);

    for ext in CANDIDATE_EXTENSIONS {
        let candidate_sanitised = format!("{bare_sanitised_path}.{ext}");
        let candidate_native = crate::path::to_native(staging_root, &candidate_sanitised);
        if !candidate_native.is_file() {
            continue;
        }

        let file = File::open(&candidate_native)
            .with_context(|| format!("opening {}", candidate_native.display()))?;
        let mut reader = BufReader::new(file);
        let mut out = Vec::new();

        match ext {
            "xz" => {
                XzDecoder::new_multi_decoder(reader)
                    .read_to_end(&mut out)
                    .with_context(|| format!("decompressing {}", candidate_native.display()))?;
            }
            "gz" => {
                GzDecoder::new(&mut reader)
                    .read_to_end(&mut out)
                    .with_context(|| format!("decompressing {}", candidate_native.display()))?;
            }
            "bz2" => {
                BzDecoder::new(reader)
                    .read_to_end(&mut out)
                    .with_context(|| format!("decompressing {}", candidate_native.display()))?;
            }
            _ => unreachable!(),
        }

        if let Some(parent) = bare_native.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&bare_native, out)
            .with_context(|| format!("writing {}", bare_native.display()))?;
        return Ok(true);
    }

    eprintln!("no compressed sibling of '{bare_sanitised_path}' found, leaving uncompressed copy (if any)");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn expands_gzip_sibling() {
        let dir = tempdir().unwrap();
        let native = crate::path::to_native(dir.path(), "main/binary-amd64/Packages.gz");
        std::fs::create_dir_all(native.parent().unwrap()).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Package: foo\n").unwrap();
        std::fs::write(&native, encoder.finish().unwrap()).unwrap();

        let found = decompress_sibling(dir.path(), "main/binary-amd64/Packages").unwrap();
        assert!(found);

        let bare = crate::path::to_native(dir.path(), "main/binary-amd64/Packages");
        assert_eq!(std::fs::read_to_string(bare).unwrap(), "Package: foo\n");
    }

    #[test]
    fn prefers_xz_over_gz_when_both_present() {
        let dir = tempdir().unwrap();
        let gz_native = crate::path::to_native(dir.path(), "Packages.gz");
        std::fs::create_dir_all(gz_native.parent().unwrap()).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"gz-body").unwrap();
        std::fs::write(&gz_native, encoder.finish().unwrap()).unwrap();

        let xz_native = crate::path::to_native(dir.path(), "Packages.xz");
        let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
        xz.write_all(b"xz-body").unwrap();
        std::fs::write(&xz_native, xz.finish().unwrap()).unwrap();

        decompress_sibling(dir.path(), "Packages").unwrap();
        let bare = crate::path::to_native(dir.path(), "Packages");
        assert_eq!(std::fs::read_to_string(bare).unwrap(), "xz-body");
    }

    #[test]
    fn missing_all_three_is_not_an_error() {
        let dir = tempdir().unwrap();
        let found = decompress_sibling(dir.path(), "main/binary-amd64/Packages").unwrap();
        assert!(!found);
    }
}
