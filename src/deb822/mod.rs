//! Parsers for the two deb822-family grammars this crate consumes: the
//! *Release* checksum-block format and the *Packages*/*Sources*
//! paragraph format.

pub mod packages;
pub mod release;
