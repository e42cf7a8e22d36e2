//! Incremental local mirror of Debian-style APT repositories.
//!
//! This library implements the mirror synchronisation engine: a seven-stage
//! pipeline that discovers what a remote APT repository currently serves by
//! parsing its *Release*/*Packages*/*Sources* indices, fetches only what has
//! changed since the last run, promotes the result into a live mirror tree,
//! and sweeps artifacts no longer referenced by any current index. See
//! `orchestrator::Run` for the pipeline entry point.

/// Config Model: parses the mirroring configuration file into an immutable
/// snapshot of tunables.
pub mod config;
/// deb822-family parsers: *Release* checksum blocks and *Packages*/*Sources*
/// paragraphs.
pub mod deb822;
/// Format-sniffing decompressor for index files.
pub mod decompress;
/// Fetcher contract and the bounded-parallel worker pool.
pub mod fetch;
/// Per-repository registry of expected index files and their timestamps.
pub mod index_collection;
/// Per-URL and whole-run lock files, for crash recovery.
pub mod lock;
/// Seven-stage pipeline coordinator.
pub mod orchestrator;
/// Deterministic URI -> filesystem path transform.
pub mod path;
/// Reads indices and emits the list of artifacts needing transfer.
pub mod plan;
/// Human-facing new-vs-reused file/byte counters.
pub mod progress;
/// Copies staged artifacts from staging into the live mirror.
pub mod promote;
/// Accumulates the set of paths the live mirror must retain.
pub mod reference;
/// One parsed `deb`/`deb-src` repository configuration line.
pub mod repository;
/// Walks the live mirror and deletes artifacts no longer referenced.
pub mod sweep;
