//! # chapter-sync
//!
//! Incrementally mirrors serialized comics into a local library of CBZ
//! archives. Each chapter becomes one archive with its metadata embedded as
//! `ComicInfo.xml`; re-running only fetches what is new or changed.
//!
//! # Architecture: One Pipeline Per Series
//!
//! ```text
//! Discover   provider      →  Series + sorted chapters   (network)
//! Diff       library dir   →  Plan: publish / relabel    (local reads)
//! Execute    executor      →  fetch → split → write      (one unit per chapter)
//! ```
//!
//! The only persistent state is the library itself. There is no database or
//! cache file: an archive that exists under the right name and validates *is*
//! the record that its chapter was published.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sync`] | Orchestrator: discover, diff, schedule, settle; `Plan`, `SyncReport`, `SyncEvent` |
//! | [`provider`] | The `Provider` capability trait, its fault type, and the shipped sources |
//! | [`executor`] | Bounded worker pool with first-error-wins fail-fast |
//! | [`retry`] | Exponential backoff for transient provider faults |
//! | [`metadata`] | Metadata documents, per-archive fragments, and the splitter |
//! | [`archive`] | CBZ writing with atomic commit; reading and validating committed archives |
//! | [`library`] | Per-series index of committed archives, keyed by chapter id |
//! | [`naming`] | Directory-name parsing, archive and page file naming |
//! | [`types`] | `Series`, `Chapter`, `Page` and the number override transform |
//! | [`config`] | `chapter-sync.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for plans, progress and reports |
//!
//! # Design Decisions
//!
//! ## Identity Is the Chapter Id, Not the Number
//!
//! Sources renumber chapters: a "99" becomes "12.5" once someone notices it
//! was an extra. Archive file names therefore end in a short digest of the
//! provider's chapter id (`Ch.012.5 - Omake [a01b77e9c4].cbz`), and the
//! library index trusts only that digest. A renumbered chapter is recognised
//! and relabelled in place, without fetching its pages again.
//!
//! ## Atomic Commit
//!
//! Archives are assembled in a hidden temp file next to their destination and
//! renamed into place only after every page and the metadata are flushed.
//! Readers never see a half-written archive; a crash leaves at most a
//! `.*.cbz.part` file that the next run ignores.
//!
//! ## Fail-Fast, Keep What Committed
//!
//! The first chapter that fails stops the scheduling of further chapters in
//! the series. Chapters already committed stay committed, so the next run's
//! diff only schedules what is still missing.

pub mod archive;
pub mod config;
pub mod executor;
pub mod library;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod provider;
pub mod retry;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
