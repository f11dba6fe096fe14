//! Remote sources behind one capability interface.
//!
//! Every source implements [`Provider`]: describe a series, list its chapters,
//! and populate one chapter's pages. The orchestrator only ever talks to the
//! trait, so adding a source means adding a module and a [`Source`] variant.
//!
//! | Source | Location | Module |
//! |---|---|---|
//! | `directory` | local path of a series directory | [`directory`] |
//! | `manifest` | URL of a JSON series manifest | [`manifest`] |
//!
//! Providers hold no state shared with other providers and never write to
//! the library; all their side effects are network (or filesystem) reads.

pub mod directory;
pub mod manifest;
pub mod transport;

pub use directory::DirectorySource;
pub use manifest::ManifestSource;
pub use transport::{HttpTransport, Transport};

use crate::types::{Chapter, Page, Series};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A provider fault. The variant decides whether the orchestrator retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, rate limiting, dropped connections: worth another attempt.
    #[error("transient fault: {0}")]
    Transient(String),
    /// Removed content, parse failures, bad requests: retrying won't help.
    #[error("permanent fault: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify a local I/O error.
    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = format!("{context}: {err}");
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
                ProviderError::Transient(message)
            }
            _ => ProviderError::Permanent(message),
        }
    }
}

/// The capability every remote source implements.
///
/// `populate_pages` must return pages in their authored order, indexed from
/// zero, and must give the same bytes when called again for an unchanged
/// chapter: the orchestrator retries it freely.
pub trait Provider: Sync {
    /// Series-level metadata. The returned series has no chapters.
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError>;

    /// All chapters of `series`, in the order the source lists them.
    fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>, ProviderError>;

    /// Fetch every page of `chapter`.
    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError>;
}

/// Which provider a configured series uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Directory,
    Manifest,
}

/// HTTP settings handed to network-backed sources.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
}

/// The closed set of shipped sources.
pub enum Source {
    Directory(DirectorySource),
    Manifest(ManifestSource),
}

impl Source {
    pub fn new(kind: ProviderKind, http: &HttpSettings) -> Result<Self, ProviderError> {
        Ok(match kind {
            ProviderKind::Directory => Source::Directory(DirectorySource),
            ProviderKind::Manifest => {
                let transport = HttpTransport::new(&http.user_agent, http.timeout)?;
                Source::Manifest(ManifestSource::new(Arc::new(transport)))
            }
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Source::Directory(_) => ProviderKind::Directory,
            Source::Manifest(_) => ProviderKind::Manifest,
        }
    }
}

impl Provider for Source {
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError> {
        match self {
            Source::Directory(s) => s.describe_series(location),
            Source::Manifest(s) => s.describe_series(location),
        }
    }

    fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>, ProviderError> {
        match self {
            Source::Directory(s) => s.list_chapters(series),
            Source::Manifest(s) => s.list_chapters(series),
        }
    }

    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError> {
        match self {
            Source::Directory(s) => s.populate_pages(chapter),
            Source::Manifest(s) => s.populate_pages(chapter),
        }
    }
}
