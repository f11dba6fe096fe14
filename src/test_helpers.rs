//! Shared test utilities for the chapter-sync test suite.
//!
//! Provides chapter and page builders, a scripted in-memory [`MockProvider`],
//! an on-disk series fixture for the directory provider, and library
//! inspection helpers.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let provider = MockProvider::new("Dungeon Diary", vec![chapter("c1", Some(1.0))])
//!     .script("c1", vec![Err(ProviderError::Transient("429".into())), Ok(jpeg_pages(3))]);
//!
//! // ... run a sync ...
//!
//! assert_eq!(provider.fetched(), vec!["c1", "c1"]);
//! assert_eq!(archive_names(&library.join("Dungeon Diary")).len(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

use crate::naming::ARCHIVE_EXTENSION;
use crate::provider::{Provider, ProviderError};
use crate::types::{Chapter, Page, Series};

// =========================================================================
// Builders
// =========================================================================

/// A chapter with an id, optional number and nothing else.
pub fn chapter(id: &str, number: Option<f64>) -> Chapter {
    Chapter {
        id: id.to_string(),
        number,
        location: format!("mock://{id}"),
        ..Default::default()
    }
}

/// `chapter` with a declared page count.
pub fn declared(chapter: Chapter, pages: usize) -> Chapter {
    Chapter {
        page_count: Some(pages),
        ..chapter
    }
}

/// `n` distinct pages that sniff as JPEG.
pub fn jpeg_pages(n: usize) -> Vec<Page> {
    (0..n)
        .map(|i| Page::new(i, vec![0xFF, 0xD8, 0xFF, 0xE0, i as u8]))
        .collect()
}

// =========================================================================
// MockProvider
// =========================================================================

type Response = Result<Vec<Page>, ProviderError>;

/// In-memory provider with scripted page responses.
///
/// `populate_pages` pops the next scripted response for the chapter; once a
/// chapter's script is used up (or if it never had one) it returns
/// `page_count` JPEG pages, or 2 when no count is declared. Every call is
/// recorded in order. Uses Mutex so it is Sync and can serve executor
/// workers.
pub struct MockProvider {
    pub series: Series,
    pub chapters: Vec<Chapter>,
    pub listing_error: Option<ProviderError>,
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    fetched: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(title: &str, chapters: Vec<Chapter>) -> Self {
        Self {
            series: Series {
                title: title.to_string(),
                ..Default::default()
            },
            chapters,
            listing_error: None,
            scripts: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, id: &str, responses: Vec<Response>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), responses.into());
        self
    }

    pub fn fail_listing(mut self, err: ProviderError) -> Self {
        self.listing_error = Some(err);
        self
    }

    /// Chapter ids passed to `populate_pages`, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Provider for MockProvider {
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError> {
        Ok(Series {
            location: location.to_string(),
            ..self.series.clone()
        })
    }

    fn list_chapters(&self, _series: &Series) -> Result<Vec<Chapter>, ProviderError> {
        match &self.listing_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.chapters.clone()),
        }
    }

    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError> {
        self.fetched.lock().unwrap().push(chapter.id.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&chapter.id)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(jpeg_pages(chapter.page_count.unwrap_or(2))))
    }
}

// =========================================================================
// On-disk fixtures
// =========================================================================

/// Lay out a directory-provider series in a temp dir.
///
/// `chapters` maps chapter directory names to page counts. Returns the temp
/// dir; the series lives at its root.
pub fn directory_series(title: &str, chapters: &[(&str, usize)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("series.toml"),
        format!("title = {title:?}\nauthors = [\"A. Writer\"]\n"),
    )
    .unwrap();
    for (name, pages) in chapters {
        let dir = tmp.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for page in jpeg_pages(*pages) {
            std::fs::write(dir.join(format!("{:02}.jpg", page.index + 1)), &page.data).unwrap();
        }
    }
    tmp
}

// =========================================================================
// Library inspection
// =========================================================================

/// Sorted file names of the committed archives in `dir`. Empty if `dir`
/// does not exist.
pub fn archive_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let suffix = format!(".{ARCHIVE_EXTENSION}");
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(&suffix) && !name.starts_with('.'))
        .collect();
    names.sort();
    names
}
