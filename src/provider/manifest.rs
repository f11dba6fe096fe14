//! Provider for sources that publish a JSON manifest per series.
//!
//! The series location points at a document like:
//!
//! ```json
//! {
//!   "title": "Dungeon Diary",
//!   "authors": ["A. Writer"],
//!   "artists": ["C. Artist"],
//!   "genres": ["Fantasy"],
//!   "summary": "Two friends and a dungeon.",
//!   "cover": "cover.jpg",
//!   "chapters": [
//!     { "id": "c1", "number": 1, "title": "Arrival", "url": "c1.json", "pages": 18 },
//!     { "id": "c1.5", "number": 1.5, "volume": 1, "url": "c1-5.json" }
//!   ]
//! }
//! ```
//!
//! Each chapter URL returns `{ "pages": ["001.jpg", "002.jpg", ...] }`. Relative
//! URLs resolve against the document they appear in. Page images are
//! requested one at a time, in order, with the chapter URL as referrer.
//!
//! The series document is downloaded once per discovery: `describe_series`
//! keeps its chapter entries for the `list_chapters` call that follows.

use super::{Provider, ProviderError, Transport};
use crate::types::{Chapter, Page, Series};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Deserialize)]
struct SeriesManifest {
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    artists: Vec<String>,
    #[serde(default)]
    genres: Vec<String>,
    summary: Option<String>,
    cover: Option<String>,
    #[serde(default)]
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    id: String,
    number: Option<f64>,
    volume: Option<f64>,
    #[serde(default)]
    title: String,
    url: String,
    pages: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PageListing {
    pages: Vec<String>,
}

pub struct ManifestSource {
    transport: Arc<dyn Transport>,
    /// Series location → chapter entries from the latest `describe_series`.
    pending: Mutex<HashMap<String, Vec<ChapterEntry>>>,
}

impl ManifestSource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Vec<ChapterEntry>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<T, ProviderError> {
        let body = self.transport.fetch(url, referer)?;
        serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Permanent(format!("parsing {url}: {e}")))
    }
}

fn resolve(base: &str, reference: &str) -> Result<String, ProviderError> {
    let base =
        Url::parse(base).map_err(|e| ProviderError::Permanent(format!("bad URL {base}: {e}")))?;
    base.join(reference)
        .map(String::from)
        .map_err(|e| ProviderError::Permanent(format!("bad URL {reference}: {e}")))
}

impl Provider for ManifestSource {
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError> {
        let manifest: SeriesManifest = self.fetch_json(location, None)?;

        // A missing cover is cosmetic; don't fail discovery over it.
        let preview = match &manifest.cover {
            Some(cover) => {
                let url = resolve(location, cover)?;
                match self.transport.fetch(&url, Some(location)) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(series = %location, error = %e, "cover fetch failed");
                        None
                    }
                }
            }
            None => None,
        };

        self.pending()
            .insert(location.to_string(), manifest.chapters);

        Ok(Series {
            location: location.to_string(),
            title: manifest.title,
            authors: manifest.authors,
            artists: manifest.artists,
            genres: manifest.genres,
            summary: manifest.summary,
            preview,
            chapters: Vec::new(),
        })
    }

    fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>, ProviderError> {
        let cached = self.pending().remove(&series.location);
        let entries = match cached {
            Some(entries) => entries,
            None => {
                let manifest: SeriesManifest = self.fetch_json(&series.location, None)?;
                manifest.chapters
            }
        };
        entries
            .into_iter()
            .map(|entry| -> Result<Chapter, ProviderError> {
                Ok(Chapter {
                    location: resolve(&series.location, &entry.url)?,
                    id: entry.id,
                    number: entry.number,
                    volume: entry.volume,
                    title: entry.title,
                    page_count: entry.pages,
                })
            })
            .collect()
    }

    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError> {
        let listing: PageListing = self.fetch_json(&chapter.location, None)?;
        if listing.pages.is_empty() {
            return Err(ProviderError::Permanent(format!(
                "chapter {} lists no pages",
                chapter.id
            )));
        }

        let mut pages = Vec::with_capacity(listing.pages.len());
        for (index, reference) in listing.pages.iter().enumerate() {
            let url = resolve(&chapter.location, reference)?;
            let data = self.transport.fetch(&url, Some(&chapter.location))?;
            pages.push(Page::new(index, data));
        }
        Ok(pages)
    }
}
