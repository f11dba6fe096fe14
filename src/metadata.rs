//! Metadata documents and their per-archive fragments.
//!
//! A [`MetadataDocument`] is the unified description of a batch of pages: the
//! series-level fields (title, creators, genre, summary) plus the chapter
//! fields and an ordered page list with per-page flags. It never reaches disk
//! as-is. [`split`] partitions it into one [`MetadataFragment`] per archive
//! unit, and each fragment is what the archive writer embeds.
//!
//! ## Splitting
//!
//! The split is a running-offset partition of the page list:
//!
//! ```text
//! document pages: [c 1 2 3 4 5 6]      unit sizes: [3, 4]
//! fragment 0:     [c 1 2]              (global 0..3 → local 0..3)
//! fragment 1:     [3 4 5 6]            (global 3..7 → local 0..4)
//! ```
//!
//! No page is reordered or shared between fragments, so concatenating the
//! fragments' page lists reproduces the document's list ([`rejoin`]). A unit
//! size sum that disagrees with the document's page count is a consistency
//! error, never a truncation or pad.

use crate::types::{Chapter, Series};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadataError {
    #[error("document declares {document} pages but archive units hold {units}")]
    PageCountMismatch { document: usize, units: usize },
    #[error("archive unit {0} would hold no pages")]
    EmptyUnit(usize),
}

/// Role of a page within its archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageKind {
    FrontCover,
    #[default]
    Story,
}

/// One entry of a page list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Position in the owning list: global in a document, local in a fragment.
    pub index: usize,
    pub kind: PageKind,
}

/// Fields copied verbatim into every fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub series: String,
    pub chapter_id: String,
    pub chapter_location: String,
    pub title: String,
    pub number: Option<f64>,
    pub volume: Option<f64>,
    pub summary: Option<String>,
    pub writers: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
}

impl Description {
    pub fn new(series: &Series, chapter: &Chapter) -> Self {
        Self {
            series: series.title.clone(),
            chapter_id: chapter.id.clone(),
            chapter_location: chapter.location.clone(),
            title: chapter.title.clone(),
            number: chapter.number,
            volume: chapter.volume,
            summary: series.summary.clone(),
            writers: series.authors.clone(),
            artists: series.artists.clone(),
            genres: series.genres.clone(),
        }
    }
}

/// Unified metadata for a batch of pages.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    pub description: Description,
    pub pages: Vec<PageInfo>,
}

impl MetadataDocument {
    /// Build a document for `page_count` pages. The first page is flagged as
    /// the front cover.
    pub fn new(description: Description, page_count: usize) -> Self {
        let pages = (0..page_count)
            .map(|index| PageInfo {
                index,
                kind: if index == 0 {
                    PageKind::FrontCover
                } else {
                    PageKind::Story
                },
            })
            .collect();
        Self { description, pages }
    }

    /// Document for one chapter. Uses the page count the provider declared
    /// at listing time when there is one, otherwise the fetched count.
    pub fn for_chapter(series: &Series, chapter: &Chapter, fetched_pages: usize) -> Self {
        let declared = chapter.page_count.unwrap_or(fetched_pages);
        Self::new(Description::new(series, chapter), declared)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// The projection of a document onto one archive.
///
/// Same fields as the document; the page list holds exactly this archive's
/// pages, re-indexed from zero.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFragment {
    pub description: Description,
    pub pages: Vec<PageInfo>,
}

impl MetadataFragment {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Same fragment with its chapter fields replaced, pages untouched.
    pub fn relabelled(&self, chapter: &Chapter) -> Self {
        let mut description = self.description.clone();
        description.title = chapter.title.clone();
        description.number = chapter.number;
        description.volume = chapter.volume;
        description.chapter_location = chapter.location.clone();
        Self {
            description,
            pages: self.pages.clone(),
        }
    }
}

/// Partition `document` into one fragment per archive unit.
///
/// `unit_sizes[i]` is the exact number of pages unit `i` will contain.
pub fn split(
    document: &MetadataDocument,
    unit_sizes: &[usize],
) -> Result<Vec<MetadataFragment>, MetadataError> {
    let units: usize = unit_sizes.iter().sum();
    if units != document.page_count() {
        return Err(MetadataError::PageCountMismatch {
            document: document.page_count(),
            units,
        });
    }
    if let Some(empty) = unit_sizes.iter().position(|&size| size == 0) {
        return Err(MetadataError::EmptyUnit(empty));
    }

    let mut offset = 0;
    let fragments = unit_sizes
        .iter()
        .map(|&size| {
            let pages = document.pages[offset..offset + size]
                .iter()
                .enumerate()
                .map(|(local, page)| PageInfo {
                    index: local,
                    kind: page.kind,
                })
                .collect();
            offset += size;
            MetadataFragment {
                description: document.description.clone(),
                pages,
            }
        })
        .collect();
    Ok(fragments)
}

/// The fragment for a chapter published as a single archive of `pages` pages.
pub fn fragment_for(
    document: &MetadataDocument,
    pages: usize,
) -> Result<MetadataFragment, MetadataError> {
    split(document, &[pages])?
        .pop()
        .ok_or(MetadataError::EmptyUnit(0))
}

/// Concatenate fragment page lists back into document order, restoring
/// global indices.
pub fn rejoin(fragments: &[MetadataFragment]) -> Vec<PageInfo> {
    let mut offset = 0;
    let mut pages = Vec::new();
    for fragment in fragments {
        pages.extend(fragment.pages.iter().map(|page| PageInfo {
            index: offset + page.index,
            kind: page.kind,
        }));
        offset += fragment.page_count();
    }
    pages
}
