//! CBZ archive writing and reading.
//!
//! An archive is a zip file holding a chapter's pages, in order, plus a
//! `ComicInfo.xml` describing exactly those pages. Page entries are stored
//! uncompressed (images are already compressed); the metadata is deflated.
//!
//! ## Atomic commit
//!
//! [`ArchiveBuilder`] stages everything in a hidden `.…cbz.part` temp file in
//! the destination's own directory, so the final rename never crosses a
//! filesystem. The temp file is flushed and synced, then renamed over the
//! destination. Until [`ArchiveBuilder::commit`] returns, the destination is
//! exactly what it was before: absent, or the previously committed archive.
//! Dropping a builder deletes its temp file; a killed process can leave one
//! behind, which the library index ignores.
//!
//! ## Validity
//!
//! [`read_archive`] accepts an archive only when its `ComicInfo.xml` parses,
//! names a chapter id, and its `PageCount`, its page list and the number of
//! page entries all agree and are non-zero.

use crate::metadata::{Description, MetadataFragment, PageInfo, PageKind};
use crate::naming::{is_page_entry, page_entry_index, page_entry_name};
use crate::types::{Page, format_number};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the metadata entry inside every archive.
pub const COMIC_INFO: &str = "ComicInfo.xml";

/// Prefix of the `Notes` element that carries the chapter id.
const NOTES_ID_PREFIX: &str = "Chapter ID: ";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("ComicInfo.xml error: {0}")]
    ComicInfo(String),
    #[error("Archive would contain no pages: {0}")]
    NoPages(PathBuf),
    #[error("Metadata describes {fragment} pages but the archive holds {pages}")]
    PageCountMismatch { fragment: usize, pages: usize },
    #[error("Page {found} given where page {expected} was expected")]
    PageOrder { expected: usize, found: usize },
    #[error("Invalid archive {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("Destination has no parent directory: {0}")]
    NoParent(PathBuf),
}

// =============================================================================
// ComicInfo.xml
// =============================================================================

/// The subset of the ComicInfo schema this crate reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "ComicInfo")]
pub struct ComicInfo {
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "Series", default)]
    pub series: String,
    #[serde(rename = "Number", default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(rename = "Volume", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(rename = "Summary", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "Notes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "Writer", default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
    #[serde(rename = "Penciller", default, skip_serializing_if = "Option::is_none")]
    pub penciller: Option<String>,
    #[serde(rename = "Genre", default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(rename = "Web", default, skip_serializing_if = "Option::is_none")]
    pub web: Option<String>,
    #[serde(rename = "PageCount", default)]
    pub page_count: usize,
    #[serde(rename = "Pages", default)]
    pub pages: ComicPages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComicPages {
    #[serde(rename = "Page", default)]
    pub page: Vec<ComicPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicPage {
    #[serde(rename = "@Image")]
    pub image: usize,
    #[serde(rename = "@Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn join_list(values: &[String]) -> Option<String> {
    let joined = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl From<&MetadataFragment> for ComicInfo {
    fn from(fragment: &MetadataFragment) -> Self {
        let d = &fragment.description;
        Self {
            title: non_empty(&d.title),
            series: d.series.clone(),
            number: d.number.map(format_number),
            volume: d.volume.map(format_number),
            summary: d.summary.as_deref().and_then(non_empty),
            notes: Some(format!("{NOTES_ID_PREFIX}{}", d.chapter_id)),
            writer: join_list(&d.writers),
            penciller: join_list(&d.artists),
            genre: join_list(&d.genres),
            web: non_empty(&d.chapter_location),
            page_count: fragment.page_count(),
            pages: ComicPages {
                page: fragment
                    .pages
                    .iter()
                    .map(|p| ComicPage {
                        image: p.index,
                        kind: (p.kind == PageKind::FrontCover).then(|| "FrontCover".to_string()),
                    })
                    .collect(),
            },
        }
    }
}

impl ComicInfo {
    /// Serialize with an XML declaration.
    pub fn to_xml(&self) -> Result<String, ArchiveError> {
        let body =
            quick_xml::se::to_string(self).map_err(|e| ArchiveError::ComicInfo(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{body}\n"))
    }

    pub fn from_xml(xml: &str) -> Result<Self, ArchiveError> {
        quick_xml::de::from_str(xml).map_err(|e| ArchiveError::ComicInfo(e.to_string()))
    }

    /// The chapter id stored in `Notes`, if this file was written by us.
    pub fn chapter_id(&self) -> Option<&str> {
        self.notes
            .as_deref()
            .and_then(|n| n.strip_prefix(NOTES_ID_PREFIX))
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Rebuild the fragment this ComicInfo was written from.
    ///
    /// Returns `None` when no chapter id is present.
    pub fn to_fragment(&self) -> Option<MetadataFragment> {
        let chapter_id = self.chapter_id()?.to_string();
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok());
        let description = Description {
            series: self.series.clone(),
            chapter_id,
            chapter_location: self.web.clone().unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            number: parse(&self.number),
            volume: parse(&self.volume),
            summary: self.summary.clone(),
            writers: split_list(self.writer.as_deref()),
            artists: split_list(self.penciller.as_deref()),
            genres: split_list(self.genre.as_deref()),
        };
        let pages = self
            .pages
            .page
            .iter()
            .map(|p| PageInfo {
                index: p.image,
                kind: match p.kind.as_deref() {
                    Some("FrontCover") => PageKind::FrontCover,
                    _ => PageKind::Story,
                },
            })
            .collect();
        Some(MetadataFragment { description, pages })
    }
}

// =============================================================================
// Writing
// =============================================================================

/// A committed, validated archive on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    pub fragment: MetadataFragment,
}

impl ArchiveRecord {
    pub fn chapter_id(&self) -> &str {
        &self.fragment.description.chapter_id
    }

    pub fn page_count(&self) -> usize {
        self.fragment.page_count()
    }
}

fn stage_in(destination: &Path) -> Result<NamedTempFile, ArchiveError> {
    let dir = destination
        .parent()
        .ok_or_else(|| ArchiveError::NoParent(destination.to_path_buf()))?;
    Ok(tempfile::Builder::new()
        .prefix(".")
        .suffix(".cbz.part")
        .tempfile_in(dir)?)
}

/// Incrementally assembles one archive in a temp file next to its destination.
pub struct ArchiveBuilder {
    destination: PathBuf,
    zip: ZipWriter<NamedTempFile>,
    pages: usize,
}

impl ArchiveBuilder {
    /// Open a temp file in the destination's directory. The destination
    /// itself is not touched.
    pub fn create(destination: &Path) -> Result<Self, ArchiveError> {
        let staged = stage_in(destination)?;
        Ok(Self {
            destination: destination.to_path_buf(),
            zip: ZipWriter::new(staged),
            pages: 0,
        })
    }

    /// Append the next page. Pages must arrive in order.
    pub fn add_page(&mut self, page: &Page) -> Result<(), ArchiveError> {
        if page.index != self.pages {
            return Err(ArchiveError::PageOrder {
                expected: self.pages,
                found: page.index,
            });
        }
        self.add_entry(page_entry_name(self.pages, &page.data), &page.data)
    }

    fn add_entry(&mut self, name: String, data: &[u8]) -> Result<(), ArchiveError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;
        self.pages += 1;
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Write the metadata, flush, and atomically move the archive into place.
    pub fn commit(mut self, fragment: &MetadataFragment) -> Result<ArchiveRecord, ArchiveError> {
        if self.pages == 0 {
            return Err(ArchiveError::NoPages(self.destination));
        }
        if fragment.page_count() != self.pages {
            return Err(ArchiveError::PageCountMismatch {
                fragment: fragment.page_count(),
                pages: self.pages,
            });
        }

        let xml = ComicInfo::from(fragment).to_xml()?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(COMIC_INFO, options)?;
        self.zip.write_all(xml.as_bytes())?;

        let mut staged = self.zip.finish()?;
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.destination)
            .map_err(|e| ArchiveError::Io(e.error))?;

        tracing::debug!(path = %self.destination.display(), pages = self.pages, "archive committed");
        Ok(ArchiveRecord {
            path: self.destination,
            fragment: fragment.clone(),
        })
    }
}

/// Write `pages` plus `fragment` as one archive at `destination`.
///
/// Either the whole archive lands at `destination` or nothing changes there.
pub fn publish(
    destination: &Path,
    pages: &[Page],
    fragment: &MetadataFragment,
) -> Result<ArchiveRecord, ArchiveError> {
    if pages.is_empty() {
        return Err(ArchiveError::NoPages(destination.to_path_buf()));
    }
    if fragment.page_count() != pages.len() {
        return Err(ArchiveError::PageCountMismatch {
            fragment: fragment.page_count(),
            pages: pages.len(),
        });
    }
    let mut builder = ArchiveBuilder::create(destination)?;
    for page in pages {
        builder.add_page(page)?;
    }
    builder.commit(fragment)
}

/// Rewrite an archive's metadata without touching its pages.
///
/// Page entries are copied from `record.path` into a new archive committed at
/// `destination`; when that differs from the old path, the old file is
/// removed afterwards.
pub fn rewrite(
    record: &ArchiveRecord,
    destination: &Path,
    fragment: &MetadataFragment,
) -> Result<ArchiveRecord, ArchiveError> {
    let mut source = ZipArchive::new(File::open(&record.path)?)?;
    let mut names: Vec<(usize, String)> = source
        .file_names()
        .filter_map(|name| page_entry_index(name).map(|index| (index, name.to_string())))
        .collect();
    names.sort();

    let mut builder = ArchiveBuilder::create(destination)?;
    for (_, name) in names {
        let mut data = Vec::new();
        source.by_name(&name)?.read_to_end(&mut data)?;
        builder.add_entry(name, &data)?;
    }
    let committed = builder.commit(fragment)?;

    if record.path != destination {
        std::fs::remove_file(&record.path)?;
    }
    Ok(committed)
}

/// Atomically write a plain file (used for series covers).
pub fn write_atomic(destination: &Path, data: &[u8]) -> Result<(), ArchiveError> {
    let dir = destination
        .parent()
        .ok_or_else(|| ArchiveError::NoParent(destination.to_path_buf()))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged
        .persist(destination)
        .map_err(|e| ArchiveError::Io(e.error))?;
    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

/// Open and validate a committed archive.
pub fn read_archive(path: &Path) -> Result<ArchiveRecord, ArchiveError> {
    let invalid = |reason: String| ArchiveError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let mut zip = ZipArchive::new(File::open(path)?)?;
    let entries = zip.file_names().filter(|name| is_page_entry(name)).count();

    let mut xml = String::new();
    zip.by_name(COMIC_INFO)
        .map_err(|_| invalid(format!("missing {COMIC_INFO}")))?
        .read_to_string(&mut xml)?;
    let info = ComicInfo::from_xml(&xml)?;
    let fragment = info
        .to_fragment()
        .ok_or_else(|| invalid("no chapter id in metadata".into()))?;

    if entries == 0 {
        return Err(invalid("no pages".into()));
    }
    if info.page_count != entries || fragment.page_count() != entries {
        return Err(invalid(format!(
            "PageCount {} and {} listed pages disagree with {} page entries",
            info.page_count,
            fragment.page_count(),
            entries
        )));
    }

    Ok(ArchiveRecord {
        path: path.to_path_buf(),
        fragment,
    })
}
