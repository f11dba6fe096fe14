//! Provider for series stored as plain directories.
//!
//! Useful for importing scans already on disk, and as a network-free source
//! for testing the whole pipeline.
//!
//! ```text
//! Dungeon Diary/                   # series location
//! ├── series.toml                  # optional metadata (see SeriesFile)
//! ├── cover.jpg                    # optional preview image
//! ├── 001-Arrival/                 # chapter id "001-Arrival", number 1
//! │   ├── 01.jpg
//! │   └── 02.jpg
//! ├── 001.5-Omake/                 # number 1.5
//! │   └── 1.png
//! └── extras/                      # unnumbered chapter
//!     └── sketch.webp
//! ```
//!
//! The chapter id is the subdirectory name, so renaming a directory makes it a
//! new chapter. Pages are the image files of a chapter directory, ordered by
//! their numeric stem first and file name second (`2.jpg` before `10.jpg`).

use super::{Provider, ProviderError};
use crate::naming::parse_entry_name;
use crate::types::{Chapter, Page, Series};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata file read from the series directory, all fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SeriesFile {
    title: Option<String>,
    authors: Vec<String>,
    artists: Vec<String>,
    genres: Vec<String>,
    summary: Option<String>,
    /// Preview image file name, relative to the series directory.
    cover: Option<String>,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

pub struct DirectorySource;

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>, ProviderError> {
    let context = format!("reading {}", dir.display());
    let entries = fs::read_dir(dir).map_err(|e| ProviderError::from_io(&context, &e))?;
    entries
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| ProviderError::from_io(&context, &e))
        })
        .collect()
}

/// Image files of a chapter directory in page order.
fn page_files(dir: &Path) -> Result<Vec<PathBuf>, ProviderError> {
    let mut files: Vec<PathBuf> = read_entries(dir)?
        .into_iter()
        .filter(|p| is_image(p))
        .collect();
    files.sort_by(|a, b| compare_pages(a, b));
    Ok(files)
}

fn compare_pages(a: &Path, b: &Path) -> Ordering {
    let stem_number = |p: &Path| {
        p.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| parse_entry_name(s).number)
    };
    match (stem_number(a), stem_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn find_cover(dir: &Path, named: Option<&str>) -> Option<PathBuf> {
    if let Some(name) = named {
        return Some(dir.join(name));
    }
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("cover.{ext}")))
        .find(|p| p.is_file())
}

impl Provider for DirectorySource {
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError> {
        let dir = Path::new(location);
        if !dir.is_dir() {
            return Err(ProviderError::Permanent(format!(
                "series directory not found: {location}"
            )));
        }

        let meta_path = dir.join("series.toml");
        let meta: SeriesFile = if meta_path.is_file() {
            let content = fs::read_to_string(&meta_path)
                .map_err(|e| ProviderError::from_io("reading series.toml", &e))?;
            toml::from_str(&content).map_err(|e| {
                ProviderError::Permanent(format!("parsing {}: {e}", meta_path.display()))
            })?
        } else {
            SeriesFile::default()
        };

        let preview = match find_cover(dir, meta.cover.as_deref()) {
            Some(path) => Some(
                fs::read(&path)
                    .map_err(|e| ProviderError::from_io(&format!("reading {}", path.display()), &e))?,
            ),
            None => None,
        };

        Ok(Series {
            location: location.to_string(),
            title: meta.title.unwrap_or_else(|| file_name(dir)),
            authors: meta.authors,
            artists: meta.artists,
            genres: meta.genres,
            summary: meta.summary,
            preview,
            chapters: Vec::new(),
        })
    }

    fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>, ProviderError> {
        let mut dirs: Vec<PathBuf> = read_entries(Path::new(&series.location))?
            .into_iter()
            .filter(|p| p.is_dir() && !file_name(p).starts_with('.'))
            .collect();
        dirs.sort();

        dirs.into_iter()
            .map(|dir| {
                let id = file_name(&dir);
                let parsed = parse_entry_name(&id);
                let page_count = page_files(&dir)?.len();
                Ok(Chapter {
                    number: parsed.number,
                    volume: None,
                    title: parsed.display_title,
                    location: dir.to_string_lossy().into_owned(),
                    page_count: Some(page_count),
                    id,
                })
            })
            .collect()
    }

    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError> {
        let files = page_files(Path::new(&chapter.location))?;
        if files.is_empty() {
            return Err(ProviderError::Permanent(format!(
                "chapter {} has no images",
                chapter.id
            )));
        }
        files
            .iter()
            .enumerate()
            .map(|(index, path)| {
                fs::read(path)
                    .map(|data| Page::new(index, data))
                    .map_err(|e| ProviderError::from_io(&format!("reading {}", path.display()), &e))
            })
            .collect()
    }
}
