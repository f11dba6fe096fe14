//! The local library: what has already been published for a series.
//!
//! Each series gets one directory under the library root. Its archives are
//! indexed by the chapter-id digest embedded in their file names (see
//! [`naming`](crate::naming)), never by label, so a chapter whose number or
//! title changes upstream still maps to the archive it was published as.
//!
//! Loading the index opens and validates every archive. Anything that fails
//! validation (truncated zip, missing `ComicInfo.xml`, page counts that don't
//! add up) is logged and left out, which makes its chapter look unpublished
//! and gets it replaced on the next run. Temp files of interrupted writes
//! (`.*.cbz.part`) never match the archive name pattern and are ignored.

use crate::archive::{ArchiveRecord, read_archive};
use crate::naming::{archive_file_name, id_digest, image_extension, parse_archive_digest, sanitize_filename};
use crate::types::Chapter;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Base name of the series preview image; the extension follows the bytes.
const COVER_STEM: &str = "cover";

/// Directory holding a series' archives.
///
/// `name_override` comes from the series' `directory` config key; otherwise
/// the series title is used. Either way the name is sanitized.
pub fn series_dir(library: &Path, title: &str, name_override: Option<&str>) -> PathBuf {
    library.join(sanitize_filename(name_override.unwrap_or(title)))
}

/// Where the series preview is written, e.g. `cover.jpg`.
pub fn cover_path(series_dir: &Path, data: &[u8]) -> PathBuf {
    series_dir.join(format!("{COVER_STEM}.{}", image_extension(data)))
}

/// Validated archives of one series directory, keyed by chapter-id digest.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    dir: PathBuf,
    archives: HashMap<String, ArchiveRecord>,
    has_cover: bool,
}

impl LocalIndex {
    /// Index with no archives, as for a series never synced before.
    pub fn empty(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    /// Scan `dir`. A missing directory yields an empty index.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let mut index = Self::empty(dir);
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(e),
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        // Deterministic winner when two files claim the same digest.
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&format!("{COVER_STEM}.")) {
                index.has_cover = true;
                continue;
            }
            let Some(digest) = parse_archive_digest(name) else {
                continue;
            };
            let digest = digest.to_string();

            let record = match read_archive(&path) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring invalid archive");
                    continue;
                }
            };
            if id_digest(record.chapter_id()) != digest {
                tracing::warn!(
                    path = %path.display(),
                    chapter = record.chapter_id(),
                    "archive name does not match its chapter id, ignoring"
                );
                continue;
            }
            if let Some(existing) = index.archives.get(&digest) {
                tracing::warn!(
                    path = %path.display(),
                    kept = %existing.path.display(),
                    "duplicate archive for chapter, ignoring"
                );
                continue;
            }
            index.archives.insert(digest, record);
        }

        tracing::debug!(dir = %dir.display(), archives = index.archives.len(), "library indexed");
        Ok(index)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The committed archive for `chapter_id`, if any.
    pub fn get(&self, chapter_id: &str) -> Option<&ArchiveRecord> {
        self.archives
            .get(&id_digest(chapter_id))
            .filter(|record| record.chapter_id() == chapter_id)
    }

    /// Path the archive for `chapter` should live at given its current labels.
    pub fn archive_path(&self, chapter: &Chapter) -> PathBuf {
        self.dir.join(archive_file_name(chapter))
    }

    pub fn has_cover(&self) -> bool {
        self.has_cover
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::publish;
    use crate::metadata::{MetadataDocument, split};
    use crate::test_helpers::{chapter, jpeg_pages};
    use crate::types::Series;
    use std::fs;
    use tempfile::TempDir;

    fn publish_chapter(dir: &Path, ch: &Chapter, pages: usize) -> PathBuf {
        let series = Series {
            title: "Dungeon Diary".into(),
            ..Default::default()
        };
        let pages = jpeg_pages(pages);
        let document = MetadataDocument::for_chapter(&series, ch, pages.len());
        let fragments = split(&document, &[pages.len()]).unwrap();
        let path = dir.join(archive_file_name(ch));
        publish(&path, &pages, &fragments[0]).unwrap();
        path
    }

    #[test]
    fn series_dir_uses_sanitized_title_or_override() {
        let lib = Path::new("/lib");
        assert_eq!(
            series_dir(lib, "What: If?", None),
            PathBuf::from("/lib/What_ If_")
        );
        assert_eq!(
            series_dir(lib, "Ignored", Some("Short")),
            PathBuf::from("/lib/Short")
        );
    }

    #[test]
    fn cover_path_follows_image_type() {
        let dir = Path::new("/lib/S");
        assert_eq!(cover_path(dir, b"\x89PNG...."), PathBuf::from("/lib/S/cover.png"));
        assert_eq!(cover_path(dir, &[0xFF, 0xD8, 0xFF]), PathBuf::from("/lib/S/cover.jpg"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = LocalIndex::load(&tmp.path().join("nope")).unwrap();
        assert!(index.is_empty());
        assert!(!index.has_cover());
    }

    #[test]
    fn indexes_archives_by_chapter_id() {
        let tmp = TempDir::new().unwrap();
        let c1 = chapter("c1", Some(1.0));
        let c2 = chapter("c2", Some(2.0));
        publish_chapter(tmp.path(), &c1, 3);
        publish_chapter(tmp.path(), &c2, 2);

        let index = LocalIndex::load(tmp.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("c1").unwrap().page_count(), 3);
        assert_eq!(index.get("c2").unwrap().page_count(), 2);
        assert!(index.get("c3").is_none());
    }

    #[test]
    fn lookup_survives_label_changes() {
        let tmp = TempDir::new().unwrap();
        let original = chapter("c1", Some(1.0));
        let path = publish_chapter(tmp.path(), &original, 1);

        let index = LocalIndex::load(tmp.path()).unwrap();
        let renumbered = Chapter {
            number: Some(7.0),
            ..original
        };
        assert_eq!(index.get(&renumbered.id).unwrap().path, path);
        assert_ne!(index.archive_path(&renumbered), path);
    }

    #[test]
    fn ignores_temp_files_and_invalid_archives() {
        let tmp = TempDir::new().unwrap();
        let good = chapter("good", Some(1.0));
        publish_chapter(tmp.path(), &good, 2);

        let broken = chapter("broken", Some(2.0));
        fs::write(tmp.path().join(archive_file_name(&broken)), b"PK\x03\x04truncated").unwrap();
        fs::write(tmp.path().join(".tmpA1b2.cbz.part"), b"partial").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();

        let index = LocalIndex::load(tmp.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get("good").is_some());
        assert!(index.get("broken").is_none());
    }

    #[test]
    fn ignores_archive_under_foreign_digest() {
        let tmp = TempDir::new().unwrap();
        let real = chapter("real", Some(1.0));
        let path = publish_chapter(tmp.path(), &real, 1);
        // Same archive, renamed to claim another chapter's digest.
        let other = chapter("other", Some(1.0));
        fs::rename(&path, tmp.path().join(archive_file_name(&other))).unwrap();

        let index = LocalIndex::load(tmp.path()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn detects_existing_cover() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cover.png"), b"\x89PNG").unwrap();
        assert!(LocalIndex::load(tmp.path()).unwrap().has_cover());
    }
}
