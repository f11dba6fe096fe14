//! End-to-end sync scenarios against on-disk series.
//!
//! Every test lays out a series for the directory provider in a temp dir,
//! syncs it into a second temp dir, and inspects the library. `Upstream`
//! wraps the directory provider to simulate what remote sources do to us:
//! lie about page counts and fail on individual chapters.
//!
//! Run with: cargo test --test sync_scenarios

use chapter_sync::archive::read_archive;
use chapter_sync::naming::archive_file_name;
use chapter_sync::provider::{DirectorySource, Provider, ProviderError};
use chapter_sync::retry::RetryPolicy;
use chapter_sync::sync::{PublishReason, SeriesTarget, SyncError, Synchronizer, Task};
use chapter_sync::types::{Chapter, Page, Series};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Barrier, Mutex};
use tempfile::TempDir;

const TITLE: &str = "Dungeon Diary";

// =============================================================================
// Fixtures
// =============================================================================

/// Directory provider with injectable faults. Records every page fetch.
///
/// Chapters named in `rendezvous` block inside `populate_pages` until all of
/// them are being fetched at once.
#[derive(Default)]
struct Upstream {
    declared: HashMap<String, usize>,
    broken: HashSet<String>,
    rendezvous: Option<(HashSet<String>, Barrier)>,
    fetched: Mutex<Vec<String>>,
}

impl Upstream {
    fn declare(mut self, id: &str, pages: usize) -> Self {
        self.declared.insert(id.to_string(), pages);
        self
    }

    fn break_chapter(mut self, id: &str) -> Self {
        self.broken.insert(id.to_string());
        self
    }

    fn rendezvous(mut self, ids: &[&str]) -> Self {
        let ids: HashSet<String> = ids.iter().map(|id| id.to_string()).collect();
        let barrier = Barrier::new(ids.len());
        self.rendezvous = Some((ids, barrier));
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Provider for Upstream {
    fn describe_series(&self, location: &str) -> Result<Series, ProviderError> {
        DirectorySource.describe_series(location)
    }

    fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>, ProviderError> {
        let mut chapters = DirectorySource.list_chapters(series)?;
        for chapter in &mut chapters {
            if let Some(pages) = self.declared.get(&chapter.id) {
                chapter.page_count = Some(*pages);
            }
        }
        Ok(chapters)
    }

    fn populate_pages(&self, chapter: &Chapter) -> Result<Vec<Page>, ProviderError> {
        self.fetched.lock().unwrap().push(chapter.id.clone());
        if let Some((ids, barrier)) = &self.rendezvous
            && ids.contains(&chapter.id)
        {
            barrier.wait();
        }
        if self.broken.contains(&chapter.id) {
            return Err(ProviderError::Permanent(format!("HTTP 404 for {}", chapter.id)));
        }
        DirectorySource.populate_pages(chapter)
    }
}

struct Fixture {
    source: TempDir,
    library: TempDir,
}

impl Fixture {
    /// A series with chapter directories `001` and `002` holding the given
    /// number of pages.
    fn new(first: usize, second: usize) -> Self {
        let source = TempDir::new().unwrap();
        fs::write(
            source.path().join("series.toml"),
            format!("title = \"{TITLE}\"\nauthors = [\"A. Writer\"]\n"),
        )
        .unwrap();
        let fixture = Self {
            source,
            library: TempDir::new().unwrap(),
        };
        fixture.write_pages("001", first);
        fixture.write_pages("002", second);
        fixture
    }

    fn write_pages(&self, chapter: &str, count: usize) {
        let dir = self.source.path().join(chapter);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let data = [0xFF, 0xD8, 0xFF, 0xE0, i as u8];
            fs::write(dir.join(format!("{:02}.jpg", i + 1)), data).unwrap();
        }
    }

    fn target(&self) -> SeriesTarget {
        SeriesTarget::new(self.source.path().to_string_lossy())
    }

    fn series_dir(&self) -> PathBuf {
        self.library.path().join(TITLE)
    }

    fn synchronizer<'a>(&self, provider: &'a Upstream, workers: usize) -> Synchronizer<'a, Upstream> {
        Synchronizer::new(provider, self.library.path(), workers)
            .unwrap()
            .with_retry(RetryPolicy::none())
    }

    /// Committed archive names, sorted.
    fn archives(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.series_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".cbz") && !n.starts_with('.'))
            .collect();
        names.sort();
        names
    }
}

fn listed(id: &str, number: f64) -> Chapter {
    Chapter {
        id: id.to_string(),
        number: Some(number),
        ..Default::default()
    }
}

fn page_count(path: &Path) -> usize {
    read_archive(path).unwrap().page_count()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn fresh_library_then_nothing_to_do() {
    let fixture = Fixture::new(3, 2);
    let upstream = Upstream::default();
    let synchronizer = fixture.synchronizer(&upstream, 4);

    let report = synchronizer.sync(&fixture.target()).unwrap();
    assert_eq!(report.published, vec!["001", "002"]);
    assert_eq!(
        fixture.archives(),
        vec![
            archive_file_name(&listed("001", 1.0)),
            archive_file_name(&listed("002", 2.0)),
        ]
    );
    assert_eq!(page_count(&fixture.series_dir().join(&fixture.archives()[0])), 3);

    let plan = synchronizer.plan(&fixture.target()).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.up_to_date, 2);

    let again = synchronizer.sync(&fixture.target()).unwrap();
    assert_eq!(again.to_string(), "2 up to date");
    assert_eq!(upstream.fetched().len(), 2);
}

#[test]
fn declared_page_count_mismatch_writes_nothing() {
    let fixture = Fixture::new(9, 2);
    let upstream = Upstream::default().declare("001", 10);

    let err = fixture
        .synchronizer(&upstream, 1)
        .sync(&fixture.target())
        .unwrap_err();

    assert!(matches!(err, SyncError::MetadataConsistency { .. }), "got {err:?}");
    assert_eq!(err.chapter(), Some("001"));
    assert!(fixture.archives().is_empty());
}

#[test]
fn permanent_fault_keeps_committed_chapters() {
    let fixture = Fixture::new(2, 2);
    let failing = Upstream::default().break_chapter("002");

    let err = fixture
        .synchronizer(&failing, 1)
        .sync(&fixture.target())
        .unwrap_err();
    assert!(matches!(err, SyncError::Fetch { .. }), "got {err:?}");
    assert_eq!(err.chapter(), Some("002"));
    assert!(err.to_string().contains("HTTP 404"));
    assert_eq!(fixture.archives(), vec![archive_file_name(&listed("001", 1.0))]);

    // The next run only schedules what is still missing.
    let healthy = Upstream::default();
    let synchronizer = fixture.synchronizer(&healthy, 1);
    let plan = synchronizer.plan(&fixture.target()).unwrap();
    assert_eq!(plan.scheduled(), vec!["002"]);

    synchronizer.sync(&fixture.target()).unwrap();
    assert_eq!(healthy.fetched(), vec!["002"]);
    assert_eq!(fixture.archives().len(), 2);
}

#[test]
fn fault_while_another_chapter_is_in_flight() {
    let fixture = Fixture::new(3, 2);
    // 001 is still fetching when 002 fails.
    let failing = Upstream::default()
        .break_chapter("002")
        .rendezvous(&["001", "002"]);

    let err = fixture
        .synchronizer(&failing, 2)
        .sync(&fixture.target())
        .unwrap_err();
    assert!(matches!(err, SyncError::Fetch { .. }), "got {err:?}");
    assert_eq!(err.chapter(), Some("002"));

    let first = archive_file_name(&listed("001", 1.0));
    assert_eq!(fixture.archives(), vec![first.clone()]);
    assert_eq!(page_count(&fixture.series_dir().join(&first)), 3);

    let healthy = Upstream::default();
    let plan = fixture
        .synchronizer(&healthy, 2)
        .plan(&fixture.target())
        .unwrap();
    assert_eq!(plan.scheduled(), vec!["002"]);
    assert_eq!(plan.up_to_date, 1);
}

#[test]
fn renumbered_chapter_is_relabelled_without_fetching() {
    let fixture = Fixture::new(2, 1);
    let upstream = Upstream::default();
    fixture
        .synchronizer(&upstream, 2)
        .sync(&fixture.target())
        .unwrap();

    let mut target = fixture.target();
    target.overrides.insert("002".to_string(), 1.5);
    let synchronizer = fixture.synchronizer(&upstream, 2);

    let plan = synchronizer.plan(&target).unwrap();
    assert_eq!(plan.relabel_count(), 1);
    assert_eq!(plan.publish_count(), 0);

    let report = synchronizer.sync(&target).unwrap();
    assert_eq!(report.relabelled, vec!["002"]);
    assert_eq!(upstream.fetched().len(), 2, "relabel must not fetch");

    let renamed = archive_file_name(&listed("002", 1.5));
    assert!(renamed.starts_with("Ch.001.5 ["));
    assert!(fixture.archives().contains(&renamed));
    assert_eq!(fixture.archives().len(), 2);

    let record = read_archive(&fixture.series_dir().join(&renamed)).unwrap();
    assert_eq!(record.fragment.description.number, Some(1.5));
    assert_eq!(record.page_count(), 1);
}

#[test]
fn grown_chapter_is_fetched_again() {
    let fixture = Fixture::new(2, 2);
    let upstream = Upstream::default();
    let synchronizer = fixture.synchronizer(&upstream, 2);
    synchronizer.sync(&fixture.target()).unwrap();

    fixture.write_pages("002", 3);
    let plan = synchronizer.plan(&fixture.target()).unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert!(matches!(
        &plan.tasks[0],
        Task::Publish {
            reason: PublishReason::PageCountChanged {
                archived: 2,
                declared: 3
            },
            ..
        }
    ));

    synchronizer.sync(&fixture.target()).unwrap();
    let name = archive_file_name(&listed("002", 2.0));
    assert_eq!(page_count(&fixture.series_dir().join(name)), 3);
    assert_eq!(fixture.archives().len(), 2);
}

#[test]
fn leftovers_from_interrupted_runs_are_ignored() {
    let fixture = Fixture::new(1, 1);
    let series_dir = fixture.series_dir();
    fs::create_dir_all(&series_dir).unwrap();

    // A temp file from a crashed write and a truncated archive under the
    // right name.
    let first = archive_file_name(&listed("001", 1.0));
    fs::write(series_dir.join(format!(".{first}.part")), b"PK\x03\x04").unwrap();
    fs::write(series_dir.join(&first), b"PK\x03\x04 truncated").unwrap();

    let upstream = Upstream::default();
    let synchronizer = fixture.synchronizer(&upstream, 2);
    let plan = synchronizer.plan(&fixture.target()).unwrap();
    assert_eq!(plan.publish_count(), 2);

    synchronizer.sync(&fixture.target()).unwrap();
    assert_eq!(page_count(&series_dir.join(&first)), 1);
    assert!(synchronizer.plan(&fixture.target()).unwrap().is_empty());
}
