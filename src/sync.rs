//! Synchronization of one series into the local library.
//!
//! ## Run phases
//!
//! ```text
//! Discover ──▶ Diff ──▶ Schedule ──▶ (Fetch ──▶ Split ──▶ Write)* ──▶ Settle
//!  provider    local      executor     retry     metadata   archive
//!              index      (1 unit per task)
//! ```
//!
//! - **Discover** asks the provider for series metadata and the chapter
//!   listing, applies configured number overrides, sorts by number and
//!   rejects listings that repeat a chapter id. Any failure here aborts the
//!   series before anything is written.
//! - **Diff** compares the listing with the [`LocalIndex`]. The chapter id
//!   decides whether an archive exists; see [`diff`] for what happens when
//!   it does.
//! - **Schedule** hands one unit per [`Task`] to the [`Executor`].
//! - **Fetch/Split/Write** runs inside a worker: fetch pages with retry,
//!   project the chapter's metadata document onto its archive, publish.
//!   Relabel tasks skip the fetch and rewrite the archive from disk.
//! - **Settle** returns a [`SyncReport`] when every task committed, or the
//!   first unit failure, naming its chapter. Archives committed by other
//!   units stay on disk and are skipped by the next run's diff.
//!
//! A [`Plan`] is the output of Discover and Diff. `chapter-sync plan` prints
//! it and stops; `chapter-sync sync` goes on to [`Synchronizer::execute`].

use crate::archive::{self, ArchiveError, ArchiveRecord};
use crate::executor::Executor;
use crate::library::{LocalIndex, cover_path, series_dir};
use crate::metadata::{MetadataDocument, MetadataError, fragment_for};
use crate::naming::chapter_label;
use crate::provider::{Provider, ProviderError};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{Chapter, Series, sort_chapters, with_number};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("discovering series {series}: {source}")]
    Discovery {
        series: String,
        source: ProviderError,
    },
    #[error("series {series} lists chapter {id} more than once")]
    DuplicateChapter { series: String, id: String },
    #[error("fetching chapter {chapter}: {source}")]
    Fetch {
        chapter: String,
        source: ProviderError,
    },
    #[error("metadata for chapter {chapter}: {source}")]
    MetadataConsistency {
        chapter: String,
        source: MetadataError,
    },
    #[error("writing chapter {chapter}: {source}")]
    Write {
        chapter: String,
        source: ArchiveError,
    },
    #[error("library I/O error: {0}")]
    Library(#[from] std::io::Error),
    #[error("starting workers: {0}")]
    Executor(#[from] rayon::ThreadPoolBuildError),
}

impl SyncError {
    /// The chapter a unit-scoped failure belongs to.
    pub fn chapter(&self) -> Option<&str> {
        match self {
            SyncError::Fetch { chapter, .. }
            | SyncError::MetadataConsistency { chapter, .. }
            | SyncError::Write { chapter, .. } => Some(chapter),
            SyncError::DuplicateChapter { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// One configured series to synchronize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTarget {
    /// Provider-specific location (URL or path).
    pub location: String,
    /// Library subdirectory name; defaults to the series title.
    pub directory: Option<String>,
    /// Chapter id → corrected number.
    pub overrides: BTreeMap<String, f64>,
}

impl SeriesTarget {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }
}

/// Progress notifications, sent as they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Planned {
        series: String,
        publish: usize,
        relabel: usize,
        up_to_date: usize,
    },
    Published {
        chapter: String,
        label: String,
        pages: usize,
    },
    Relabelled {
        chapter: String,
        from: String,
        to: String,
    },
    Failed {
        chapter: String,
        error: String,
    },
}

/// Why a chapter gets fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReason {
    /// No valid archive for this chapter id.
    Missing,
    /// The provider now declares a different page count than was archived.
    PageCountChanged { archived: usize, declared: usize },
}

/// One schedulable unit of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Fetch pages and publish. `stale` is an archive to delete afterwards
    /// if the new one lands under a different name.
    Publish {
        chapter: Chapter,
        reason: PublishReason,
        stale: Option<PathBuf>,
    },
    /// Rewrite an existing archive's metadata and name; no network.
    Relabel {
        chapter: Chapter,
        record: ArchiveRecord,
    },
}

impl Task {
    pub fn chapter(&self) -> &Chapter {
        match self {
            Task::Publish { chapter, .. } | Task::Relabel { chapter, .. } => chapter,
        }
    }
}

/// What a run will do for one series.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Discovered series with its sorted, overridden chapter list.
    pub series: Series,
    pub index: LocalIndex,
    /// Tasks in chapter order.
    pub tasks: Vec<Task>,
    pub up_to_date: usize,
}

impl Plan {
    pub fn dir(&self) -> &Path {
        self.index.dir()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn publish_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, Task::Publish { .. }))
            .count()
    }

    pub fn relabel_count(&self) -> usize {
        self.tasks.len() - self.publish_count()
    }

    /// Ids of every chapter the plan touches, in chapter order.
    pub fn scheduled(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.chapter().id.as_str()).collect()
    }
}

/// Outcome of a fully successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub series: String,
    /// Chapter ids, in chapter order.
    pub published: Vec<String>,
    pub relabelled: Vec<String>,
    pub up_to_date: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.published.len() + self.relabelled.len() + self.up_to_date
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.published.is_empty() && self.relabelled.is_empty() {
            return write!(f, "{} up to date", self.up_to_date);
        }
        if self.relabelled.is_empty() {
            write!(
                f,
                "{} published, {} up to date ({} total)",
                self.published.len(),
                self.up_to_date,
                self.total()
            )
        } else {
            write!(
                f,
                "{} published, {} relabelled, {} up to date ({} total)",
                self.published.len(),
                self.relabelled.len(),
                self.up_to_date,
                self.total()
            )
        }
    }
}

/// Replace the numbers of overridden chapters. Identity is untouched.
pub fn apply_overrides(chapters: Vec<Chapter>, overrides: &BTreeMap<String, f64>) -> Vec<Chapter> {
    chapters
        .into_iter()
        .map(|chapter| match overrides.get(&chapter.id) {
            Some(&number) => with_number(chapter, number),
            None => chapter,
        })
        .collect()
}

/// Compare a sorted chapter listing with what is on disk.
///
/// | Archive for the id | Condition | Task |
/// |---|---|---|
/// | none or invalid | | `Publish` (missing) |
/// | valid | declared page count differs from archived | `Publish` (page count changed) |
/// | valid | number, volume, title or file name differ | `Relabel` |
/// | valid | otherwise | up to date |
///
/// Returns the tasks in listing order and the number of up-to-date chapters.
pub fn diff(chapters: &[Chapter], index: &LocalIndex) -> (Vec<Task>, usize) {
    let mut tasks = Vec::new();
    let mut up_to_date = 0;

    for chapter in chapters {
        let Some(record) = index.get(&chapter.id) else {
            tasks.push(Task::Publish {
                chapter: chapter.clone(),
                reason: PublishReason::Missing,
                stale: None,
            });
            continue;
        };

        if let Some(declared) = chapter.page_count
            && declared != record.page_count()
        {
            tasks.push(Task::Publish {
                chapter: chapter.clone(),
                reason: PublishReason::PageCountChanged {
                    archived: record.page_count(),
                    declared,
                },
                stale: Some(record.path.clone()),
            });
            continue;
        }

        let described = &record.fragment.description;
        let relabel = described.number != chapter.number
            || described.volume != chapter.volume
            || described.title != chapter.title.trim()
            || record.path != index.archive_path(chapter);
        if relabel {
            tasks.push(Task::Relabel {
                chapter: chapter.clone(),
                record: record.clone(),
            });
        } else {
            up_to_date += 1;
        }
    }

    (tasks, up_to_date)
}

fn check_unique(series: &Series) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for chapter in &series.chapters {
        if !seen.insert(chapter.id.as_str()) {
            return Err(SyncError::DuplicateChapter {
                series: series.location.clone(),
                id: chapter.id.clone(),
            });
        }
    }
    Ok(())
}

/// Drives discovery, diffing and publishing for series using one provider.
pub struct Synchronizer<'a, P: Provider + ?Sized> {
    provider: &'a P,
    library: PathBuf,
    executor: Executor,
    retry: RetryPolicy,
    events: Option<Sender<SyncEvent>>,
}

impl<'a, P: Provider + ?Sized> Synchronizer<'a, P> {
    /// `workers` bounds how many chapters are fetched at once.
    pub fn new(provider: &'a P, library: &Path, workers: usize) -> Result<Self, SyncError> {
        Ok(Self {
            provider,
            library: library.to_path_buf(),
            executor: Executor::new(workers)?,
            retry: RetryPolicy::default(),
            events: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, events: Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            // The receiver going away only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Describe the series and list its chapters, sorted and overridden.
    pub fn discover(&self, target: &SeriesTarget) -> Result<Series, SyncError> {
        let discovery = |source| SyncError::Discovery {
            series: target.location.clone(),
            source,
        };
        let mut series = self
            .provider
            .describe_series(&target.location)
            .map_err(discovery)?;
        let listed = self.provider.list_chapters(&series).map_err(discovery)?;

        for id in target.overrides.keys() {
            if !listed.iter().any(|c| &c.id == id) {
                tracing::warn!(series = %target.location, chapter = %id, "override for unlisted chapter");
            }
        }
        let mut chapters = apply_overrides(listed, &target.overrides);
        sort_chapters(&mut chapters);
        series.chapters = chapters;

        check_unique(&series)?;
        tracing::debug!(series = %target.location, chapters = series.chapters.len(), "discovered");
        Ok(series)
    }

    /// Discover and diff without touching the library.
    pub fn plan(&self, target: &SeriesTarget) -> Result<Plan, SyncError> {
        let series = self.discover(target)?;
        let dir = series_dir(&self.library, &series.title, target.directory.as_deref());
        let index = LocalIndex::load(&dir)?;
        let (tasks, up_to_date) = diff(&series.chapters, &index);
        Ok(Plan {
            series,
            index,
            tasks,
            up_to_date,
        })
    }

    /// Plan and execute in one go.
    pub fn sync(&self, target: &SeriesTarget) -> Result<SyncReport, SyncError> {
        let plan = self.plan(target)?;
        self.emit(SyncEvent::Planned {
            series: plan.series.title.clone(),
            publish: plan.publish_count(),
            relabel: plan.relabel_count(),
            up_to_date: plan.up_to_date,
        });
        self.execute(&plan)
    }

    /// Run every task of `plan` on the executor.
    pub fn execute(&self, plan: &Plan) -> Result<SyncReport, SyncError> {
        let location = &plan.series.location;
        std::fs::create_dir_all(plan.dir())?;
        self.write_cover(plan);

        tracing::info!(
            series = %location,
            publish = plan.publish_count(),
            relabel = plan.relabel_count(),
            workers = self.executor.workers(),
            "scheduling"
        );
        self.executor.run(plan.tasks.len(), |unit| {
            let task = &plan.tasks[unit];
            self.run_task(plan, task).inspect_err(|e| {
                tracing::error!(series = %location, chapter = %task.chapter().id, error = %e, "unit failed");
                self.emit(SyncEvent::Failed {
                    chapter: task.chapter().id.clone(),
                    error: e.to_string(),
                });
            })
        })?;

        let mut report = SyncReport {
            series: plan.series.title.clone(),
            up_to_date: plan.up_to_date,
            ..Default::default()
        };
        for task in &plan.tasks {
            match task {
                Task::Publish { chapter, .. } => report.published.push(chapter.id.clone()),
                Task::Relabel { chapter, .. } => report.relabelled.push(chapter.id.clone()),
            }
        }
        tracing::info!(series = %location, summary = %report, "series synchronized");
        Ok(report)
    }

    /// Write the series preview if the library has none yet. A cover is
    /// cosmetic, so failures are logged and the run goes on.
    fn write_cover(&self, plan: &Plan) {
        let Some(preview) = &plan.series.preview else {
            return;
        };
        if plan.index.has_cover() || preview.is_empty() {
            return;
        }
        let path = cover_path(plan.dir(), preview);
        if let Err(e) = archive::write_atomic(&path, preview) {
            tracing::warn!(path = %path.display(), error = %e, "could not write cover");
        }
    }

    fn run_task(&self, plan: &Plan, task: &Task) -> Result<(), SyncError> {
        match task {
            Task::Publish { chapter, stale, .. } => self.publish(plan, chapter, stale.as_deref()),
            Task::Relabel { chapter, record } => self.relabel(plan, chapter, record),
        }
    }

    fn publish(&self, plan: &Plan, chapter: &Chapter, stale: Option<&Path>) -> Result<(), SyncError> {
        let id = &chapter.id;
        let pages = with_retry(&self.retry, || self.provider.populate_pages(chapter)).map_err(
            |source| SyncError::Fetch {
                chapter: id.clone(),
                source,
            },
        )?;

        let document = MetadataDocument::for_chapter(&plan.series, chapter, pages.len());
        let fragment =
            fragment_for(&document, pages.len()).map_err(|source| SyncError::MetadataConsistency {
                chapter: id.clone(),
                source,
            })?;

        let write_error = |source| SyncError::Write {
            chapter: id.clone(),
            source,
        };
        let destination = plan.index.archive_path(chapter);
        let record = archive::publish(&destination, &pages, &fragment).map_err(write_error)?;

        if let Some(stale) = stale
            && stale != destination
        {
            match std::fs::remove_file(stale) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(ArchiveError::Io(e))),
            }
        }

        tracing::debug!(chapter = %id, pages = record.page_count(), "published");
        self.emit(SyncEvent::Published {
            chapter: id.clone(),
            label: chapter_label(chapter),
            pages: record.page_count(),
        });
        Ok(())
    }

    fn relabel(&self, plan: &Plan, chapter: &Chapter, record: &ArchiveRecord) -> Result<(), SyncError> {
        let destination = plan.index.archive_path(chapter);
        let fragment = record.fragment.relabelled(chapter);
        let committed =
            archive::rewrite(record, &destination, &fragment).map_err(|source| SyncError::Write {
                chapter: chapter.id.clone(),
                source,
            })?;

        let name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        self.emit(SyncEvent::Relabelled {
            chapter: chapter.id.clone(),
            from: name(&record.path),
            to: name(&committed.path),
        });
        Ok(())
    }
}
