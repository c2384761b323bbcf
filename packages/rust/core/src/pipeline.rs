//! End-to-end `sync` pipeline: catalog → plan → resolve → fetch → extract → manifest.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use meetingmirror_catalog::Providers;
use meetingmirror_fetcher::{ArchiveFetcher, ArchiveResolver, DownloadJob};
use meetingmirror_shared::{
    CatalogSummary, DocumentRecord, ExtractionError, HttpClient, MeetingRecord, MirrorError,
    NotesLinks, Result, SyncConfig, SyncDecision,
};

use crate::extractor::{self, ArchiveExtractor};
use crate::manifest::{self, JsonManifestWriter, ManifestWriter, SyncedMeeting};
use crate::planner::{self, MeetingPlan};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What one resynced meeting ended up with.
#[derive(Debug, Clone)]
pub struct MeetingReport {
    pub name: String,
    /// Documents listed for the meeting.
    pub documents: usize,
    /// Documents extracted into their own directory.
    pub extracted: usize,
    /// Withdrawn documents and documents without a reachable archive.
    pub unavailable: usize,
    /// `(doc_id, error)` for archives that failed to download.
    pub fetch_failures: Vec<(String, String)>,
    pub extraction_errors: Vec<ExtractionError>,
    /// Notes/logistics files that could not be fetched.
    pub side_file_failures: usize,
}

/// Per-meeting result of a run.
#[derive(Debug, Clone)]
pub enum MeetingOutcome {
    Skipped,
    Synced(MeetingReport),
    Failed { reason: String },
}

/// One meeting's line in the run report.
#[derive(Debug, Clone)]
pub struct MeetingSummary {
    pub number: u32,
    pub name: String,
    pub outcome: MeetingOutcome,
}

/// Result of [`run_sync`], meetings in catalog order.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub meetings: Vec<MeetingSummary>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MeetingOutcome::Skipped))
    }

    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, MeetingOutcome::Synced(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MeetingOutcome::Failed { .. }))
    }

    /// At least one meeting could not be synced at all.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&MeetingOutcome) -> bool) -> usize {
        self.meetings.iter().filter(|m| pred(&m.outcome)).count()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Which per-document step an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Extract,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the meeting catalog is known.
    fn catalog_loaded(&self, meetings: &[MeetingRecord]);
    /// Called when a meeting has been planned.
    fn meeting_started(&self, index: usize, total: usize, plan: &MeetingPlan);
    /// Called with a meeting's document table before anything is fetched.
    fn documents_listed(&self, meeting: &str, documents: &[DocumentRecord]);
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each document finishes a stage.
    fn item_done(&self, stage: Stage, current: usize, total: usize, doc_id: &str, ok: bool);
    /// Called when a meeting is done, whatever the outcome.
    fn meeting_finished(&self, summary: &MeetingSummary);
    /// Called when the pipeline completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn catalog_loaded(&self, _meetings: &[MeetingRecord]) {}
    fn meeting_started(&self, _index: usize, _total: usize, _plan: &MeetingPlan) {}
    fn documents_listed(&self, _meeting: &str, _documents: &[DocumentRecord]) {}
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _stage: Stage, _current: usize, _total: usize, _doc_id: &str, _ok: bool) {}
    fn meeting_finished(&self, _summary: &MeetingSummary) {}
    fn done(&self, _report: &SyncReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Per-run collaborators shared by every meeting.
struct SyncContext<'a> {
    config: &'a SyncConfig,
    providers: &'a Providers,
    resolver: ArchiveResolver,
    fetcher: ArchiveFetcher,
    extractor: ArchiveExtractor,
    writer: &'a dyn ManifestWriter,
    progress: &'a dyn ProgressReporter,
}

/// Run the full `sync` pipeline with the JSON manifest writer.
pub async fn run_sync(
    config: &SyncConfig,
    providers: &Providers,
    progress: &dyn ProgressReporter,
) -> Result<SyncReport> {
    run_sync_with(config, providers, &JsonManifestWriter, progress).await
}

/// Run the full `sync` pipeline.
///
/// 1. Load the meeting catalog (failure aborts the run)
/// 2. Write the catalog summary
/// 3. For each meeting in ascending order: plan, then skip or resync
///
/// Meeting failures are recorded in the report and never stop the run.
#[instrument(skip_all, fields(output = %config.output_root.display()))]
pub async fn run_sync_with(
    config: &SyncConfig,
    providers: &Providers,
    writer: &dyn ManifestWriter,
    progress: &dyn ProgressReporter,
) -> Result<SyncReport> {
    let start = Instant::now();
    config.validate()?;

    // --- Phase 1: Catalog ---
    progress.phase("Loading meeting catalog");
    let mut meetings = providers.catalog.list_meetings().await?;
    meetings.sort_by_key(|m| m.number);
    progress.catalog_loaded(&meetings);
    info!(meetings = meetings.len(), "starting sync");

    std::fs::create_dir_all(&config.output_root)
        .map_err(|e| MirrorError::io(&config.output_root, e))?;

    // --- Phase 2: Catalog summary ---
    if config.write_manifest {
        let summary = CatalogSummary {
            generated_at: Utc::now(),
            meetings: meetings.clone(),
        };
        if let Err(e) = writer.write_summary(&config.output_root, &summary) {
            warn!(error = %e, "could not write catalog summary");
        }
    }

    // --- Phase 3: Meetings ---
    let http = HttpClient::new(&config.http)?;
    let concurrency = config.concurrency as usize;
    let ctx = SyncContext {
        config,
        providers,
        resolver: ArchiveResolver::new(http.clone(), config.site_root()),
        fetcher: ArchiveFetcher::new(http, concurrency),
        extractor: ArchiveExtractor::new(concurrency, &config.staging_dir),
        writer,
        progress,
    };

    let total = meetings.len();
    let mut summaries = Vec::with_capacity(total);
    for (i, meeting) in meetings.iter().enumerate() {
        let summary = sync_meeting(&ctx, meeting, i, total).await;
        progress.meeting_finished(&summary);
        summaries.push(summary);
    }

    let report = SyncReport {
        meetings: summaries,
        elapsed: start.elapsed(),
    };
    progress.done(&report);

    info!(
        synced = report.synced(),
        skipped = report.skipped(),
        failed = report.failed(),
        elapsed_ms = report.elapsed.as_millis(),
        "sync complete"
    );

    Ok(report)
}

async fn sync_meeting(
    ctx: &SyncContext<'_>,
    meeting: &MeetingRecord,
    index: usize,
    total: usize,
) -> MeetingSummary {
    let is_last = index + 1 == total;
    let plan = match planner::plan(&ctx.config.output_root, meeting, is_last, ctx.config.force) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(meeting = meeting.number, error = %e, "meeting cannot be planned");
            return MeetingSummary {
                number: meeting.number,
                name: format!("meeting {}", meeting.number),
                outcome: MeetingOutcome::Failed {
                    reason: e.to_string(),
                },
            };
        }
    };
    ctx.progress.meeting_started(index + 1, total, &plan);

    let outcome = match plan.decision {
        SyncDecision::Skip => {
            info!(meeting = %plan.name, "already synced, skipping");
            MeetingOutcome::Skipped
        }
        SyncDecision::Resync => match resync_meeting(ctx, meeting, &plan).await {
            Ok(report) => MeetingOutcome::Synced(report),
            Err(e) => {
                warn!(meeting = %plan.name, error = %e, "meeting sync failed");
                MeetingOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        },
    };

    MeetingSummary {
        number: meeting.number,
        name: plan.name,
        outcome,
    }
}

/// Build the meeting in a hidden partial directory, then swap it into place.
#[instrument(skip_all, fields(meeting = %plan.name))]
async fn resync_meeting(
    ctx: &SyncContext<'_>,
    meeting: &MeetingRecord,
    plan: &MeetingPlan,
) -> Result<MeetingReport> {
    let root = &ctx.config.output_root;
    remove_leftovers(root, &plan.name);
    info!(replace_existing = plan.replace_existing, "syncing meeting");

    let partial = root.join(format!(".{}.partial-{}", plan.name, Uuid::now_v7()));
    std::fs::create_dir_all(&partial).map_err(|e| MirrorError::io(&partial, e))?;

    let populated = populate(ctx, meeting, &plan.name, &partial).await;
    let swapped = populated.and_then(|report| {
        swap_into_place(&partial, &plan.folder, &plan.name)?;
        Ok(report)
    });

    if swapped.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_dir_all(&partial) {
            warn!(path = %partial.display(), error = %e, "could not discard partial directory");
        }
    }
    swapped
}

/// Fetch everything for one meeting into `folder`.
async fn populate(
    ctx: &SyncContext<'_>,
    meeting: &MeetingRecord,
    name: &str,
    folder: &Path,
) -> Result<MeetingReport> {
    let config = ctx.config;
    let progress = ctx.progress;

    // --- Metadata ---
    progress.phase("Listing documents");
    let documents = ctx.providers.documents.list_documents(meeting).await?;
    progress.documents_listed(name, &documents);
    info!(documents = documents.len(), "document table loaded");

    let links = notes_links(ctx, meeting).await;
    let side = ctx.fetcher.fetch_side_files(&links, folder).await;

    // --- Resolve ---
    progress.phase("Resolving archive links");
    let resolutions = ctx
        .resolver
        .resolve_all(&documents, config.concurrency as usize)
        .await;

    let jobs: Vec<DownloadJob> = documents
        .iter()
        .zip(&resolutions)
        .filter_map(|(doc, resolution)| {
            resolution.url().map(|url| DownloadJob {
                doc_id: doc.doc_id.clone(),
                url: url.to_string(),
            })
        })
        .collect();
    let unavailable = documents.len() - jobs.len();
    debug!(resolved = jobs.len(), unavailable, "archive links resolved");

    // --- Download ---
    progress.phase("Downloading archives");
    let staging = folder.join(&config.staging_dir);
    let fetches = ctx
        .fetcher
        .fetch(&staging, &jobs, |i, n, r| {
            progress.item_done(Stage::Download, i, n, &r.doc_id, r.succeeded)
        })
        .await?;

    // --- Extract ---
    progress.phase("Extracting archives");
    let errors = ctx
        .extractor
        .extract(folder, &fetches, |i, n, doc_id, ok| {
            progress.item_done(Stage::Extract, i, n, doc_id, ok)
        })
        .await;

    if config.remove_archives {
        extractor::remove_archives(&staging, &fetches);
    }

    // --- Manifest ---
    if !errors.is_empty() {
        ctx.writer.write_error_list(folder, &errors)?;
    }
    if config.write_manifest {
        let manifest = manifest::build_manifest(
            SyncedMeeting {
                meeting,
                name,
                documents: &documents,
                resolutions: &resolutions,
                fetches: &fetches,
                errors: &errors,
            },
            side.notes,
            side.logistics,
        );
        ctx.writer.write_manifest(folder, &manifest)?;
    }

    let fetch_failures: Vec<(String, String)> = fetches
        .iter()
        .filter(|f| !f.succeeded)
        .map(|f| (f.doc_id.clone(), f.error.clone().unwrap_or_default()))
        .collect();

    Ok(MeetingReport {
        name: name.to_string(),
        documents: documents.len(),
        extracted: fetches.len() - fetch_failures.len() - errors.len(),
        unavailable,
        fetch_failures,
        extraction_errors: errors,
        side_file_failures: side.failures.len(),
    })
}

/// Notes links for a meeting. Failures degrade to no notes.
async fn notes_links(ctx: &SyncContext<'_>, meeting: &MeetingRecord) -> NotesLinks {
    let Some(url) = meeting.notes_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return NotesLinks::default();
    };

    match ctx.providers.notes.notes_links(url).await {
        Ok(links) => links,
        Err(e) => {
            warn!(%url, error = %e, "notes page unavailable, continuing without notes");
            NotesLinks::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Folder swap
// ---------------------------------------------------------------------------

/// Replace `folder` with `partial`. The previous folder survives any failure.
fn swap_into_place(partial: &Path, folder: &Path, name: &str) -> Result<()> {
    let stale = if folder.exists() {
        let stale = sibling(folder, &format!(".{name}.stale-{}", Uuid::now_v7()));
        std::fs::rename(folder, &stale).map_err(|e| MirrorError::io(folder, e))?;
        Some(stale)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(partial, folder) {
        if let Some(stale) = &stale {
            if let Err(restore) = std::fs::rename(stale, folder) {
                warn!(path = %stale.display(), error = %restore, "could not restore previous folder");
            }
        }
        return Err(MirrorError::io(folder, e));
    }

    if let Some(stale) = stale {
        if let Err(e) = std::fs::remove_dir_all(&stale) {
            warn!(path = %stale.display(), error = %e, "could not remove replaced folder");
        }
    }
    Ok(())
}

/// Remove partial and stale directories a crashed run left for `name`.
fn remove_leftovers(root: &Path, name: &str) {
    let prefixes = [format!(".{name}.partial-"), format!(".{name}.stale-")];
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if prefixes.iter().any(|p| file_name.starts_with(p.as_str())) {
            let path = entry.path();
            debug!(path = %path.display(), "removing leftover directory");
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "could not remove leftover directory");
            }
        }
    }
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent()
        .map(|p| p.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}
