//! Archive and side-file downloads.
//!
//! Downloads run as spawned tasks behind a semaphore. Results are collected
//! in job order, so callers see them in catalog order regardless of which
//! transfer finished first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use meetingmirror_shared::{FetchResult, HttpClient, MirrorError, NotesLinks, Result, SideFile};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One archive to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub doc_id: String,
    pub url: String,
}

/// Notes and logistics files of one meeting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideFiles {
    pub notes: Option<SideFile>,
    pub logistics: Option<SideFile>,
    /// `(remote_url, error)` for side files that could not be fetched.
    pub failures: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// ArchiveFetcher
// ---------------------------------------------------------------------------

/// Downloads archives into a staging directory.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    http: HttpClient,
    concurrency: usize,
}

impl ArchiveFetcher {
    pub fn new(http: HttpClient, concurrency: usize) -> Self {
        Self {
            http,
            concurrency: concurrency.max(1),
        }
    }

    /// Download every job into `staging_dir`.
    ///
    /// A failed download is recorded in its [`FetchResult`] and does not stop
    /// the others. Only failing to create `staging_dir` is an error.
    /// `on_done(i, n, result)` is called once per job, in job order.
    #[instrument(skip_all, fields(dir = %staging_dir.display(), jobs = jobs.len()))]
    pub async fn fetch<F>(
        &self,
        staging_dir: &Path,
        jobs: &[DownloadJob],
        mut on_done: F,
    ) -> Result<Vec<FetchResult>>
    where
        F: FnMut(usize, usize, &FetchResult),
    {
        tokio::fs::create_dir_all(staging_dir)
            .await
            .map_err(|e| MirrorError::io(staging_dir, e))?;

        let names = unique_file_names(jobs);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(jobs.len());

        for (job, name) in jobs.iter().zip(names) {
            let http = self.http.clone();
            let sem = semaphore.clone();
            let job = job.clone();
            let target = staging_dir.join(name);

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                download_archive(&http, &job, target).await
            }));
        }

        let total = handles.len();
        let mut results = Vec::with_capacity(total);
        for (i, (handle, job)) in handles.into_iter().zip(jobs).enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => FetchResult {
                    doc_id: job.doc_id.clone(),
                    local_path: PathBuf::new(),
                    succeeded: false,
                    bytes: 0,
                    sha256: None,
                    error: Some(format!("download task failed: {e}")),
                },
            };
            on_done(i + 1, total, &result);
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.succeeded).count();
        info!(downloaded = total - failed, failed, "archives fetched");
        Ok(results)
    }

    /// Fetch the notes and logistics files into `meeting_folder`.
    ///
    /// A missing link yields no file. A failed download is logged and
    /// reported in [`SideFiles::failures`].
    #[instrument(skip_all, fields(folder = %meeting_folder.display()))]
    pub async fn fetch_side_files(&self, links: &NotesLinks, meeting_folder: &Path) -> SideFiles {
        let mut files = SideFiles::default();

        if let Some(url) = links.notes.as_deref() {
            match self.fetch_side_file(url, "notes", meeting_folder).await {
                Ok(file) => files.notes = Some(file),
                Err(e) => {
                    warn!(%url, error = %e, "notes file not fetched");
                    files.failures.push((url.to_string(), e.to_string()));
                }
            }
        }

        if let Some(url) = links.logistics.as_deref() {
            match self.fetch_side_file(url, "logistics", meeting_folder).await {
                Ok(file) => files.logistics = Some(file),
                Err(e) => {
                    warn!(%url, error = %e, "logistics file not fetched");
                    files.failures.push((url.to_string(), e.to_string()));
                }
            }
        }

        files
    }

    async fn fetch_side_file(&self, url: &str, fallback: &str, folder: &Path) -> Result<SideFile> {
        let bytes = self
            .http
            .get_bytes(url)
            .await
            .map_err(|e| MirrorError::ArchiveFetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let name = remote_file_name(url).unwrap_or_else(|| fallback.to_string());
        let path = folder.join(&name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| MirrorError::io(&path, e))?;

        debug!(%url, file = %name, bytes = bytes.len(), "side file written");
        Ok(SideFile {
            remote_url: url.to_string(),
            local_path: name,
        })
    }
}

async fn download_archive(http: &HttpClient, job: &DownloadJob, target: PathBuf) -> FetchResult {
    let mut result = FetchResult {
        doc_id: job.doc_id.clone(),
        local_path: target,
        succeeded: false,
        bytes: 0,
        sha256: None,
        error: None,
    };

    let bytes = match http.get_bytes(&job.url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(doc_id = %job.doc_id, url = %job.url, error = %e, "archive download failed");
            let err = MirrorError::ArchiveFetch {
                url: job.url.clone(),
                message: e.to_string(),
            };
            result.error = Some(err.to_string());
            return result;
        }
    };

    if let Err(e) = tokio::fs::write(&result.local_path, &bytes).await {
        warn!(doc_id = %job.doc_id, path = %result.local_path.display(), error = %e, "archive write failed");
        result.error = Some(format!("{}: {e}", result.local_path.display()));
        return result;
    }

    result.succeeded = true;
    result.bytes = bytes.len() as u64;
    result.sha256 = Some(compute_hash(&bytes));
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 of `bytes` as lowercase hex.
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Last path segment of a URL, if it is a usable file name.
pub fn remote_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?.to_string();
    if name.is_empty() || name == "." || name == ".." || name.starts_with('#') {
        None
    } else {
        Some(name)
    }
}

/// Local file names for a batch of jobs. A name already taken by an earlier
/// job is prefixed with the document number.
fn unique_file_names(jobs: &[DownloadJob]) -> Vec<String> {
    let mut seen = HashSet::new();
    jobs.iter()
        .map(|job| {
            let base =
                remote_file_name(&job.url).unwrap_or_else(|| format!("{}.zip", job.doc_id));
            let name = if seen.contains(&base) {
                format!("{}_{base}", job.doc_id)
            } else {
                base
            };
            seen.insert(name.clone());
            name
        })
        .collect()
}
