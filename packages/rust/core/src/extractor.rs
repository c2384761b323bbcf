//! Archive extraction.
//!
//! Each downloaded archive unpacks into `<meeting folder>/<doc_id>/`. Zip
//! decoding is blocking work, so it runs on `spawn_blocking` threads behind
//! a semaphore.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use meetingmirror_shared::{ExtractionError, FetchResult, MirrorError, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::naming::document_dir_name;

/// Unpacks fetched archives into per-document directories.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    concurrency: usize,
    /// Meeting folder entries a document directory must never take over.
    reserved: Vec<String>,
}

impl ArchiveExtractor {
    pub fn new(concurrency: usize, staging_dir: &str) -> Self {
        Self {
            concurrency: concurrency.max(1),
            reserved: vec![staging_dir.to_string()],
        }
    }

    /// Extract every successfully fetched archive.
    ///
    /// Failed downloads are ignored. Unreadable archives are returned as
    /// [`ExtractionError`]s in fetch order and leave no directory behind.
    /// `on_done(i, n, doc_id, ok)` is called once per archive, in order.
    #[instrument(skip_all, fields(folder = %meeting_folder.display()))]
    pub async fn extract<F>(
        &self,
        meeting_folder: &Path,
        fetches: &[FetchResult],
        mut on_done: F,
    ) -> Vec<ExtractionError>
    where
        F: FnMut(usize, usize, &str, bool),
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let reserved: Vec<&str> = self.reserved.iter().map(String::as_str).collect();
        let fetched: Vec<&FetchResult> = fetches.iter().filter(|f| f.succeeded).collect();
        let mut handles = Vec::with_capacity(fetched.len());

        for fetch in &fetched {
            let sem = semaphore.clone();
            let archive = fetch.local_path.clone();
            let dest = meeting_folder.join(document_dir_name(&fetch.doc_id, &reserved));

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                match tokio::task::spawn_blocking(move || extract_archive(&archive, &dest)).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(format!("extraction task failed: {e}")),
                }
            }));
        }

        let total = handles.len();
        let mut errors = Vec::new();
        for (i, (handle, fetch)) in handles.into_iter().zip(fetched).enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("extraction task failed: {e}")),
            };

            match outcome {
                Ok(entries) => {
                    debug!(doc_id = %fetch.doc_id, entries, "archive extracted");
                    on_done(i + 1, total, &fetch.doc_id, true);
                }
                Err(reason) => {
                    warn!(doc_id = %fetch.doc_id, archive = %fetch.local_path.display(), %reason, "archive not extracted");
                    on_done(i + 1, total, &fetch.doc_id, false);
                    errors.push(ExtractionError {
                        doc_id: fetch.doc_id.clone(),
                        archive_path: relative_to(&fetch.local_path, meeting_folder),
                        reason,
                    });
                }
            }
        }

        info!(extracted = total - errors.len(), failed = errors.len(), "extraction finished");
        errors
    }
}

/// Delete staged archives, then the staging directory if nothing else is
/// left in it. Failures are logged and otherwise ignored.
pub fn remove_archives(staging_dir: &Path, fetches: &[FetchResult]) {
    for fetch in fetches.iter().filter(|f| f.succeeded) {
        if let Err(e) = std::fs::remove_file(&fetch.local_path) {
            warn!(path = %fetch.local_path.display(), error = %e, "could not delete archive");
        }
    }

    let empty = match std::fs::read_dir(staging_dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => {
            warn!(path = %staging_dir.display(), error = %e, "could not read staging directory");
            false
        }
    };
    if empty {
        if let Err(e) = std::fs::remove_dir(staging_dir) {
            warn!(path = %staging_dir.display(), error = %e, "could not delete staging directory");
        }
    }
}

/// Unpack one zip into `dest`. On failure `dest` is removed again, but only
/// if this call created it.
fn extract_archive(archive: &Path, dest: &Path) -> std::result::Result<usize, String> {
    let created = !dest.exists();
    let result = unpack(archive, dest);
    if result.is_err() && created && dest.is_dir() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            warn!(path = %dest.display(), error = %e, "could not remove partial extraction");
        }
    }
    result.map_err(|e| e.to_string())
}

fn unpack(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| MirrorError::io(archive, e))?;
    let corrupt = |e: zip::result::ZipError| MirrorError::CorruptArchive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    };

    let mut zip = zip::ZipArchive::new(file).map_err(corrupt)?;
    std::fs::create_dir_all(dest).map_err(|e| MirrorError::io(dest, e))?;
    zip.extract(dest).map_err(corrupt)?;
    Ok(zip.len())
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uuid::Uuid;
    use zip::write::SimpleFileOptions;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mm-extract-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn fetched(doc_id: &str, path: PathBuf) -> FetchResult {
        FetchResult {
            doc_id: doc_id.into(),
            local_path: path,
            succeeded: true,
            bytes: 0,
            sha256: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn corrupt_archive_does_not_stop_others() {
        let folder = temp_dir("corrupt");
        let staging = folder.join("zipfiles");
        std::fs::create_dir_all(&staging).unwrap();

        write_zip(&staging.join("D1.zip"), &[("D1.docx", b"one".as_slice())]);
        std::fs::write(staging.join("D2.zip"), b"this is not a zip file").unwrap();
        write_zip(&staging.join("D3.zip"), &[("D3.docx", b"three".as_slice()), ("sub/D3.xlsx", b"x".as_slice())]);

        let fetches = vec![
            fetched("D1", staging.join("D1.zip")),
            fetched("D2", staging.join("D2.zip")),
            fetched("D3", staging.join("D3.zip")),
        ];

        let mut progress = Vec::new();
        let errors = ArchiveExtractor::new(2, "zipfiles")
            .extract(&folder, &fetches, |i, n, id, ok| progress.push((i, n, id.to_string(), ok)))
            .await;

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].doc_id, "D2");
        assert_eq!(errors[0].archive_path, PathBuf::from("zipfiles/D2.zip"));

        assert_eq!(std::fs::read(folder.join("D1/D1.docx")).unwrap(), b"one");
        assert!(!folder.join("D2").exists());
        assert_eq!(std::fs::read(folder.join("D3/sub/D3.xlsx")).unwrap(), b"x");

        assert_eq!(
            progress,
            vec![
                (1, 3, "D1".to_string(), true),
                (2, 3, "D2".to_string(), false),
                (3, 3, "D3".to_string(), true),
            ]
        );

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn failed_downloads_are_not_extracted() {
        let folder = temp_dir("skipped");
        let mut failed = fetched("D9", folder.join("zipfiles/D9.zip"));
        failed.succeeded = false;

        let errors = ArchiveExtractor::new(1, "zipfiles").extract(&folder, &[failed], |_, _, _, _| {}).await;
        assert!(errors.is_empty());
        assert!(!folder.join("D9").exists());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn hostile_doc_ids_stay_inside_their_own_directory() {
        let root = temp_dir("escape");
        let other = root.join("2023_10_AF_Hannover/D1");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("keep.docx"), b"keep").unwrap();

        let folder = root.join(".2024_01_BA_Geneva.partial-x");
        let staging = folder.join("zipfiles");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("bad.zip"), b"not a zip").unwrap();
        write_zip(&staging.join("good.zip"), &[("g.txt", b"g".as_slice())]);

        let fetches: Vec<FetchResult> = ["..", ".", "", "zipfiles"]
            .into_iter()
            .map(|id| fetched(id, staging.join("bad.zip")))
            .collect();

        let errors = ArchiveExtractor::new(2, "zipfiles")
            .extract(&folder, &fetches, |_, _, _, _| {})
            .await;

        assert_eq!(errors.len(), 4);
        assert_eq!(std::fs::read(other.join("keep.docx")).unwrap(), b"keep");
        assert!(folder.exists());
        assert!(staging.join("bad.zip").exists());
        assert!(staging.join("good.zip").exists());
        for dir in ["_..", "_.", "_", "_zipfiles"] {
            assert!(!folder.join(dir).exists(), "{dir} left behind");
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_extraction_keeps_a_directory_it_did_not_create() {
        let folder = temp_dir("existing");
        let staging = folder.join("zipfiles");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::create_dir_all(folder.join("D1")).unwrap();
        std::fs::write(folder.join("D1/first.docx"), b"first").unwrap();
        std::fs::write(staging.join("D1.zip"), b"not a zip").unwrap();

        let errors = ArchiveExtractor::new(1, "zipfiles")
            .extract(&folder, &[fetched("D1", staging.join("D1.zip"))], |_, _, _, _| {})
            .await;

        assert_eq!(errors.len(), 1);
        assert!(folder.join("D1/first.docx").exists());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn remove_archives_clears_staging() {
        let folder = temp_dir("remove");
        let staging = folder.join("zipfiles");
        std::fs::create_dir_all(&staging).unwrap();
        write_zip(&staging.join("D1.zip"), &[("a.txt", b"a".as_slice())]);

        remove_archives(&staging, &[fetched("D1", staging.join("D1.zip"))]);
        assert!(!staging.exists());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn remove_archives_keeps_nonempty_staging() {
        let folder = temp_dir("keep");
        let staging = folder.join("zipfiles");
        std::fs::create_dir_all(&staging).unwrap();
        write_zip(&staging.join("D1.zip"), &[("a.txt", b"a".as_slice())]);
        std::fs::write(staging.join("unrelated.txt"), b"keep me").unwrap();

        remove_archives(&staging, &[fetched("D1", staging.join("D1.zip"))]);
        assert!(!staging.join("D1.zip").exists());
        assert!(staging.join("unrelated.txt").exists());

        let _ = std::fs::remove_dir_all(&folder);
    }
}
