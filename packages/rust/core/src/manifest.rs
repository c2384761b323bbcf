//! Meeting manifests, extraction error lists, and the catalog summary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use meetingmirror_shared::{
    CATALOG_SUMMARY_FILE_NAME, CURRENT_SCHEMA_VERSION, CatalogSummary, DocumentEntry,
    DocumentRecord, DocumentStatus, ERROR_LIST_FILE_NAME, ExtractionError, FetchResult,
    MANIFEST_FILE_NAME, MeetingManifest, MeetingRecord, MirrorError, Resolution, Result, SideFile,
};
use serde::Serialize;
use tracing::{debug, instrument};

/// Persists what a sync produced.
pub trait ManifestWriter: Send + Sync {
    /// Write `#meeting_info.json` into `folder`.
    fn write_manifest(&self, folder: &Path, manifest: &MeetingManifest) -> Result<PathBuf>;

    /// Write `#extraction_error_list.txt` into `folder`.
    fn write_error_list(&self, folder: &Path, errors: &[ExtractionError]) -> Result<PathBuf>;

    /// Write `#all_meetings_info.json` into `output_root`.
    fn write_summary(&self, output_root: &Path, summary: &CatalogSummary) -> Result<PathBuf>;
}

/// Pretty-printed JSON manifests and a plain text error list.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonManifestWriter;

impl ManifestWriter for JsonManifestWriter {
    #[instrument(skip_all, fields(meeting = %manifest.meeting_name))]
    fn write_manifest(&self, folder: &Path, manifest: &MeetingManifest) -> Result<PathBuf> {
        let path = folder.join(MANIFEST_FILE_NAME);
        write_json(&path, manifest)?;
        debug!(documents = manifest.documents.len(), "manifest written");
        Ok(path)
    }

    fn write_error_list(&self, folder: &Path, errors: &[ExtractionError]) -> Result<PathBuf> {
        let path = folder.join(ERROR_LIST_FILE_NAME);
        let mut content = String::new();
        for error in errors {
            content.push_str(&error.to_line());
            content.push('\n');
        }
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    fn write_summary(&self, output_root: &Path, summary: &CatalogSummary) -> Result<PathBuf> {
        let path = output_root.join(CATALOG_SUMMARY_FILE_NAME);
        write_json(&path, summary)?;
        Ok(path)
    }
}

/// Read a meeting's manifest back.
pub fn load_manifest(folder: &Path) -> Result<MeetingManifest> {
    let path = folder.join(MANIFEST_FILE_NAME);
    let content = std::fs::read_to_string(&path).map_err(|e| MirrorError::io(&path, e))?;
    let manifest: MeetingManifest = serde_json::from_str(&content)
        .map_err(|e| MirrorError::validation(format!("invalid {MANIFEST_FILE_NAME}: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(MirrorError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }
    Ok(manifest)
}

/// Everything one meeting sync produced, as input to [`build_manifest`].
#[derive(Debug, Clone, Copy)]
pub struct SyncedMeeting<'a> {
    pub meeting: &'a MeetingRecord,
    pub name: &'a str,
    pub documents: &'a [DocumentRecord],
    /// One per document, same order.
    pub resolutions: &'a [Resolution],
    pub fetches: &'a [FetchResult],
    pub errors: &'a [ExtractionError],
}

/// Assemble the manifest, deriving each document's final status.
pub fn build_manifest(
    synced: SyncedMeeting<'_>,
    notes: Option<SideFile>,
    logistics: Option<SideFile>,
) -> MeetingManifest {
    let fetches: HashMap<&str, &FetchResult> =
        synced.fetches.iter().map(|f| (f.doc_id.as_str(), f)).collect();
    let corrupt: HashMap<&str, &ExtractionError> =
        synced.errors.iter().map(|e| (e.doc_id.as_str(), e)).collect();

    let documents = synced
        .documents
        .iter()
        .zip(synced.resolutions)
        .map(|(doc, resolution)| {
            let fetch = fetches.get(doc.doc_id.as_str());
            let status = match (resolution, fetch) {
                (Resolution::Unavailable(_), _) => DocumentStatus::Unavailable,
                (_, None) => DocumentStatus::FetchFailed,
                (_, Some(f)) if !f.succeeded => DocumentStatus::FetchFailed,
                _ if corrupt.contains_key(doc.doc_id.as_str()) => DocumentStatus::CorruptArchive,
                _ => DocumentStatus::Extracted,
            };

            let downloaded = fetch.filter(|f| f.succeeded);
            DocumentEntry {
                record: doc.clone(),
                resolved_archive_url: resolution.url().map(str::to_string),
                link_recovered: matches!(resolution, Resolution::Resolved { recovered: true, .. }),
                archive_bytes: downloaded.map(|f| f.bytes),
                sha256: downloaded.and_then(|f| f.sha256.clone()),
                status,
            }
        })
        .collect();
    let document_count = synced.resolutions.iter().filter(|r| r.url().is_some()).count();

    MeetingManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        meeting_number: synced.meeting.number,
        meeting_name: synced.name.to_string(),
        location: synced.meeting.location.clone(),
        date_range: synced.meeting.date_range.clone(),
        document_count,
        notes,
        logistics,
        documents,
        synced_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| MirrorError::parse(format!("failed to serialize JSON: {e}")))?;
    write_atomic(path, json.as_bytes())
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| MirrorError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| MirrorError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetingmirror_shared::MissReason;
    use uuid::Uuid;

    fn meeting() -> MeetingRecord {
        MeetingRecord {
            number: 102,
            location: "San Diego".into(),
            date_range: "2024-04-01".into(),
            sequence: "BB".into(),
            notes_url: None,
            page_url: "https://example.org/meeting.php?id=102".into(),
        }
    }

    fn doc(id: &str) -> DocumentRecord {
        DocumentRecord {
            doc_id: id.into(),
            title: format!("Title of {id}"),
            archive_url: Some(format!("../documents/{id}.zip")),
            authors: "Author".into(),
            uploaded_at: "2024-04-02".into(),
            preview_url: None,
            withdrawn: false,
        }
    }

    fn fetch(id: &str, ok: bool) -> FetchResult {
        FetchResult {
            doc_id: id.into(),
            local_path: PathBuf::from(format!("zipfiles/{id}.zip")),
            succeeded: ok,
            bytes: if ok { 10 } else { 0 },
            sha256: ok.then(|| format!("hash-{id}")),
            error: (!ok).then(|| "HTTP 404".to_string()),
        }
    }

    fn resolved(id: &str) -> Resolution {
        Resolution::Resolved {
            url: format!("https://example.org/documents/{id}.zip"),
            recovered: false,
        }
    }

    #[test]
    fn statuses_follow_each_stage() {
        let meeting = meeting();
        let documents = vec![doc("D1"), doc("D2"), doc("D3"), doc("D4")];
        let resolutions = vec![
            resolved("D1"),
            Resolution::Unavailable(MissReason::Withdrawn),
            resolved("D3"),
            resolved("D4"),
        ];
        let fetches = vec![fetch("D1", true), fetch("D3", false), fetch("D4", true)];
        let errors = vec![ExtractionError {
            doc_id: "D4".into(),
            archive_path: PathBuf::from("zipfiles/D4.zip"),
            reason: "invalid Zip archive".into(),
        }];

        let manifest = build_manifest(
            SyncedMeeting {
                meeting: &meeting,
                name: "2024_04_BB_San_Diego",
                documents: &documents,
                resolutions: &resolutions,
                fetches: &fetches,
                errors: &errors,
            },
            None,
            None,
        );

        let statuses: Vec<_> = manifest.documents.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                DocumentStatus::Extracted,
                DocumentStatus::Unavailable,
                DocumentStatus::FetchFailed,
                DocumentStatus::CorruptArchive,
            ]
        );
        assert_eq!(manifest.documents.len(), 4);
        assert_eq!(manifest.document_count, 3);
        assert_eq!(manifest.documents[0].sha256.as_deref(), Some("hash-D1"));
        assert_eq!(manifest.documents[0].archive_bytes, Some(10));
        assert!(manifest.documents[1].resolved_archive_url.is_none());
        assert_eq!(manifest.documents[2].archive_bytes, None);
        assert!(manifest.documents.iter().all(|d| !d.link_recovered));
    }

    #[test]
    fn recovered_links_are_marked() {
        let meeting = meeting();
        let documents = vec![doc("D1"), doc("D2")];
        let resolutions = vec![
            Resolution::Resolved {
                url: "https://example.org/documents/D1-v2.zip".into(),
                recovered: true,
            },
            Resolution::Unavailable(MissReason::NoLink),
        ];
        let fetches = vec![fetch("D1", true)];

        let manifest = build_manifest(
            SyncedMeeting {
                meeting: &meeting,
                name: "2024_04_BB_San_Diego",
                documents: &documents,
                resolutions: &resolutions,
                fetches: &fetches,
                errors: &[],
            },
            None,
            None,
        );

        assert!(manifest.documents[0].link_recovered);
        assert!(!manifest.documents[1].link_recovered);
        assert_eq!(manifest.document_count, 1);
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mm-manifest-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let meeting = meeting();
        let documents = vec![doc("D1")];
        let resolutions = vec![resolved("D1")];
        let fetches = vec![fetch("D1", true)];
        let manifest = build_manifest(
            SyncedMeeting {
                meeting: &meeting,
                name: "2024_04_BB_San_Diego",
                documents: &documents,
                resolutions: &resolutions,
                fetches: &fetches,
                errors: &[],
            },
            Some(SideFile {
                remote_url: "https://example.org/notes.docx".into(),
                local_path: "notes.docx".into(),
            }),
            None,
        );

        let writer = JsonManifestWriter;
        let path = writer.write_manifest(&dir, &manifest).unwrap();
        assert!(path.ends_with(MANIFEST_FILE_NAME));
        assert!(!dir.join(format!(".{MANIFEST_FILE_NAME}.tmp")).exists());

        let loaded = load_manifest(&dir).unwrap();
        assert_eq!(loaded, manifest);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_rejects_other_schema() {
        let dir = std::env::temp_dir().join(format!("mm-manifest-schema-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let meeting = meeting();
        let mut manifest = build_manifest(
            SyncedMeeting {
                meeting: &meeting,
                name: "x",
                documents: &[],
                resolutions: &[],
                fetches: &[],
                errors: &[],
            },
            None,
            None,
        );
        manifest.schema_version = 99;
        JsonManifestWriter.write_manifest(&dir, &manifest).unwrap();

        let err = load_manifest(&dir).unwrap_err();
        assert!(err.to_string().contains("schema_version"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn error_list_lines() {
        let dir = std::env::temp_dir().join(format!("mm-errors-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let errors = vec![
            ExtractionError {
                doc_id: "D2".into(),
                archive_path: PathBuf::from("zipfiles/D2.zip"),
                reason: "bad".into(),
            },
            ExtractionError {
                doc_id: "D5".into(),
                archive_path: PathBuf::from("zipfiles/D5.zip"),
                reason: "worse".into(),
            },
        ];
        let path = JsonManifestWriter.write_error_list(&dir, &errors).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "D2:    zipfiles/D2.zip    (bad)\nD5:    zipfiles/D5.zip    (worse)\n"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
