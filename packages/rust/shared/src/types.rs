//! Core domain types for the meeting mirror.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the meeting manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// File name of the per-meeting manifest.
pub const MANIFEST_FILE_NAME: &str = "#meeting_info.json";

/// File name of the per-meeting extraction error list.
pub const ERROR_LIST_FILE_NAME: &str = "#extraction_error_list.txt";

/// File name of the all-meetings summary at the output root.
pub const CATALOG_SUMMARY_FILE_NAME: &str = "#all_meetings_info.json";

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// One meeting as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    /// Meeting number, unique and increasing in catalog order.
    pub number: u32,
    /// Host city (free text, may contain spaces).
    pub location: String,
    /// Start date as published, e.g. `2023-10-11`.
    pub date_range: String,
    /// Sequence letter of the meeting (e.g. `AF`).
    pub sequence: String,
    /// Page listing the meeting's notes and logistics files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_url: Option<String>,
    /// Page holding the meeting's document table.
    pub page_url: String,
}

/// One uploaded document of a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document number, unique within the meeting (e.g. `JVET-AF0001`).
    pub doc_id: String,
    pub title: String,
    /// Direct archive link from the document table, if the row had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    pub authors: String,
    pub uploaded_at: String,
    /// Preview page of the document, used to recover a missing archive link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// The row was explicitly marked as withdrawn.
    #[serde(default)]
    pub withdrawn: bool,
}

/// Remote links found on a meeting's notes page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesLinks {
    pub notes: Option<String>,
    pub logistics: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline values
// ---------------------------------------------------------------------------

/// Per-meeting verdict of the sync planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Folder and manifest are present and trusted.
    Skip,
    /// The meeting must be (re)fetched from scratch.
    Resync,
}

/// Why a document has no archive to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The catalog row is marked withdrawn.
    Withdrawn,
    /// Neither the row nor the preview page carried a matching link.
    NoLink,
    /// The preview page could not be fetched.
    PreviewUnreachable(String),
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Withdrawn => write!(f, "withdrawn"),
            Self::NoLink => write!(f, "no archive link"),
            Self::PreviewUnreachable(e) => write!(f, "preview page unreachable: {e}"),
        }
    }
}

/// Outcome of archive link resolution for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `recovered` is true when the link came from the preview page.
    Resolved { url: String, recovered: bool },
    Unavailable(MissReason),
}

impl Resolution {
    /// The resolved URL, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Resolved { url, .. } => Some(url),
            Self::Unavailable(_) => None,
        }
    }
}

/// Result of downloading one archive.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub doc_id: String,
    /// Where the archive was (or would have been) written.
    pub local_path: PathBuf,
    pub succeeded: bool,
    /// Bytes written on success.
    pub bytes: u64,
    /// SHA-256 of the archive bytes on success.
    pub sha256: Option<String>,
    /// Failure message when `succeeded` is false.
    pub error: Option<String>,
}

/// An archive that could not be extracted. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionError {
    pub doc_id: String,
    pub archive_path: PathBuf,
    pub reason: String,
}

impl ExtractionError {
    /// One line of `#extraction_error_list.txt`.
    pub fn to_line(&self) -> String {
        format!(
            "{}:    {}    ({})",
            self.doc_id,
            self.archive_path.display(),
            self.reason
        )
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A fetched side file (notes or logistics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideFile {
    pub remote_url: String,
    /// Path relative to the meeting folder.
    pub local_path: String,
}

/// What happened to a document during the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Extracted,
    Unavailable,
    FetchFailed,
    CorruptArchive,
}

/// A document row of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    #[serde(flatten)]
    pub record: DocumentRecord,
    /// The archive URL actually used (direct or recovered).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_archive_url: Option<String>,
    /// True when the archive link came from the preview page.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link_recovered: bool,
    /// Archive size in bytes, when downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub status: DocumentStatus,
}

/// The `#meeting_info.json` structure stored in each meeting folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingManifest {
    pub schema_version: u32,
    pub meeting_number: u32,
    pub meeting_name: String,
    pub location: String,
    pub date_range: String,
    /// Documents with an archive to fetch. Withdrawn and unlinked rows are
    /// listed in `documents` but not counted.
    pub document_count: usize,
    #[serde(default)]
    pub notes: Option<SideFile>,
    #[serde(default)]
    pub logistics: Option<SideFile>,
    /// Documents in catalog order.
    pub documents: Vec<DocumentEntry>,
    pub synced_at: DateTime<Utc>,
}

/// The `#all_meetings_info.json` summary at the output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub generated_at: DateTime<Utc>,
    pub meetings: Vec<MeetingRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> DocumentRecord {
        DocumentRecord {
            doc_id: id.into(),
            title: "Common test conditions".into(),
            archive_url: None,
            authors: "A. Author".into(),
            uploaded_at: "2023-10-10 12:00:00".into(),
            preview_url: Some(format!("doc_end_user/current_document.php?id={id}")),
            withdrawn: false,
        }
    }

    #[test]
    fn manifest_serialization() {
        let manifest = MeetingManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            meeting_number: 32,
            meeting_name: "2023_10_AF_Hannover".into(),
            location: "Hannover".into(),
            date_range: "2023-10-13".into(),
            document_count: 1,
            notes: None,
            logistics: Some(SideFile {
                remote_url: "https://example.org/2023_10_AF/logistics.docx".into(),
                local_path: "logistics.docx".into(),
            }),
            documents: vec![DocumentEntry {
                record: doc("JVET-AF0001"),
                resolved_archive_url: Some("https://example.org/JVET-AF0001-v1.zip".into()),
                link_recovered: true,
                archive_bytes: Some(2048),
                sha256: None,
                status: DocumentStatus::Extracted,
            }],
            synced_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        assert!(json.contains("\"doc_id\": \"JVET-AF0001\""));
        assert!(json.contains("\"status\": \"extracted\""));
        assert!(json.contains("\"link_recovered\": true"));
        assert!(json.contains("\"archive_bytes\": 2048"));

        let parsed: MeetingManifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn extraction_error_line() {
        let err = ExtractionError {
            doc_id: "JVET-AF0002".into(),
            archive_path: PathBuf::from("zipfiles/JVET-AF0002-v1.zip"),
            reason: "invalid Zip archive".into(),
        };
        let line = err.to_line();
        assert!(line.starts_with("JVET-AF0002:    zipfiles/JVET-AF0002-v1.zip"));
        assert!(line.ends_with("(invalid Zip archive)"));
    }

    #[test]
    fn resolution_url() {
        let r = Resolution::Resolved {
            url: "https://example.org/a.zip".into(),
            recovered: true,
        };
        assert_eq!(r.url(), Some("https://example.org/a.zip"));
        assert_eq!(Resolution::Unavailable(MissReason::Withdrawn).url(), None);
        assert_eq!(MissReason::NoLink.to_string(), "no archive link");
    }
}
