//! Shared types, error model, configuration, and HTTP plumbing for MeetingMirror.
//!
//! This crate is the foundation depended on by all other MeetingMirror crates.
//! It provides:
//! - [`MirrorError`]: the unified error type
//! - Domain types ([`MeetingRecord`], [`DocumentRecord`], [`MeetingManifest`], ...)
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)
//! - [`HttpClient`]: timeout + retry wrapper around `reqwest`

pub mod config;
pub mod error;
pub mod http;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HttpConfig, SourcesConfig, SyncConfig, SyncDefaults, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{MirrorError, Result};
pub use http::{HttpClient, RetryPolicy};
pub use types::{
    CATALOG_SUMMARY_FILE_NAME, CURRENT_SCHEMA_VERSION, CatalogSummary, DocumentEntry,
    DocumentRecord, DocumentStatus, ERROR_LIST_FILE_NAME, ExtractionError, FetchResult,
    MANIFEST_FILE_NAME, MeetingManifest, MeetingRecord, MissReason, NotesLinks, Resolution,
    SideFile, SyncDecision,
};
