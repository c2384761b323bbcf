//! Catalog providers: where meetings, documents, and notes links come from.
//!
//! The sync pipeline only sees the three capability traits below
//! ([`CatalogProvider`], [`DocumentTableProvider`], [`NotesProvider`]), so a
//! test double can hand it fixed records without touching the network.
//! [`HtmlCatalog`] implements all three by scraping the committee site.

pub mod parser;

use std::sync::Arc;

use async_trait::async_trait;
use meetingmirror_shared::{
    DocumentRecord, HttpClient, MeetingRecord, MirrorError, NotesLinks, Result, SyncConfig,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Yields every meeting, ordered by ascending number.
///
/// Implementations must return a stable order across calls; skip detection
/// relies on it.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_meetings(&self) -> Result<Vec<MeetingRecord>>;
}

/// Yields a meeting's documents in table order, withdrawn rows included.
#[async_trait]
pub trait DocumentTableProvider: Send + Sync {
    async fn list_documents(&self, meeting: &MeetingRecord) -> Result<Vec<DocumentRecord>>;
}

/// Resolves a meeting's notes page into notes/logistics document links.
#[async_trait]
pub trait NotesProvider: Send + Sync {
    async fn notes_links(&self, notes_url: &str) -> Result<NotesLinks>;
}

/// The three providers the orchestrator needs, usually backed by one object.
#[derive(Clone)]
pub struct Providers {
    pub catalog: Arc<dyn CatalogProvider>,
    pub documents: Arc<dyn DocumentTableProvider>,
    pub notes: Arc<dyn NotesProvider>,
}

impl Providers {
    /// Use a single implementation for all three capabilities.
    pub fn from_single<T>(provider: Arc<T>) -> Self
    where
        T: CatalogProvider + DocumentTableProvider + NotesProvider + 'static,
    {
        Self {
            catalog: provider.clone(),
            documents: provider.clone(),
            notes: provider,
        }
    }
}

// ---------------------------------------------------------------------------
// HTML implementation
// ---------------------------------------------------------------------------

/// Scrapes the meeting index, meeting pages, and notes folders over HTTP.
#[derive(Debug, Clone)]
pub struct HtmlCatalog {
    http: HttpClient,
    catalog_url: Url,
    notes_url: Url,
}

impl HtmlCatalog {
    pub fn new(config: &SyncConfig, http: HttpClient) -> Self {
        Self {
            http,
            catalog_url: config.catalog_url.clone(),
            notes_url: config.notes_url.clone(),
        }
    }

    /// Notes folders, newest first. Unreachable listing means no notes at all.
    async fn notes_folders(&self) -> Vec<String> {
        match self.http.get_text(self.notes_url.as_str()).await {
            Ok(html) => parser::parse_notes_index(&html, &self.notes_url),
            Err(e) => {
                warn!(error = %e, url = %self.notes_url, "notes index unavailable, meetings will have no notes");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl CatalogProvider for HtmlCatalog {
    #[instrument(skip_all, fields(url = %self.catalog_url))]
    async fn list_meetings(&self) -> Result<Vec<MeetingRecord>> {
        let html = self
            .http
            .get_text(self.catalog_url.as_str())
            .await
            .map_err(|e| MirrorError::catalog(format!("meeting index unreachable: {e}")))?;

        let rows = parser::parse_meeting_index(&html, &self.catalog_url)
            .map_err(|e| MirrorError::catalog(e.to_string()))?;

        let notes = self.notes_folders().await;
        debug!(rows = rows.len(), notes = notes.len(), "index pages parsed");

        let meetings = parser::assemble_meetings(rows, &notes)
            .map_err(|e| MirrorError::catalog(e.to_string()))?;

        info!(meetings = meetings.len(), "meeting catalog loaded");
        Ok(meetings)
    }
}

#[async_trait]
impl DocumentTableProvider for HtmlCatalog {
    #[instrument(skip_all, fields(meeting = meeting.number))]
    async fn list_documents(&self, meeting: &MeetingRecord) -> Result<Vec<DocumentRecord>> {
        let page_url = Url::parse(&meeting.page_url).map_err(|e| {
            MirrorError::validation(format!("invalid page_url '{}': {e}", meeting.page_url))
        })?;
        let html = self.http.get_text(page_url.as_str()).await?;
        let documents = parser::parse_document_table(&html, &page_url)?;

        debug!(documents = documents.len(), "document table parsed");
        Ok(documents)
    }
}

#[async_trait]
impl NotesProvider for HtmlCatalog {
    async fn notes_links(&self, notes_url: &str) -> Result<NotesLinks> {
        if notes_url.trim().is_empty() {
            return Ok(NotesLinks::default());
        }
        let html = self.http.get_text(notes_url).await?;
        Ok(parser::parse_notes_page(&html, &self.notes_url))
    }
}
