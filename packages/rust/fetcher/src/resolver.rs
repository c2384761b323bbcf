//! Archive link resolution.
//!
//! Most document rows carry a direct archive link. Some rows show the archive
//! name without a link even though the document is not withdrawn; for those
//! the document's preview page is scanned for a link mentioning the document
//! number, and the last such link on the page wins.

use std::sync::{Arc, LazyLock};

use meetingmirror_shared::{DocumentRecord, HttpClient, MissReason, Resolution};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Resolves each document to a downloadable archive URL.
#[derive(Debug, Clone)]
pub struct ArchiveResolver {
    http: HttpClient,
    site_root: Url,
}

impl ArchiveResolver {
    /// `site_root` is the origin archive links are relative to.
    pub fn new(http: HttpClient, site_root: Url) -> Self {
        Self { http, site_root }
    }

    /// Resolve one document. Never fails: misses come back as
    /// [`Resolution::Unavailable`].
    pub async fn resolve(&self, doc: &DocumentRecord) -> Resolution {
        if doc.withdrawn {
            debug!(doc_id = %doc.doc_id, "withdrawn, not resolving");
            return Resolution::Unavailable(MissReason::Withdrawn);
        }

        if let Some(raw) = doc.archive_url.as_deref() {
            return match normalize_archive_url(&self.site_root, raw) {
                Some(url) => Resolution::Resolved {
                    url,
                    recovered: false,
                },
                None => {
                    warn!(doc_id = %doc.doc_id, raw, "unusable archive link");
                    Resolution::Unavailable(MissReason::NoLink)
                }
            };
        }

        let Some(preview) = doc.preview_url.as_deref() else {
            warn!(doc_id = %doc.doc_id, "no archive link and no preview page");
            return Resolution::Unavailable(MissReason::NoLink);
        };

        let html = match self.http.get_text(preview).await {
            Ok(html) => html,
            Err(e) => {
                warn!(doc_id = %doc.doc_id, error = %e, "preview page unreachable");
                return Resolution::Unavailable(MissReason::PreviewUnreachable(e.to_string()));
            }
        };

        match find_archive_link(&html, &doc.doc_id)
            .and_then(|href| normalize_archive_url(&self.site_root, &href))
        {
            Some(url) => {
                info!(doc_id = %doc.doc_id, %url, "archive link recovered from preview page");
                Resolution::Resolved {
                    url,
                    recovered: true,
                }
            }
            None => {
                warn!(doc_id = %doc.doc_id, "no archive link on preview page");
                Resolution::Unavailable(MissReason::NoLink)
            }
        }
    }

    /// Resolve every document with at most `concurrency` lookups in flight.
    /// The result is in the same order as `docs`.
    pub async fn resolve_all(&self, docs: &[DocumentRecord], concurrency: usize) -> Vec<Resolution> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(docs.len());

        for doc in docs {
            let resolver = self.clone();
            let doc = doc.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                resolver.resolve(&doc).await
            }));
        }

        let mut resolutions = Vec::with_capacity(handles.len());
        for handle in handles {
            resolutions.push(match handle.await {
                Ok(resolution) => resolution,
                Err(e) => Resolution::Unavailable(MissReason::PreviewUnreachable(format!(
                    "resolver task failed: {e}"
                ))),
            });
        }
        resolutions
    }
}

/// The last link on a preview page whose text or target mentions `doc_id`.
pub fn find_archive_link(html: &str, doc_id: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let mut found = None;

    for a in doc.select(&LINK_SEL) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let text = a.text().collect::<String>();
        if href.contains(doc_id) || text.contains(doc_id) {
            found = Some(href.trim().to_string());
        }
    }

    found
}

/// Turn a table/preview link into an absolute, escaped URL.
///
/// The site writes archive links relative to its document directory
/// (`../documents/...`); dropping the `..` segments and joining onto the
/// site root yields the real location.
pub fn normalize_archive_url(site_root: &Url, raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace("..", "");
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '/' || c == '.') {
        return None;
    }
    let escaped = escape_url(&cleaned);
    site_root.join(&escaped).ok().map(|u| u.to_string())
}

/// Percent-encode characters that may not appear in a URL.
///
/// Reserved delimiters (including `:` and `/`) and existing `%XX` escapes are
/// kept as they are.
pub fn escape_url(raw: &str) -> String {
    const KEEP: &[u8] = b"-._~:/?#[]@!$&'()*+,;=%";
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
