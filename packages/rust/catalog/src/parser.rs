//! HTML table parsers for the committee site.
//!
//! The site exposes three kinds of pages:
//! - the meeting index: a table whose rows are
//!   `number | location | start date | end date | sequence letter`,
//!   each row linking to the meeting's document page;
//! - a meeting page: the second table lists documents,
//!   `number (→ preview) | MPEG number | created | first upload | last upload | title | source | archive`;
//! - a notes folder listing with links to the notes and logistics documents.
//!
//! Everything here is pure: HTML in, records out.

use std::sync::LazyLock;

use meetingmirror_shared::{DocumentRecord, MeetingRecord, MirrorError, NotesLinks, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

// ---------------------------------------------------------------------------
// Selectors (compiled once)
// ---------------------------------------------------------------------------

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("table selector"));
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("tr selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("td selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Column layout of the meeting page's document table.
const DOC_COL_NUMBER: usize = 0;
const DOC_COL_LAST_UPLOAD: usize = 4;
const DOC_COL_TITLE: usize = 5;
const DOC_COL_AUTHORS: usize = 6;
const DOC_COL_ARCHIVE: usize = 7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A meeting row as it appears on the index page, before notes pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRow {
    pub number: u32,
    pub location: String,
    pub start_date: String,
    pub sequence: String,
    pub page_url: String,
}

/// Text and first link of a table cell.
struct Cell {
    text: String,
    href: Option<String>,
}

fn cell(el: ElementRef<'_>) -> Cell {
    let text = el
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let href = el
        .select(&LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());
    Cell { text, href }
}

fn row_cells(row: ElementRef<'_>) -> Vec<Cell> {
    row.select(&CELL_SEL).map(cell).collect()
}

// ---------------------------------------------------------------------------
// Meeting index
// ---------------------------------------------------------------------------

/// Parse the meeting index page into rows, in page order.
///
/// Header rows (no numeric first cell) are skipped. A page without any table
/// or without any meeting row is an error: there is nothing to plan against.
pub fn parse_meeting_index(html: &str, index_url: &Url) -> Result<Vec<MeetingRow>> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&TABLE_SEL)
        .next()
        .ok_or_else(|| MirrorError::parse("meeting index has no table"))?;

    let mut rows = Vec::new();
    for tr in table.select(&ROW_SEL) {
        let cells = row_cells(tr);
        if cells.len() < 5 {
            continue;
        }
        let Ok(number) = cells[0].text.parse::<u32>() else {
            continue;
        };

        let href = tr
            .select(&LINK_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| MirrorError::parse(format!("meeting {number} has no page link")))?;
        let page_url = index_url
            .join(href.trim())
            .map_err(|e| MirrorError::parse(format!("meeting {number}: bad link '{href}': {e}")))?;

        rows.push(MeetingRow {
            number,
            location: cells[1].text.clone(),
            start_date: cells[2].text.clone(),
            sequence: cells[4].text.clone(),
            page_url: page_url.to_string(),
        });
    }

    if rows.is_empty() {
        return Err(MirrorError::parse("meeting index lists no meetings"));
    }
    Ok(rows)
}

/// Collect the per-meeting notes folders from the notes directory listing.
///
/// Folders are named after their year (`2023_10_AF_Hannover/` etc.), so only
/// links below the listing's own path starting with `2` qualify. The listing
/// is oldest-first; the result is newest-first to match the meeting index.
pub fn parse_notes_index(html: &str, notes_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let prefix = format!("{}2", notes_url.path());

    let mut links: Vec<String> = doc
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| notes_url.join(href.trim()).ok())
        .filter(|u| u.path().starts_with(&prefix))
        .map(|u| u.to_string())
        .collect();
    links.reverse();
    links
}

/// Pair index rows with notes folders (both in page order) and sort by number.
///
/// Rows beyond the end of the notes list (the oldest meetings) get no notes.
/// Duplicate meeting numbers make the catalog unusable for skip detection.
pub fn assemble_meetings(rows: Vec<MeetingRow>, notes: &[String]) -> Result<Vec<MeetingRecord>> {
    let mut meetings: Vec<MeetingRecord> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| MeetingRecord {
            number: row.number,
            location: row.location,
            date_range: row.start_date,
            sequence: row.sequence,
            notes_url: notes.get(i).cloned(),
            page_url: row.page_url,
        })
        .collect();

    meetings.sort_by_key(|m| m.number);

    if let Some(pair) = meetings.windows(2).find(|w| w[0].number == w[1].number) {
        return Err(MirrorError::parse(format!(
            "meeting number {} listed twice",
            pair[0].number
        )));
    }
    Ok(meetings)
}

// ---------------------------------------------------------------------------
// Meeting page
// ---------------------------------------------------------------------------

/// Parse a meeting page's document table, in page order.
///
/// Rows with an empty archive cell are not listed at all. Rows marked
/// "withdrawn" are kept with `withdrawn = true`. Rows whose archive cell has
/// text but no link keep `archive_url = None` so the resolver can fall back
/// to the preview page.
pub fn parse_document_table(html: &str, page_url: &Url) -> Result<Vec<DocumentRecord>> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&TABLE_SEL)
        .nth(1)
        .ok_or_else(|| MirrorError::parse(format!("{page_url}: no document table")))?;

    let mut documents = Vec::new();
    for tr in table.select(&ROW_SEL) {
        let cells = row_cells(tr);
        if cells.len() <= DOC_COL_ARCHIVE {
            continue;
        }

        let number = &cells[DOC_COL_NUMBER];
        let archive = &cells[DOC_COL_ARCHIVE];
        if number.text.is_empty() || (archive.text.is_empty() && archive.href.is_none()) {
            continue;
        }

        let withdrawn = archive.text.eq_ignore_ascii_case("withdrawn");
        let preview_url = number
            .href
            .as_deref()
            .and_then(|h| page_url.join(h).ok())
            .map(|u| u.to_string());

        documents.push(DocumentRecord {
            doc_id: number.text.clone(),
            title: cells[DOC_COL_TITLE].text.clone(),
            archive_url: if withdrawn { None } else { archive.href.clone() },
            authors: cells[DOC_COL_AUTHORS].text.clone(),
            uploaded_at: cells[DOC_COL_LAST_UPLOAD].text.clone(),
            preview_url,
            withdrawn,
        });
    }

    Ok(documents)
}

// ---------------------------------------------------------------------------
// Notes page
// ---------------------------------------------------------------------------

/// Find the notes and logistics documents on a meeting's notes folder page.
///
/// The last matching link wins. Links are rebuilt from their last two path
/// segments (`<folder>/<file>`) against the notes source, because the listing
/// uses server-absolute paths that do not always share the source's prefix.
pub fn parse_notes_page(html: &str, notes_source: &Url) -> NotesLinks {
    let doc = Html::parse_document(html);
    let mut links = NotesLinks::default();

    for href in doc.select(&LINK_SEL).filter_map(|a| a.value().attr("href")) {
        let lower = href.to_lowercase();
        let is_notes = lower.contains("notes");
        let is_logistics = lower.contains("logistics");
        if !is_notes && !is_logistics {
            continue;
        }

        let segments: Vec<&str> = href.trim().split('/').collect();
        let tail = segments[segments.len().saturating_sub(2)..].join("/");
        let Ok(resolved) = notes_source.join(&tail) else {
            continue;
        };

        if is_notes {
            links.notes = Some(resolved.to_string());
        }
        if is_logistics {
            links.logistics = Some(resolved.to_string());
        }
    }

    links
}
