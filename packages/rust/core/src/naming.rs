//! Meeting folder names.
//!
//! A meeting's folder is named `<year>_<month>_<sequence>_<location>`, e.g.
//! `2023_10_AF_Hannover`. The name depends only on the catalog record, so
//! the same meeting always maps to the same folder across runs.

use std::sync::LazyLock;

use meetingmirror_shared::{MeetingRecord, MirrorError, Result};
use regex::Regex;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{1,2})").expect("date regex"));

/// Folder name for a meeting.
///
/// Fails when `date_range` has no `YYYY-MM` prefix to take the year and
/// month from.
pub fn meeting_name(meeting: &MeetingRecord) -> Result<String> {
    let caps = DATE_RE.captures(&meeting.date_range).ok_or_else(|| {
        MirrorError::validation(format!(
            "meeting {}: cannot read year/month from date '{}'",
            meeting.number, meeting.date_range
        ))
    })?;

    let year = &caps[1];
    let month: u32 = caps[2]
        .parse()
        .map_err(|_| MirrorError::validation(format!("meeting {}: bad month", meeting.number)))?;

    Ok(format!(
        "{year}_{month:02}_{}_{}",
        path_component(&meeting.sequence),
        path_component(&meeting.location)
    ))
}

/// Directory name a document's archive extracts into.
///
/// Always a single ordinary component of the meeting folder. Empty ids,
/// `.` and `..`, hidden or `#`-prefixed names, and anything matching a
/// `reserved` entry (ASCII case-insensitive) get a leading `_`.
pub fn document_dir_name(doc_id: &str, reserved: &[&str]) -> String {
    let name = path_component(doc_id);
    let clashes = name.is_empty()
        || name.starts_with('.')
        || name.starts_with('#')
        || reserved.iter().any(|r| r.eq_ignore_ascii_case(&name));
    if clashes { format!("_{name}") } else { name }
}

/// Collapse whitespace runs and path separators into single underscores.
fn path_component(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting(date: &str, seq: &str, location: &str) -> MeetingRecord {
        MeetingRecord {
            number: 32,
            location: location.into(),
            date_range: date.into(),
            sequence: seq.into(),
            notes_url: None,
            page_url: "https://example.org/meeting.php?id=32".into(),
        }
    }

    #[test]
    fn name_from_date_sequence_location() {
        let m = meeting("2023-10-13", "AF", "Hannover");
        assert_eq!(meeting_name(&m).unwrap(), "2023_10_AF_Hannover");
    }

    #[test]
    fn location_spaces_become_underscores() {
        let m = meeting("2024-4-1", "AH", " San  Diego ");
        assert_eq!(meeting_name(&m).unwrap(), "2024_04_AH_San_Diego");
    }

    #[test]
    fn separators_cannot_escape_output_root() {
        let m = meeting("2021-01-06", "U", "Online/../Teleconference");
        let name = meeting_name(&m).unwrap();
        assert!(!name.contains('/'));
        assert_eq!(name, "2021_01_U_Online_.._Teleconference");
    }

    #[test]
    fn name_is_deterministic() {
        let m = meeting("2023-10-13", "AF", "Hannover");
        assert_eq!(meeting_name(&m).unwrap(), meeting_name(&m.clone()).unwrap());
    }

    #[test]
    fn missing_date_is_rejected() {
        let m = meeting("TBD", "AF", "Hannover");
        assert!(meeting_name(&m).is_err());
    }

    #[test]
    fn document_dir_is_flat() {
        assert_eq!(document_dir_name("JVET-AF0001", &[]), "JVET-AF0001");
        assert_eq!(document_dir_name("a/b c", &[]), "a_b_c");
    }

    #[test]
    fn document_dir_never_names_the_meeting_or_its_parent() {
        assert_eq!(document_dir_name("..", &[]), "_..");
        assert_eq!(document_dir_name(".", &[]), "_.");
        assert_eq!(document_dir_name("", &[]), "_");
        assert_eq!(document_dir_name("  ", &[]), "_");
        assert_eq!(document_dir_name("../..", &[]), "_.._..");
        assert_eq!(document_dir_name(".hidden", &[]), "_.hidden");
    }

    #[test]
    fn document_dir_avoids_reserved_names() {
        assert_eq!(document_dir_name("zipfiles", &["zipfiles"]), "_zipfiles");
        assert_eq!(document_dir_name("ZipFiles", &["zipfiles"]), "_ZipFiles");
        assert_eq!(document_dir_name("#meeting_info.json", &[]), "_#meeting_info.json");
        assert_eq!(document_dir_name("JVET-AF0002", &["zipfiles"]), "JVET-AF0002");
    }
}
