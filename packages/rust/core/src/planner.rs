//! Per-meeting skip/resync decisions.

use std::path::{Path, PathBuf};

use meetingmirror_shared::{MANIFEST_FILE_NAME, MeetingRecord, Result, SyncDecision};
use tracing::debug;

use crate::naming::meeting_name;

/// What the orchestrator should do with one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingPlan {
    pub name: String,
    /// Final location of the meeting folder.
    pub folder: PathBuf,
    pub decision: SyncDecision,
    /// An existing folder will be replaced by the resync.
    pub replace_existing: bool,
}

/// Decide whether a meeting needs to be fetched again.
///
/// A meeting is trusted only when both its folder and its manifest exist.
/// The last meeting of the catalog is always refetched since documents keep
/// arriving until it is over.
pub fn decide(folder_exists: bool, manifest_exists: bool, is_last: bool, force: bool) -> SyncDecision {
    if !folder_exists || force || !manifest_exists || is_last {
        SyncDecision::Resync
    } else {
        SyncDecision::Skip
    }
}

/// Probe the output tree and plan one meeting.
pub fn plan(output_root: &Path, meeting: &MeetingRecord, is_last: bool, force: bool) -> Result<MeetingPlan> {
    let name = meeting_name(meeting)?;
    let folder = output_root.join(&name);
    let folder_exists = folder.is_dir();
    let manifest_exists = folder.join(MANIFEST_FILE_NAME).is_file();

    let decision = decide(folder_exists, manifest_exists, is_last, force);
    debug!(
        meeting = meeting.number,
        %name,
        folder_exists,
        manifest_exists,
        is_last,
        force,
        ?decision,
        "meeting planned"
    );

    Ok(MeetingPlan {
        name,
        folder,
        decision,
        replace_existing: folder_exists && decision == SyncDecision::Resync,
    })
}
