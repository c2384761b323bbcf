//! Sync pipeline and domain logic for MeetingMirror.
//!
//! This crate ties together the catalog providers, archive resolution and
//! download, extraction, and manifest persistence into the `sync` workflow.

pub mod extractor;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod planner;

pub use manifest::{JsonManifestWriter, ManifestWriter, load_manifest};
pub use naming::meeting_name;
pub use pipeline::{
    MeetingOutcome, MeetingReport, MeetingSummary, ProgressReporter, SilentProgress, Stage,
    SyncReport, run_sync, run_sync_with,
};
pub use planner::{MeetingPlan, decide, plan};
