//! Archive resolution and download.
//!
//! [`ArchiveResolver`] turns document rows into archive URLs, falling back to
//! the document's preview page when the row has no link. [`ArchiveFetcher`]
//! downloads the resolved archives and a meeting's notes/logistics files.

pub mod download;
pub mod resolver;

pub use download::{ArchiveFetcher, DownloadJob, SideFiles, compute_hash, remote_file_name};
pub use resolver::{ArchiveResolver, escape_url, find_archive_link, normalize_archive_url};
