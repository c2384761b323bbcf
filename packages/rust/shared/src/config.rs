//! Application configuration for MeetingMirror.
//!
//! User config lives at `~/.meetingmirror/meetingmirror.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MirrorError, Result};
use crate::http::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "meetingmirror.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".meetingmirror";

// ---------------------------------------------------------------------------
// Config structs (matching meetingmirror.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote index pages.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Sync behaviour.
    #[serde(default)]
    pub sync: SyncDefaults,

    /// HTTP timeouts and retries.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Page listing every meeting.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// Directory index listing the per-meeting notes folders.
    #[serde(default = "default_notes_url")]
    pub notes_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            notes_url: default_notes_url(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://www.jvet-experts.org/doc_end_user/all_meeting.php".into()
}
fn default_notes_url() -> String {
    "https://www.itu.int/wftp3/av-arch/jvet-site/".into()
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDefaults {
    /// Name of the per-meeting archive staging directory.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Delete staged archives once extracted.
    #[serde(default)]
    pub remove_archives: bool,

    /// Persist `#meeting_info.json` and `#all_meetings_info.json`.
    #[serde(default = "default_true")]
    pub write_manifest: bool,

    /// Maximum concurrent downloads/extractions within a meeting.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            remove_archives: false,
            write_manifest: true,
            concurrency: default_concurrency(),
        }
    }
}

fn default_staging_dir() -> String {
    "zipfiles".into()
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> u32 {
    4
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect and per-read timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}

impl HttpConfig {
    /// Connect and per-read timeout.as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy derived from this section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Sync config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime sync configuration, merged from config file + CLI flags.
///
/// Built once per run and passed by reference into every stage.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root directory that receives one folder per meeting.
    pub output_root: PathBuf,
    /// Meeting index page.
    pub catalog_url: Url,
    /// Notes directory index.
    pub notes_url: Url,
    /// Name of the archive staging directory inside each meeting folder.
    pub staging_dir: String,
    /// Delete staged archives after extraction.
    pub remove_archives: bool,
    /// Persist manifests and the catalog summary.
    pub write_manifest: bool,
    /// Resync meetings even when a manifest exists.
    pub force: bool,
    /// Bound on concurrent per-document work.
    pub concurrency: u32,
    /// HTTP timeouts and retries.
    pub http: HttpConfig,
}

impl SyncConfig {
    /// Build a runtime config from the file config, with the given output root.
    pub fn from_app(config: &AppConfig, output_root: impl Into<PathBuf>) -> Result<Self> {
        let catalog_url = parse_url("catalog_url", &config.sources.catalog_url)?;
        let notes_url = parse_url("notes_url", &config.sources.notes_url)?;

        let sync = Self {
            output_root: output_root.into(),
            catalog_url,
            notes_url,
            staging_dir: config.sync.staging_dir.clone(),
            remove_archives: config.sync.remove_archives,
            write_manifest: config.sync.write_manifest,
            force: false,
            concurrency: config.sync.concurrency,
            http: config.http.clone(),
        };
        sync.validate()?;
        Ok(sync)
    }

    /// Reject values that would break the on-disk layout.
    pub fn validate(&self) -> Result<()> {
        let staging = self.staging_dir.trim();
        if staging.is_empty()
            || staging.contains(['/', '\\'])
            || staging == "."
            || staging == ".."
            || staging.starts_with('#')
        {
            return Err(MirrorError::config(format!(
                "staging_dir must be a plain directory name, got '{}'",
                self.staging_dir
            )));
        }
        if self.concurrency == 0 {
            return Err(MirrorError::config("concurrency must be at least 1"));
        }
        if self.http.max_attempts == 0 {
            return Err(MirrorError::config("http.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Root of the remote site (the catalog URL's origin), used to absolutize
    /// archive links found in document tables.
    pub fn site_root(&self) -> Url {
        let mut root = self.catalog_url.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        root
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| MirrorError::config(format!("invalid {field} '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.meetingmirror/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MirrorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.meetingmirror/meetingmirror.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MirrorError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MirrorError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MirrorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MirrorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MirrorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("catalog_url"));
        assert!(toml_str.contains("zipfiles"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[sync]
remove_archives = true

[http]
max_attempts = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.sync.remove_archives);
        assert!(config.sync.write_manifest);
        assert_eq!(config.sync.staging_dir, "zipfiles");
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.http.timeout_secs, 60);
        assert!(config.sources.catalog_url.ends_with("all_meeting.php"));
    }

    #[test]
    fn sync_config_from_app_config() {
        let app = AppConfig::default();
        let sync = SyncConfig::from_app(&app, "/tmp/mirror").expect("sync config");
        assert_eq!(sync.output_root, PathBuf::from("/tmp/mirror"));
        assert_eq!(sync.concurrency, 4);
        assert!(!sync.force);
        assert_eq!(sync.site_root().as_str(), "https://www.jvet-experts.org/");
    }

    #[test]
    fn invalid_catalog_url_is_config_error() {
        let mut app = AppConfig::default();
        app.sources.catalog_url = "not a url".into();
        let err = SyncConfig::from_app(&app, "/tmp/mirror").unwrap_err();
        assert!(err.to_string().contains("invalid catalog_url"));
        assert!(err.is_fatal());
    }

    #[test]
    fn staging_dir_must_be_plain_name() {
        let mut app = AppConfig::default();
        app.sync.staging_dir = "../outside".into();
        assert!(SyncConfig::from_app(&app, "/tmp/mirror").is_err());

        app.sync.staging_dir = "archives".into();
        assert!(SyncConfig::from_app(&app, "/tmp/mirror").is_ok());
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("mm-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("meetingmirror.toml");
        std::fs::write(&path, "[sync]\nconcurrency = 8\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.sync.concurrency, 8);

        std::fs::write(&path, "[sync\nbroken").unwrap();
        assert!(load_config_from(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
