//! CLI command definitions, routing, and tracing setup.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use meetingmirror_catalog::{HtmlCatalog, Providers};
use meetingmirror_core::pipeline::{
    MeetingOutcome, MeetingSummary, ProgressReporter, Stage, SyncReport,
};
use meetingmirror_core::planner::MeetingPlan;
use meetingmirror_shared::{
    AppConfig, DocumentRecord, HttpClient, MeetingRecord, SyncConfig, SyncDecision, init_config,
    load_config, load_config_from,
};
use tracing::info;

/// Exit status when at least one meeting failed entirely.
const EXIT_MEETING_FAILED: i32 = 2;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MeetingMirror: keep a local copy of a committee's meeting documents.
#[derive(Parser)]
#[command(
    name = "meetingmirror",
    version,
    about = "Mirror a standards committee's meetings, documents, and notes to a local tree.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv). Also prints catalog and document tables.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.meetingmirror/meetingmirror.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Bring the local mirror up to date with the remote catalog.
    Sync(SyncArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags of `meetingmirror sync`.
#[derive(clap::Args, Debug)]
pub(crate) struct SyncArgs {
    /// Root directory receiving one folder per meeting.
    #[arg(short, long = "output-dir")]
    pub output_dir: PathBuf,

    /// Wait for ENTER after each printed table (with -v).
    #[arg(short, long)]
    pub pause: bool,

    /// Do not write #meeting_info.json or #all_meetings_info.json.
    #[arg(short = 's', long)]
    pub no_manifest: bool,

    /// Delete downloaded archives once extracted.
    #[arg(short, long)]
    pub remove_archives: bool,

    /// Resync every meeting, even complete ones.
    #[arg(short, long)]
    pub force: bool,

    /// Meeting index page.
    #[arg(short = 'd', long)]
    pub catalog_url: Option<String>,

    /// Notes directory index.
    #[arg(short = 'n', long)]
    pub notes_url: Option<String>,

    /// Archive staging directory name inside each meeting folder.
    #[arg(short = 'z', long)]
    pub staging_dir: Option<String>,

    /// Concurrent downloads/extractions within a meeting.
    #[arg(short = 'j', long)]
    pub concurrency: Option<u32>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "meetingmirror=info",
        1 => "meetingmirror=debug",
        _ => "meetingmirror=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync(ref args) => cmd_sync(args, cli.config.as_deref(), cli.verbose).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Merge file config and CLI flags into the runtime config.
fn build_sync_config(args: &SyncArgs, mut app: AppConfig) -> Result<SyncConfig> {
    if let Some(url) = &args.catalog_url {
        app.sources.catalog_url = url.clone();
    }
    if let Some(url) = &args.notes_url {
        app.sources.notes_url = url.clone();
    }
    if let Some(dir) = &args.staging_dir {
        app.sync.staging_dir = dir.clone();
    }
    if let Some(n) = args.concurrency {
        app.sync.concurrency = n;
    }
    if args.remove_archives {
        app.sync.remove_archives = true;
    }
    if args.no_manifest {
        app.sync.write_manifest = false;
    }

    let mut config = SyncConfig::from_app(&app, &args.output_dir)?;
    config.force = args.force;
    Ok(config)
}

async fn cmd_sync(args: &SyncArgs, config_path: Option<&Path>, verbose: u8) -> Result<()> {
    let app = load_app_config(config_path)?;
    let config = build_sync_config(args, app)?;

    info!(
        output = %config.output_root.display(),
        catalog = %config.catalog_url,
        force = config.force,
        "syncing meeting mirror"
    );

    let http = HttpClient::new(&config.http)?;
    let providers = Providers::from_single(Arc::new(HtmlCatalog::new(&config, http)));

    let reporter = CliProgress::new(verbose > 0, args.pause);
    let report = meetingmirror_core::run_sync(&config, &providers, &reporter).await?;

    print_summary(&report);

    if report.has_failures() {
        std::process::exit(EXIT_MEETING_FAILED);
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    println!();
    for meeting in &report.meetings {
        match &meeting.outcome {
            MeetingOutcome::Skipped => {
                println!("  {:>4}  {:<40} skipped", meeting.number, meeting.name);
            }
            MeetingOutcome::Synced(r) => {
                println!(
                    "  {:>4}  {:<40} {} docs, {} extracted, {} unavailable, {} failed, {} corrupt",
                    meeting.number,
                    meeting.name,
                    r.documents,
                    r.extracted,
                    r.unavailable,
                    r.fetch_failures.len(),
                    r.extraction_errors.len()
                );
                for (doc_id, error) in &r.fetch_failures {
                    println!("          ! {doc_id}: {error}");
                }
                for error in &r.extraction_errors {
                    println!("          ! {}", error.to_line());
                }
            }
            MeetingOutcome::Failed { reason } => {
                println!("  {:>4}  {:<40} FAILED: {reason}", meeting.number, meeting.name);
            }
        }
    }

    println!();
    println!("  Synced:  {}", report.synced());
    println!("  Skipped: {}", report.skipped());
    println!("  Failed:  {}", report.failed());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    tables: bool,
    pause: bool,
}

impl CliProgress {
    fn new(tables: bool, pause: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            tables,
            pause,
        }
    }

    /// Print above the spinner, optionally waiting for ENTER.
    fn print_table(&self, lines: Vec<String>) {
        self.spinner.suspend(|| {
            for line in &lines {
                println!("{line}");
            }
            if self.pause {
                println!("Press ENTER to continue...");
                let _ = std::io::stdin().lock().read_line(&mut String::new());
            }
        });
    }
}

fn meeting_table(meetings: &[MeetingRecord]) -> Vec<String> {
    let mut lines = vec![format!("{:>6}  {:<12}  {:<4}  {}", "No.", "Start", "Seq", "Location")];
    for m in meetings {
        lines.push(format!(
            "{:>6}  {:<12}  {:<4}  {}",
            m.number, m.date_range, m.sequence, m.location
        ));
    }
    lines
}

fn document_table(meeting: &str, documents: &[DocumentRecord]) -> Vec<String> {
    let mut lines = vec![format!("{meeting}: {} documents", documents.len())];
    for d in documents {
        let archive = if d.withdrawn {
            "withdrawn"
        } else if d.archive_url.is_some() {
            "archive"
        } else {
            "no link"
        };
        lines.push(format!("  {:<16} {:<10} {}", d.doc_id, archive, d.title));
    }
    lines
}

fn plan_verb(plan: &MeetingPlan) -> &'static str {
    match plan.decision {
        SyncDecision::Skip => "Checking",
        SyncDecision::Resync if plan.replace_existing => "Refreshing",
        SyncDecision::Resync => "Syncing",
    }
}

impl ProgressReporter for CliProgress {
    fn catalog_loaded(&self, meetings: &[MeetingRecord]) {
        if self.tables {
            self.print_table(meeting_table(meetings));
        }
    }

    fn meeting_started(&self, index: usize, total: usize, plan: &MeetingPlan) {
        self.spinner
            .set_message(format!("[{index} of {total}] {} {}", plan_verb(plan), plan.name));
    }

    fn documents_listed(&self, meeting: &str, documents: &[DocumentRecord]) {
        if self.tables {
            self.print_table(document_table(meeting, documents));
        }
    }

    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_done(&self, stage: Stage, current: usize, total: usize, doc_id: &str, ok: bool) {
        let verb = match stage {
            Stage::Download => "Downloading",
            Stage::Extract => "Extracting",
        };
        let mark = if ok { "" } else { " (failed)" };
        self.spinner
            .set_message(format!("{verb} [{current} of {total}] {doc_id}{mark}"));
    }

    fn meeting_finished(&self, summary: &MeetingSummary) {
        if let MeetingOutcome::Failed { reason } = &summary.outcome {
            self.spinner
                .println(format!("  {} failed: {reason}", summary.name));
        }
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_app_config(path)?;
    let toml_str = toml::to_string_pretty(&config)
        .map_err(|e| eyre!("failed to render config: {e}"))?;
    println!("{toml_str}");
    Ok(())
}
