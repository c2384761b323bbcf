//! MeetingMirror CLI: mirror a standards committee's meetings locally.
//!
//! Walks the committee's meeting catalog and keeps one folder per meeting,
//! holding every document archive extracted, plus notes and logistics files.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
