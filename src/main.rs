//! `elastic-ilm`: multi-tenant index lifecycle manager for Elasticsearch-
//! and OpenSearch-compatible clusters (see crate docs / SPEC_FULL.md).

mod accounting;
mod classify;
mod cli;
mod cluster;
mod config;
mod engines;
mod jobs;
mod logging;
mod notify;
mod policy;
mod scheduler;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // A missing/malformed settings file is a Configuration error (§7) and
    // is allowed to exit the process here, before logging is even live.
    let settings = config::load_settings(&cli.settings)?;
    let log_dir = cli.settings.parent().map(|p| p.join("logs"));
    let _log_guard = logging::init(settings.debug, log_dir.as_deref());

    tracing::info!(version = config::VERSION, settings = %cli.settings.display(), "elastic-ilm starting");

    cli::dispatch(cli).await
}
