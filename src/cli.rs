//! Command-line surface (§6 "CLI flags"): one binary, `elastic-ilm`, with a
//! subcommand per lifecycle family plus `run` for the daemon. Every family
//! subcommand accepts `--client` (limit to one tenant; default all) and
//! `--notification` (§6); `run` additionally takes `--manual` and
//! `--settings` (SPEC_FULL.md §6's concrete CLI shape).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::VERSION;
use crate::scheduler::Family;

#[derive(Parser)]
#[command(name = "elastic-ilm")]
#[command(version = VERSION)]
#[command(about = "Multi-tenant index lifecycle manager for Elasticsearch/OpenSearch", long_about = None)]
pub struct Cli {
    /// Path to the global settings.toml (default: ./settings.toml)
    #[arg(long, global = true, default_value = "settings.toml")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the rollover engine once
    Rollover(FamilyArgs),
    /// Run the retention engine once
    Retention(FamilyArgs),
    /// Run the allocation (hot/warm tiering) engine once
    Allocation(FamilyArgs),
    /// Run the force-merge engine once
    Forcemerge(FamilyArgs),
    /// Run the backup/snapshot engine once
    Backup(FamilyArgs),
    /// Run the accounting engine once
    Accounting(FamilyArgs),
    /// Run the job-queue (reindex candidate) scan once
    Jobs(FamilyArgs),
    /// Run the periodic scheduler daemon across every enabled family
    Run {
        #[command(flatten)]
        args: FamilyArgs,
        /// 1 = run every enabled family once and exit; 0 = run the daemon
        #[arg(long, default_value_t = 0)]
        manual: u8,
    },
}

#[derive(clap::Args)]
pub struct FamilyArgs {
    /// Limit to one tenant by client name (default: every tenant, or the
    /// settings file's `limit_to_client` if set)
    #[arg(long)]
    pub client: Option<String>,
    /// Whether to emit Notifier events on failure
    #[arg(long, default_value_t = true)]
    pub notification: bool,
}

impl Commands {
    fn family(&self) -> Option<Family> {
        match self {
            Commands::Rollover(_) => Some(Family::Rollover),
            Commands::Retention(_) => Some(Family::Retention),
            Commands::Allocation(_) => Some(Family::Allocation),
            Commands::Forcemerge(_) => Some(Family::Forcemerge),
            Commands::Backup(_) => Some(Family::Backup),
            Commands::Accounting(_) => Some(Family::Accounting),
            Commands::Jobs(_) => Some(Family::Jobs),
            Commands::Run { .. } => None,
        }
    }

    fn args(&self) -> &FamilyArgs {
        match self {
            Commands::Rollover(a)
            | Commands::Retention(a)
            | Commands::Allocation(a)
            | Commands::Forcemerge(a)
            | Commands::Backup(a)
            | Commands::Accounting(a)
            | Commands::Jobs(a) => a,
            Commands::Run { args, .. } => args,
        }
    }
}

/// Dispatches the parsed CLI: single-family subcommands run once and exit;
/// `run` either fires every enabled family once (`--manual 1`) or starts
/// the persistent scheduler daemon (`--manual 0`, the default).
pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let args = cli.command.args();
    let client = args.client.clone();
    let notification = args.notification;

    match (&cli.command, cli.command.family()) {
        (_, Some(family)) => {
            crate::scheduler::run_once(family, cli.settings, client, notification).await?;
        }
        (Commands::Run { manual: 1, .. }, None) => {
            for family in Family::all() {
                crate::scheduler::run_once(family, cli.settings.clone(), client.clone(), notification).await?;
            }
        }
        (Commands::Run { .. }, None) => {
            crate::scheduler::run_daemon(cli.settings, notification).await?;
        }
        (_, None) => unreachable!("every Commands variant is either a family or Run"),
    }

    Ok(())
}
