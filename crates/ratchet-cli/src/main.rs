//! `ratchet` binary: run "test && commit || revert" against a source tree.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratchet_core::params::Params;
use ratchet_engine::Engine;

/// Watch the source tree and run "test && commit || revert" on every change.
#[derive(Parser)]
#[command(name = "ratchet", version, about)]
struct Cli {
    /// Root of the watched source tree.
    #[arg(short = 'b', long, default_value = ".", value_name = "DIR")]
    base_dir: PathBuf,

    /// Directory build and test commands run from (defaults to the base
    /// directory).
    #[arg(short = 'w', long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Directory holding language and toolchain descriptor files.
    #[arg(short = 'c', long, default_value = ".ratchet", value_name = "DIR")]
    config_dir: PathBuf,

    /// Language name (detected from the base directory name when omitted).
    #[arg(short = 'l', long, default_value = "")]
    language: String,

    /// Toolchain name (the language's default when omitted).
    #[arg(short = 't', long, default_value = "")]
    toolchain: String,

    /// VCS backend (git or p4).
    #[arg(long, default_value = "git")]
    vcs: String,

    /// VCS polling period in seconds (0 disables polling).
    #[arg(short = 'g', long, default_value_t = 0, value_name = "SECONDS")]
    polling: u64,

    /// Mob turn duration in seconds (0 disables the mob timer).
    #[arg(short = 'd', long, default_value_t = 300, value_name = "SECONDS")]
    duration: u64,

    /// Push to the remote after every commit.
    #[arg(short = 'p', long)]
    auto_push: bool,

    /// Record failing states in history before reverting (btcr variant).
    #[arg(long)]
    commit_failures: bool,

    /// Workflow variant: relaxed, btcr or introspective.
    #[arg(long, default_value = "relaxed")]
    variant: String,

    /// Extra paragraph appended to every commit message.
    #[arg(long, default_value = "", value_name = "TEXT")]
    message_suffix: String,

    /// Run with the driver role: watch, test, commit or revert (default).
    #[arg(long, conflicts_with = "navigator")]
    driver: bool,

    /// Run with the navigator role: pull-only synchronization.
    #[arg(long)]
    navigator: bool,
}

/// Mob programming role this process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Driver,
    Navigator,
}

impl Cli {
    fn role(&self) -> Role {
        if self.navigator && !self.driver {
            Role::Navigator
        } else {
            Role::Driver
        }
    }

    fn to_params(&self) -> Params {
        Params {
            base_dir: self.base_dir.clone(),
            work_dir: self
                .work_dir
                .clone()
                .unwrap_or_else(|| self.base_dir.clone()),
            config_dir: self.config_dir.clone(),
            language: self.language.clone(),
            toolchain: self.toolchain.clone(),
            vcs: self.vcs.clone(),
            polling_period: Duration::from_secs(self.polling),
            mob_turn_duration: Duration::from_secs(self.duration),
            auto_push: self.auto_push,
            commit_failures: self.commit_failures,
            variant: self.variant.clone(),
            message_suffix: self.message_suffix.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let params = cli.to_params();
    let mut engine = Engine::new(&params).context("cannot start a TCR session")?;

    let (cancel_tx, cancel_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = cancel_tx.send(());
    })
    .context("cannot install the Ctrl-C handler")?;

    match cli.role() {
        Role::Navigator => engine.run_as_navigator(&cancel_rx)?,
        Role::Driver => engine.run(&cancel_rx)?,
    }
    info!("bye");
    Ok(())
}
