#![warn(clippy::pedantic)]

//! # swup
//!
//! Installs, switches and updates toolchain versions for the current user.
//!
//! ## Subcommands
//!
//! - `init` - Set up swup and install the latest release
//! - `install` - Install a toolchain
//! - `list` - List installed toolchains
//! - `list-available` - List toolchains offered for this platform
//! - `use` - Show or change the toolchain in use
//! - `run` - Run a command with a toolchain on `PATH`
//! - `uninstall` - Remove a toolchain
//! - `update` - Move a toolchain to the newest version on its line
//! - `repair` - Clean up after interrupted operations
//! - `self-uninstall` - Remove swup itself
//!
//! ## Selectors
//!
//! ```text
//! latest                   newest release
//! 5                        newest 5.x.y release
//! 5.10                     newest 5.10.x release
//! 5.10.1                   one release
//! main-snapshot            newest snapshot of the main branch
//! 5.10-snapshot            newest snapshot of the 5.10 branch
//! main-snapshot-2024-01-31 one snapshot
//! ```
//!
//! A `.swift-version` file holding one selector pins the toolchain for the
//! directory it is in and everything below.
//!
//! ## Exit codes
//!
//! `0` success, `1` operation error, `2` usage error, `3` unsupported
//! platform, `4` aborted by the user. `swup run` exits with the code of the
//! command it ran.

mod commands;
mod errors;
mod progress;
mod shell;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    init, install, list, list_available, repair, run as run_cmd, self_uninstall, uninstall, update,
    use_cmd,
};
use errors::SwupError;
use swup_engine::EngineError;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SWUP_LOG";

/// Toolchain version manager.
#[derive(Parser)]
#[command(
    name = "swup",
    author,
    version,
    about = "Install, switch and update toolchain versions",
    after_help = "\
ENVIRONMENT VARIABLES:
    SWUP_HOME_DIR           swup home directory
    SWUP_BIN_DIR            Directory added to PATH by the environment scripts
    SWUP_TOOLCHAINS_DIR     Where toolchains are installed
    SWUP_DIST_SERVER        Release catalog server (default: https://www.swift.org)
    SWUP_DOWNLOAD_SERVER    Download server (default: https://download.swift.org)
    SWUP_LOCK_TIMEOUT_SECS  Seconds to wait for another swup process
    SWUP_LOG                Log filter, e.g. debug or swup_engine=info (default: warn)"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Set up swup for the current user.
    ///
    /// Creates the home directory and configuration, writes the environment
    /// scripts, hooks them into the shell profile and installs the latest
    /// release.
    Init(init::InitArgs),

    /// Install a toolchain.
    ///
    /// The first installed toolchain becomes active.
    Install(install::InstallArgs),

    /// List installed toolchains.
    List(list::ListArgs),

    /// List toolchains available for this platform.
    ListAvailable(list_available::ListAvailableArgs),

    /// Show or change the toolchain in use.
    ///
    /// Without a selector, prints the toolchain in use. With one, pins it in
    /// the project's `.swift-version` file or sets the global default.
    Use(use_cmd::UseArgs),

    /// Run a command with a toolchain first on `PATH`.
    ///
    /// Uses the toolchain in effect here unless an argument `+<selector>`
    /// picks another.
    Run(run_cmd::RunArgs),

    /// Remove an installed toolchain.
    Uninstall(uninstall::UninstallArgs),

    /// Update a toolchain to the newest version on its line.
    ///
    /// Releases stay on their major.minor line, snapshots on their branch.
    Update(update::UpdateArgs),

    /// Remove leftovers of interrupted operations and report inconsistencies.
    Repair,

    /// Remove swup, its configuration and the toolchains in its home.
    SelfUninstall(self_uninstall::SelfUninstallArgs),
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Prints an error and returns the exit code for it.
fn handle_error(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<SwupError>() {
        Some(SwupError::Aborted) => {
            eprintln!("Aborted.");
            return 4;
        }
        Some(SwupError::CommandFailed { code }) => return *code,
        _ => {}
    }

    eprintln!("Error: {e:?}");
    match e.downcast_ref::<EngineError>() {
        Some(EngineError::UnsupportedPlatform { .. }) => 3,
        Some(engine_error) => {
            if let Some(hint) = engine_error.remediation() {
                eprintln!("Hint: {hint}");
            }
            1
        }
        None => 1,
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => init::execute(&args).await,
        Commands::Install(args) => install::execute(&args).await,
        Commands::List(args) => list::execute(&args),
        Commands::ListAvailable(args) => list_available::execute(&args).await,
        Commands::Use(args) => use_cmd::execute(&args).await,
        Commands::Run(args) => run_cmd::execute(&args),
        Commands::Uninstall(args) => uninstall::execute(&args).await,
        Commands::Update(args) => update::execute(&args).await,
        Commands::Repair => repair::execute().await,
        Commands::SelfUninstall(args) => self_uninstall::execute(&args).await,
    }
}
