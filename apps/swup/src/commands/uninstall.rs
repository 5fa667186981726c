//! Uninstall command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup uninstall 5.9.2             # Remove one toolchain, asking first
//! swup uninstall 5.9 -y            # Remove every installed 5.9.x release
//! swup uninstall 5.9.2 --use 5.10.1
//! ```

use anyhow::{Context, Result};
use clap::Args;
use swup_engine::{EngineError, ToolchainVersion, parse_selector};

use super::{confirm, open_engine};

/// Arguments for the uninstall command.
#[derive(Args)]
pub struct UninstallArgs {
    /// Installed toolchain(s) to remove.
    pub selector: String,

    /// Activate this installed version if the active toolchain is removed.
    #[arg(long = "use", value_name = "VERSION")]
    pub use_version: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short = 'y', long)]
    pub assume_yes: bool,
}

/// Executes the uninstall command.
///
/// # Process
///
/// 1. Find the installed toolchains matching the selector
/// 2. Ask for confirmation unless `--assume-yes` is given
/// 3. Remove them one by one, newest first
///
/// Removing the active toolchain leaves nothing active unless `--use` names
/// a replacement.
///
/// # Errors
///
/// Returns an error if nothing installed matches, the user declines, or a
/// removal fails.
pub async fn execute(args: &UninstallArgs) -> Result<()> {
    let selector = parse_selector(&args.selector)?;
    let reassign = args
        .use_version
        .as_deref()
        .map(str::parse::<ToolchainVersion>)
        .transpose()
        .context("--use expects an exact version")?;
    let engine = open_engine()?;

    let targets = engine.list_installed(Some(&selector))?;
    if targets.is_empty() {
        return Err(EngineError::not_installed(selector.to_string()).into());
    }

    println!("The following toolchains will be removed:");
    for listed in &targets {
        let marker = if listed.active { " (in use)" } else { "" };
        println!("  {}{marker}", listed.toolchain.version);
    }
    confirm("Proceed?", args.assume_yes)?;

    for listed in targets {
        let version = listed.toolchain.version;
        let reassign = reassign.filter(|next| *next != version);
        let outcome = engine.uninstall(&version, reassign).await?;
        println!("Removed toolchain {version}.");
        if outcome.was_active {
            match outcome.active {
                Some(active) => println!("Toolchain {active} is now in use."),
                None => println!("No toolchain is in use. Run 'swup use <version>' to pick one."),
            }
        }
    }

    Ok(())
}
