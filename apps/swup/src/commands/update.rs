//! Update command for the swup CLI.
//!
//! Replaces an installed toolchain with the newest version on its line:
//! `5.9.0` moves to the newest `5.9.x`, a `5.10` branch snapshot to the
//! newest snapshot of that branch.
//!
//! ## Usage
//!
//! ```bash
//! swup update           # Update the active toolchain
//! swup update 5.9 -y    # Update the installed 5.9.x release
//! ```

use anyhow::Result;
use clap::Args;

use super::{confirm, open_engine, parse_optional};

/// Arguments for the update command.
#[derive(Args)]
pub struct UpdateArgs {
    /// Installed toolchain to update. Defaults to the active one.
    pub selector: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short = 'y', long)]
    pub assume_yes: bool,
}

/// Executes the update command.
///
/// # Errors
///
/// Returns an error if nothing installed matches, the catalog cannot be
/// fetched, the user declines, or the install fails. A failed install leaves
/// the old toolchain in place.
pub async fn execute(args: &UpdateArgs) -> Result<()> {
    let selector = parse_optional(args.selector.as_deref())?;
    let engine = open_engine()?;

    let target = match &selector {
        Some(selector) => engine
            .list_installed(Some(selector))?
            .into_iter()
            .next()
            .map(|listed| listed.toolchain.version),
        None => engine.current()?.map(|t| t.version),
    };
    if let Some(version) = target {
        confirm(
            &format!("Replace {version} with the newest version on its line, if newer?"),
            args.assume_yes,
        )?;
    }

    let outcome = engine.update(selector.as_ref()).await?;
    match outcome.installed {
        None => println!("Toolchain {} is up to date.", outcome.previous),
        Some(installed) => {
            println!("Updated {} to {}.", outcome.previous, installed.version);
            if installed.activated {
                println!("Toolchain {} is now in use.", installed.version);
            }
        }
    }

    Ok(())
}
