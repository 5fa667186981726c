//! Self-uninstall command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup self-uninstall        # Asks for confirmation
//! swup self-uninstall -y
//! ```
//!
//! Removes the swup home directory, the `swup` binary in the bin directory
//! and the lines `swup init` added to shell profiles. Toolchains stored
//! outside the home directory stay where they are.

use anyhow::Result;
use clap::Args;
use swup_engine::activation::{env_fish_path, env_sh_path};

use super::{confirm, open_engine};
use crate::shell::remove_from_profiles;

/// Arguments for the self-uninstall command.
#[derive(Args)]
pub struct SelfUninstallArgs {
    /// Do not ask for confirmation.
    #[arg(short = 'y', long)]
    pub assume_yes: bool,
}

/// Executes the self-uninstall command.
///
/// # Errors
///
/// Returns an error if swup is not initialized, the user declines, or the
/// home directory or a shell profile cannot be changed.
pub async fn execute(args: &SelfUninstallArgs) -> Result<()> {
    let engine = open_engine()?;
    let paths = engine.paths().clone();
    let env_sh = env_sh_path(&paths);
    let env_fish = env_fish_path(&paths);

    println!("swup will be removed from {}.", paths.home.display());
    if paths.toolchains.starts_with(&paths.home) {
        println!("Installed toolchains are removed with it.");
    }
    confirm("Proceed?", args.assume_yes)?;

    let outcome = engine.self_uninstall().await?;
    println!("Removed {}.", outcome.removed_home.display());
    if let Some(toolchains) = &outcome.kept_toolchains {
        println!("Toolchains in {} were left in place.", toolchains.display());
    }

    match dirs::home_dir() {
        Some(user_home) => {
            for profile in remove_from_profiles(&user_home, &env_sh, &env_fish)? {
                println!("Updated {}", profile.display());
            }
        }
        None => tracing::warn!("home directory unknown; shell profiles left unchanged"),
    }

    Ok(())
}
