//! Use command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup use                      # Print the toolchain in effect here
//! swup use 5.10                 # Use the newest installed 5.10.x release
//! swup use 5.9.2                # Use an exact version
//! swup use -g 5.10              # Change the global default only
//! swup use --format json        # Machine-readable output
//! ```
//!
//! ## Behavior
//!
//! Inside a project with a `.swift-version` file, or any git checkout, the
//! selection is pinned in that file. Elsewhere, or with `--global-default`,
//! the global default changes.

use anyhow::Result;
use clap::Args;
use swup_engine::ToolchainSource;

use super::output::{InUseInfo, SourceInfo, VersionInfo, print_json};
use super::{OutputFormat, current_dir, open_engine, parse_optional};
use crate::errors::SwupError;

/// Arguments for the use command.
#[derive(Args)]
pub struct UseArgs {
    /// Installed toolchain to use. Omit to print the one in effect.
    pub selector: Option<String>,

    /// Ignore `.swift-version` files and work on the global default.
    #[arg(short = 'g', long)]
    pub global_default: bool,

    /// Print only the directory of the toolchain in effect.
    #[arg(long, conflicts_with = "selector")]
    pub print_location: bool,

    /// Output format when printing the toolchain in effect.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, conflicts_with = "selector")]
    pub format: OutputFormat,
}

/// Executes the use command.
///
/// # Errors
///
/// Returns an error if no installed toolchain matches the selector, if a
/// `.swift-version` file is unusable, or if nothing is in effect when
/// printing.
pub async fn execute(args: &UseArgs) -> Result<()> {
    let selector = parse_optional(args.selector.as_deref())?;
    let engine = open_engine()?;
    let cwd = current_dir()?;

    let Some(selector) = selector else {
        let Some(selected) = engine.selected(&cwd, args.global_default)? else {
            return Err(SwupError::NothingActive.into());
        };
        let toolchain = &selected.toolchain;
        if args.print_location {
            println!("{}", toolchain.path.display());
        } else if args.format == OutputFormat::Json {
            print_json(&InUseInfo {
                version: VersionInfo::from(&toolchain.version),
                path: &toolchain.path,
                source: SourceInfo::from(&selected.source),
            })?;
        } else {
            match &selected.source {
                ToolchainSource::GlobalDefault => println!("{} (in use)", toolchain.version),
                ToolchainSource::VersionFile(file) => {
                    println!("{} (in use, pinned by {})", toolchain.version, file.display());
                }
            }
        }
        return Ok(());
    };

    let outcome = engine
        .use_toolchain(&selector, &cwd, args.global_default)
        .await?;
    let version = outcome.version;
    match (&outcome.target, outcome.previous) {
        (ToolchainSource::GlobalDefault, Some(previous)) if previous == version => {
            println!("Toolchain {version} is already in use.");
        }
        (ToolchainSource::GlobalDefault, Some(previous)) => {
            println!("Switched from {previous} to {version}.");
        }
        (ToolchainSource::GlobalDefault, None) => println!("Toolchain {version} is now in use."),
        (ToolchainSource::VersionFile(file), Some(previous)) if previous != version => {
            println!("Pinned {version} in {} (was {previous}).", file.display());
        }
        (ToolchainSource::VersionFile(file), _) => {
            println!("Pinned {version} in {}.", file.display());
        }
    }

    Ok(())
}
