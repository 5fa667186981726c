//! List command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup list                 # All installed toolchains
//! swup list 5.10            # Installed 5.10.x releases
//! swup list --format json   # Machine-readable output
//! ```
//!
//! The toolchain in effect for the current directory is marked `(in use)`;
//! the global default is marked `(default)`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::output::{VersionInfo, print_json};
use super::{OutputFormat, current_dir, open_engine, parse_optional};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Only show toolchains matching this selector.
    pub selector: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstalledInfo {
    version: VersionInfo,
    path: PathBuf,
    in_use: bool,
    is_default: bool,
}

#[derive(Serialize)]
struct InstalledList {
    toolchains: Vec<InstalledInfo>,
}

/// Prints installed toolchains, newest first.
///
/// # Errors
///
/// Returns an error if the selector is malformed or swup is not initialized.
pub fn execute(args: &ListArgs) -> Result<()> {
    let filter = parse_optional(args.selector.as_deref())?;
    let engine = open_engine()?;
    let toolchains = engine.list_installed(filter.as_ref())?;

    let in_use = match engine.selected(&current_dir()?, false) {
        Ok(selected) => selected.map(|s| s.toolchain.version),
        Err(e) => {
            tracing::warn!("{e}");
            engine.current()?.map(|t| t.version)
        }
    };
    let infos: Vec<InstalledInfo> = toolchains
        .into_iter()
        .map(|listed| InstalledInfo {
            version: VersionInfo::from(&listed.toolchain.version),
            in_use: in_use.as_ref() == Some(&listed.toolchain.version),
            is_default: listed.active,
            path: listed.toolchain.path,
        })
        .collect();

    if args.format == OutputFormat::Json {
        return print_json(&InstalledList { toolchains: infos });
    }

    if infos.is_empty() {
        match filter {
            Some(selector) => println!("No installed toolchains match {selector}."),
            None => println!("No toolchains installed. Run 'swup install latest' to install one."),
        }
        return Ok(());
    }

    println!("Installed toolchains:");
    for info in infos {
        let mut markers = String::new();
        if info.in_use {
            markers.push_str(" (in use)");
        }
        if info.is_default {
            markers.push_str(" (default)");
        }
        println!("  {}{markers}", info.version.name);
    }

    Ok(())
}
