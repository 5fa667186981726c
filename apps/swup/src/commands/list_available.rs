//! List-available command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup list-available                # Releases for this platform
//! swup list-available 5              # 5.x.y releases
//! swup list-available main-snapshot  # Main branch snapshots
//! swup list-available --format json  # Machine-readable output
//! ```

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::output::{VersionInfo, print_json};
use super::{OutputFormat, open_engine, parse_optional};
use crate::progress::format_bytes;

/// Arguments for the list-available command.
#[derive(Args)]
pub struct ListAvailableArgs {
    /// Only show toolchains matching this selector.
    pub selector: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailableInfo {
    version: VersionInfo,
    installed: bool,
    is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

#[derive(Serialize)]
struct AvailableList {
    platform: String,
    toolchains: Vec<AvailableInfo>,
}

/// Prints the toolchains the catalog offers for this platform, newest first.
///
/// # Errors
///
/// Returns an error if the selector is malformed or the catalog cannot be
/// fetched.
pub async fn execute(args: &ListAvailableArgs) -> Result<()> {
    let filter = parse_optional(args.selector.as_deref())?;
    let engine = open_engine()?;
    let available = engine.list_available(filter.as_ref()).await?;
    let platform = engine.platform().descriptor().to_string();

    if args.format == OutputFormat::Json {
        let toolchains = available
            .iter()
            .map(|toolchain| AvailableInfo {
                version: VersionInfo::from(&toolchain.version),
                installed: toolchain.installed,
                is_default: toolchain.active,
                size: toolchain.asset.size,
            })
            .collect();
        return print_json(&AvailableList {
            platform,
            toolchains,
        });
    }

    if available.is_empty() {
        println!("No toolchains available for {platform}.");
        return Ok(());
    }

    println!("Available toolchains for {platform}:");
    for toolchain in available {
        let status = match (toolchain.installed, toolchain.active) {
            (_, true) => " (installed, default)",
            (true, false) => " (installed)",
            (false, false) => "",
        };
        let size = toolchain
            .asset
            .size
            .map(|size| format!(" [{}]", format_bytes(size)))
            .unwrap_or_default();
        println!("  {}{size}{status}", toolchain.version);
    }

    Ok(())
}
