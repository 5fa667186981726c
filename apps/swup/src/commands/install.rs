//! Install command for the swup CLI.
//!
//! Resolves a selector against the release catalog and installs the newest
//! matching toolchain.
//!
//! ## Usage
//!
//! ```bash
//! swup install latest          # Newest release
//! swup install 5.10            # Newest 5.10.x release
//! swup install 5.10.1 --use    # Install and activate
//! swup install main-snapshot   # Newest main branch snapshot
//! ```

use anyhow::Result;
use clap::Args;
use swup_engine::parse_selector;

use super::open_engine;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Toolchain selector, e.g. "latest", "5.10", "5.10.1" or "main-snapshot".
    pub selector: String,

    /// Activate the toolchain once it is installed.
    #[arg(long = "use")]
    pub use_toolchain: bool,
}

/// Executes the install command.
///
/// # Process
///
/// 1. Parse the selector
/// 2. Resolve it against the catalog, skipping the download if the toolchain
///    is already installed
/// 3. Download, verify and extract the archive
/// 4. Activate it when requested or when nothing else is active
///
/// # Errors
///
/// Returns an error if the selector is malformed, nothing matches it, or the
/// download, verification or extraction fails.
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let selector = parse_selector(&args.selector)?;
    let engine = open_engine()?;

    let outcome = engine
        .resolve_and_install(&selector, args.use_toolchain)
        .await?;

    if outcome.already_installed {
        println!("Toolchain {} is already installed.", outcome.version);
    } else {
        println!("Installed toolchain {}.", outcome.version);
    }
    if outcome.activated {
        println!("Toolchain {} is now in use.", outcome.version);
    }
    if let Some(script) = outcome.post_install_script {
        println!();
        println!("The toolchain needs additional system packages. Review and run:");
        println!("  sh {}", script.display());
    }

    Ok(())
}
