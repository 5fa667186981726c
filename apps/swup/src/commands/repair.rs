//! Repair command for the swup CLI.
//!
//! Every mutating command repairs first; this runs the pass on its own and
//! prints what it found.

use anyhow::Result;

use super::open_engine;

/// Executes the repair command.
///
/// # Errors
///
/// Returns an error if swup is not initialized, another process holds the
/// lock, or the store cannot be cleaned. Orphaned and missing toolchain
/// directories are reported but do not fail the command.
pub async fn execute() -> Result<()> {
    let engine = open_engine()?;
    let report = engine.repair().await?;

    if report.is_clean() {
        println!("Nothing to repair.");
        return Ok(());
    }

    for path in report.removed_staging.iter().chain(&report.removed_trash) {
        println!("Removed leftover {}", path.display());
    }
    for version in &report.adopted {
        println!("Registered interrupted install of {version}");
    }
    for version in &report.abandoned {
        println!("Discarded interrupted install of {version}");
    }
    for version in &report.completed_uninstalls {
        println!("Finished interrupted uninstall of {version}");
    }
    if report.artifacts_resynced {
        println!("Rewrote activation link and environment scripts");
    }
    for problem in report.problems() {
        eprintln!("Warning: {problem}");
        if let Some(hint) = problem.remediation() {
            eprintln!("  {hint}");
        }
    }

    Ok(())
}
