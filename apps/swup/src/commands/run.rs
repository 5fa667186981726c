//! Run command for the swup CLI.
//!
//! ## Usage
//!
//! ```bash
//! swup run swift build                 # Toolchain in effect here
//! swup run swift build +5.10           # Newest installed 5.10.x release
//! swup run ./script.sh ++verbose       # Passes `+verbose` through
//! swup run echo ++ +literal +args      # Nothing after `++` is rewritten
//! ```
//!
//! The command runs with the toolchain's bin directory first on `PATH` and
//! swup exits with the command's exit code.

use anyhow::{Result, bail};
use clap::Args;
use swup_engine::{Selector, parse_selector};

use super::{current_dir, open_engine};
use crate::errors::SwupError;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// The command and its arguments. `+<selector>` picks the toolchain,
    /// `++arg` passes `+arg` and a lone `++` stops this rewriting.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Executes the run command.
///
/// # Errors
///
/// Returns an error if no toolchain is selected, the command cannot be
/// started, or [`SwupError::CommandFailed`] with the command's exit code.
pub fn execute(args: &RunArgs) -> Result<()> {
    let (command, selector) = extract_proxy_arguments(&args.command)?;
    let engine = open_engine()?;

    let toolchain = match selector {
        Some(selector) => engine.find_installed(&selector)?,
        None => match engine.selected(&current_dir()?, false)? {
            Some(selected) => selected.toolchain,
            None => return Err(SwupError::NothingActive.into()),
        },
    };

    let status = engine.run(&toolchain, &command)?;
    if status.success() {
        Ok(())
    } else {
        Err(SwupError::CommandFailed {
            code: status.code().unwrap_or(1),
        }
        .into())
    }
}

/// Splits the `+<selector>` argument off `args`.
///
/// `++arg` becomes `+arg`. After a lone `++` every argument is passed
/// through as written.
fn extract_proxy_arguments(args: &[String]) -> Result<(Vec<String>, Option<Selector>)> {
    let mut command = Vec::with_capacity(args.len());
    let mut selector = None;
    let mut escaping = true;

    for arg in args {
        if !escaping {
            command.push(arg.clone());
        } else if arg == "++" {
            escaping = false;
        } else if let Some(rest) = arg.strip_prefix("++") {
            command.push(format!("+{rest}"));
        } else if let Some(rest) = arg.strip_prefix('+') {
            selector = Some(parse_selector(rest)?);
        } else {
            command.push(arg.clone());
        }
    }

    if command.is_empty() {
        bail!("no command to run; pass the program after `swup run`");
    }
    Ok((command, selector))
}
