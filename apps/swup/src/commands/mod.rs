//! Subcommand implementations.
//!
//! Each command parses its arguments, opens the engine and prints the
//! outcome. All state changes go through [`swup_engine::Engine`].

pub mod init;
pub mod install;
pub mod list;
pub mod list_available;
pub mod output;
pub mod repair;
pub mod run;
pub mod self_uninstall;
pub mod uninstall;
pub mod update;
pub mod use_cmd;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;
use swup_engine::{Engine, HttpTransport, PathOverrides, Selector, parse_selector};

use crate::errors::SwupError;
use crate::progress::stdout_progress;

pub(crate) type SwupEngine = Engine<HttpTransport>;

/// Opens the engine for the installation selected by the environment.
pub(crate) fn open_engine() -> Result<SwupEngine> {
    open_engine_with(PathOverrides::default())
}

pub(crate) fn open_engine_with(overrides: PathOverrides) -> Result<SwupEngine> {
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let engine = Engine::open(transport, overrides)?;
    Ok(engine.with_progress(stdout_progress()))
}

/// Output format of the reporting commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

/// The directory `.swift-version` lookups start from.
pub(crate) fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to read the current directory")
}

/// Parses an optional selector argument.
pub(crate) fn parse_optional(input: Option<&str>) -> Result<Option<Selector>> {
    Ok(input.map(parse_selector).transpose()?)
}

/// Asks a yes/no question on stdin. Anything but `y`/`yes` declines.
///
/// # Errors
///
/// Returns [`SwupError::Aborted`] when the user declines.
pub(crate) fn confirm(prompt: &str, assume_yes: bool) -> Result<()> {
    if assume_yes {
        return Ok(());
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().context("Failed to write prompt")?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    if is_yes(&answer) {
        Ok(())
    } else {
        Err(SwupError::Aborted.into())
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
