//! Per-project toolchain pins.
//!
//! A `.swift-version` file holds one selector. Commands run inside the
//! directory holding it, or any directory below, use the newest installed
//! toolchain matching that selector instead of the global default.

use std::path::{Path, PathBuf};

use crate::activation::write_atomically;
use crate::error::{EngineError, Result};
use crate::version::{Selector, ToolchainVersion, parse_selector};

pub const VERSION_FILE_NAME: &str = ".swift-version";

/// The nearest version file in `start` or one of its ancestors.
#[must_use]
pub fn find(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(VERSION_FILE_NAME))
        .find(|file| file.is_file())
}

/// Where a new pin goes when none exists: the root of the enclosing git
/// checkout.
#[must_use]
pub fn new_location(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(|dir| dir.join(VERSION_FILE_NAME))
}

/// Reads the selector pinned in `path`.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `InvalidVersionFile` if it is
/// empty, holds more than one line, or the line is not a selector.
pub fn read(path: &Path) -> Result<Selector> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::io(format!("Failed to read {}", path.display()), e))?;
    let content = content.trim();
    if content.is_empty() {
        return Err(EngineError::invalid_version_file(path, "the file is empty"));
    }
    if content.lines().count() > 1 {
        return Err(EngineError::invalid_version_file(
            path,
            "the file must hold a single selector",
        ));
    }
    parse_selector(content).map_err(|e| EngineError::invalid_version_file(path, e.to_string()))
}

/// Pins `version` in `path`, replacing what was there.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written.
pub fn write(path: &Path, version: &ToolchainVersion) -> Result<()> {
    write_atomically(path, &format!("{version}\n"))
}
