//! Activation artifacts.
//!
//! The active toolchain is observed through files under the home directory:
//!
//! - `<home>/active`, a symlink to the active toolchain directory;
//! - `<home>/env.sh` and `<home>/env.fish`, sourced from shell profiles. They
//!   put `<home>/active/usr/bin` and the bin directory on `PATH`, so switching
//!   toolchains does not require re-sourcing.
//!
//! Each artifact is replaced with a single rename, so a reader sees either the
//! old or the new state.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::paths::{BIN_DIR_ENV, HOME_DIR_ENV, SwupPaths};
use crate::version::ToolchainVersion;

/// Variable naming the active toolchain in generated environment scripts.
pub const ACTIVE_TOOLCHAIN_ENV: &str = "SWUP_ACTIVE_TOOLCHAIN";

const ENV_SH: &str = "env.sh";
const ENV_FISH: &str = "env.fish";

/// The toolchain the artifacts should point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveToolchain {
    pub version: ToolchainVersion,
    pub dir: PathBuf,
}

/// Rewrites the stable link and the environment scripts.
///
/// `active_bin` is the bin directory reached through the stable link, e.g.
/// `<home>/active/usr/bin`.
///
/// # Errors
///
/// Returns `Io` if an artifact cannot be replaced.
pub fn sync_artifacts(
    paths: &SwupPaths,
    active: Option<&ActiveToolchain>,
    active_bin: &Path,
) -> Result<()> {
    let link = paths.active_link();
    match active {
        Some(toolchain) => replace_link(&link, &toolchain.dir)?,
        None => remove_link(&link)?,
    }

    let version = active.map(|t| t.version);
    write_atomically(
        &paths.home.join(ENV_SH),
        &sh_script(paths, version.as_ref(), active_bin),
    )?;
    write_atomically(
        &paths.home.join(ENV_FISH),
        &fish_script(paths, version.as_ref(), active_bin),
    )?;

    match version {
        Some(v) => tracing::debug!("activation artifacts point at {v}"),
        None => tracing::debug!("activation artifacts cleared"),
    }
    Ok(())
}

/// Where the stable link currently points, if it exists.
#[must_use]
pub fn link_target(paths: &SwupPaths) -> Option<PathBuf> {
    std::fs::read_link(paths.active_link()).ok()
}

/// The generated POSIX shell script.
#[must_use]
pub fn env_sh_path(paths: &SwupPaths) -> PathBuf {
    paths.home.join(ENV_SH)
}

/// The generated fish script.
#[must_use]
pub fn env_fish_path(paths: &SwupPaths) -> PathBuf {
    paths.home.join(ENV_FISH)
}

fn sh_script(paths: &SwupPaths, active: Option<&ToolchainVersion>, active_bin: &Path) -> String {
    let active_bin = quote_sh(&active_bin.to_string_lossy());
    let bin = quote_sh(&paths.bin.to_string_lossy());
    let active_line = match active {
        Some(v) => format!("export {ACTIVE_TOOLCHAIN_ENV}=\"{v}\""),
        None => format!("unset {ACTIVE_TOOLCHAIN_ENV}"),
    };
    format!(
        "# Generated by swup. Do not edit.\n\
         export {HOME_DIR_ENV}=\"{home}\"\n\
         export {BIN_DIR_ENV}=\"{bin}\"\n\
         {active_line}\n\
         case \":$PATH:\" in\n\
         \x20 *\":{active_bin}:\"*) ;;\n\
         \x20 *) export PATH=\"{active_bin}:{bin}:$PATH\" ;;\n\
         esac\n",
        home = quote_sh(&paths.home.to_string_lossy()),
    )
}

fn fish_script(paths: &SwupPaths, active: Option<&ToolchainVersion>, active_bin: &Path) -> String {
    let active_bin = quote_fish(&active_bin.to_string_lossy());
    let bin = quote_fish(&paths.bin.to_string_lossy());
    let active_line = match active {
        Some(v) => format!("set -gx {ACTIVE_TOOLCHAIN_ENV} \"{v}\""),
        None => format!("set -e {ACTIVE_TOOLCHAIN_ENV}"),
    };
    format!(
        "# Generated by swup. Do not edit.\n\
         set -gx {HOME_DIR_ENV} \"{home}\"\n\
         set -gx {BIN_DIR_ENV} \"{bin}\"\n\
         {active_line}\n\
         if not contains \"{active_bin}\" $PATH\n\
         \x20   set -gx PATH \"{active_bin}\" \"{bin}\" $PATH\n\
         end\n",
        home = quote_fish(&paths.home.to_string_lossy()),
    )
}

/// Escapes a value for a double-quoted POSIX shell string.
fn quote_sh(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes a value for a double-quoted fish string.
fn quote_fish(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Replaces `path` with `contents` through a temporary file in the same
/// directory.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written or renamed.
pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let failed = |e| EngineError::io(format!("Failed to write {}", path.display()), e);

    std::fs::create_dir_all(dir).map_err(failed)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    temp.write_all(contents.as_bytes()).map_err(failed)?;
    temp.as_file().sync_all().map_err(failed)?;
    temp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn replace_link(link: &Path, target: &Path) -> Result<()> {
    if std::fs::read_link(link).is_ok_and(|current| current == target) {
        return Ok(());
    }
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = link.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    let _ = std::fs::remove_file(&temp);

    std::os::unix::fs::symlink(target, &temp).map_err(|e| {
        EngineError::io(
            format!(
                "Failed to create symlink from {} to {}",
                temp.display(),
                target.display()
            ),
            e,
        )
    })?;
    std::fs::rename(&temp, link).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        EngineError::io(format!("Failed to replace {}", link.display()), e)
    })
}

#[cfg(not(unix))]
fn replace_link(link: &Path, _target: &Path) -> Result<()> {
    Err(EngineError::unsupported_platform(format!(
        "cannot create {} without symlink support",
        link.display()
    )))
}

fn remove_link(link: &Path) -> Result<()> {
    // symlink_metadata sees dangling links too.
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)
            .map_err(|e| EngineError::io(format!("Failed to remove symlink: {}", link.display()), e))?;
    }
    Ok(())
}
