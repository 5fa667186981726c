//! Host platform abstraction.
//!
//! Each supported OS family implements [`Platform`]. The engine picks one
//! implementation at startup ([`detect_current_platform`], or
//! [`platform_for`] when a descriptor was recorded at `init`) and never
//! branches on OS identity afterwards.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` and `aarch64`: Ubuntu 18.04 to 24.04, Debian 12, Fedora 39,
//!   RHEL-like 9 (`ubi9`) and Amazon Linux 2, installed from `.tar.gz`
//! - macOS (universal): installed from `.pkg`

pub mod archive;
mod linux;
mod macos;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

pub use linux::Linux;
pub use macos::MacOs;

use crate::error::{EngineError, Result};
use crate::paths::STAGING_PREFIX;
use crate::version::{Architecture, OsFamily, PlatformDescriptor, ToolchainVersion};

/// How [`Platform::run_program`] runs a child process.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Discard the child's stdout and stderr.
    pub quiet: bool,
}

impl RunOptions {
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            env: Vec::new(),
            quiet: true,
        }
    }
}

/// Capabilities that differ between host OS families.
pub trait Platform: Send + Sync + fmt::Debug {
    /// Identity of the host, used to pick downloadable assets.
    fn descriptor(&self) -> &PlatformDescriptor;

    /// Download server subdirectory for this platform, e.g. `ubuntu2204-aarch64`.
    fn asset_directory(&self) -> String;

    /// File name of the downloadable archive for `version`.
    fn asset_file_name(&self, version: &ToolchainVersion) -> String;

    /// Platform segment of the snapshot catalog URL.
    fn snapshot_catalog_name(&self) -> String {
        self.descriptor().name.clone()
    }

    /// Key of the snapshot catalog listing this platform's builds.
    fn snapshot_arch_key(&self) -> &'static str {
        self.descriptor().arch.as_str()
    }

    /// Whether releases missing a platform entry in the catalog still have an
    /// asset for this platform.
    fn lists_every_release(&self) -> bool {
        false
    }

    /// Whether the native installer verifies package signatures, making a
    /// detached signature unnecessary.
    fn verifies_packages_natively(&self) -> bool {
        false
    }

    /// Name of the directory in the toolchains store holding `version`.
    fn toolchain_dir_name(&self, version: &ToolchainVersion) -> String;

    /// Inverse of [`Platform::toolchain_dir_name`]; `None` for entries that do
    /// not name a toolchain.
    fn version_from_dir_name(&self, name: &str) -> Option<ToolchainVersion>;

    /// Directory holding the executables of an installed toolchain.
    fn toolchain_bin_dir(&self, toolchain_dir: &Path) -> PathBuf {
        toolchain_dir.join("usr").join("bin")
    }

    /// Default swup home directory.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if the user's directories cannot be
    /// determined.
    fn default_home_dir(&self) -> Result<PathBuf>;

    /// Default toolchains directory for a given home directory.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if the user's directories cannot be
    /// determined.
    fn default_toolchains_dir(&self, home: &Path) -> Result<PathBuf>;

    /// Unpacks a verified download into `destination`.
    ///
    /// The contents are extracted into a sibling staging directory and
    /// promoted with a single rename. No partial directory remains on failure.
    ///
    /// # Errors
    ///
    /// Returns `ExtractionFailed` if the archive cannot be unpacked or the
    /// destination is a non-empty directory.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;

    /// Runs `program` synchronously.
    ///
    /// # Errors
    ///
    /// Returns `SpawnFailed` if the program cannot be started.
    fn run_program(&self, program: &str, args: &[&str], options: &RunOptions) -> Result<ExitStatus> {
        let mut command = Command::new(program);
        command.args(args);
        command.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if options.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        tracing::debug!(program, ?args, "running program");
        command.status().map_err(|source| EngineError::SpawnFailed {
            program: program.to_string(),
            source,
        })
    }

    /// Checks what the host still needs for `version` to work and writes a
    /// script into `script_dir` that provides it.
    ///
    /// Returns `None` when nothing is missing.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the script cannot be written.
    fn post_install_hook(
        &self,
        version: &ToolchainVersion,
        script_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}

/// Detects the platform this process runs on.
///
/// # Errors
///
/// Returns `UnsupportedPlatform` for unknown operating systems, architectures
/// or Linux distributions.
pub fn detect_current_platform() -> Result<Arc<dyn Platform>> {
    let arch = Architecture::current().ok_or_else(|| {
        EngineError::unsupported_platform(format!(
            "{} on {}; supported architectures are x86_64 and aarch64",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
    })?;

    #[cfg(target_os = "linux")]
    {
        return Ok(Arc::new(Linux::detect(arch)?));
    }

    #[cfg(target_os = "macos")]
    {
        return Ok(Arc::new(MacOs::new(arch)));
    }

    #[allow(unreachable_code)]
    Err(EngineError::unsupported_platform(format!(
        "{} on {arch}; supported systems are Linux and macOS",
        std::env::consts::OS
    )))
}

/// Rebuilds the platform recorded in a configuration.
///
/// # Errors
///
/// Returns `UnsupportedPlatform` if the descriptor names an unknown Linux
/// target.
pub fn platform_for(descriptor: &PlatformDescriptor) -> Result<Arc<dyn Platform>> {
    match descriptor.os {
        OsFamily::Linux => Ok(Arc::new(Linux::from_descriptor(descriptor)?)),
        OsFamily::MacOs => Ok(Arc::new(MacOs::new(descriptor.arch))),
    }
}

/// Sibling staging directory for `destination`.
#[must_use]
pub fn staging_dir_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("{STAGING_PREFIX}{name}"))
}

/// Runs `unpack` into a fresh staging directory next to `destination`, then
/// renames the staging directory into place.
///
/// A pre-existing empty `destination` is replaced; a non-empty one is an
/// error. The staging directory is removed on failure.
pub(crate) fn stage_and_promote(
    archive: &Path,
    destination: &Path,
    unpack: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    if destination.exists() {
        let empty = std::fs::read_dir(destination)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            return Err(EngineError::extraction_failed(
                archive,
                format!("destination {} already exists", destination.display()),
            ));
        }
        std::fs::remove_dir(destination).map_err(|e| {
            EngineError::io(
                format!("Failed to remove directory: {}", destination.display()),
                e,
            )
        })?;
    }

    let staging = staging_dir_for(destination);
    if staging.exists() {
        tracing::debug!(path = %staging.display(), "removing stale staging directory");
        std::fs::remove_dir_all(&staging).map_err(|e| {
            EngineError::io(
                format!("Failed to remove directory: {}", staging.display()),
                e,
            )
        })?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| {
        EngineError::io(
            format!("Failed to create directory: {}", staging.display()),
            e,
        )
    })?;

    let promoted = unpack(&staging).and_then(|()| {
        std::fs::rename(&staging, destination).map_err(|e| {
            EngineError::io(
                format!(
                    "Failed to rename {} to {}",
                    staging.display(),
                    destination.display()
                ),
                e,
            )
        })
    });

    if let Err(e) = promoted {
        if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
            tracing::warn!(path = %staging.display(), "failed to remove staging directory: {cleanup}");
        }
        return Err(e);
    }
    Ok(())
}

/// Writes an executable shell script `name` into `script_dir`.
pub(crate) fn write_script(script_dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(script_dir).map_err(|e| {
        EngineError::io(
            format!("Failed to create directory: {}", script_dir.display()),
            e,
        )
    })?;
    let path = script_dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).map_err(|e| {
        EngineError::io(format!("Failed to write script: {}", path.display()), e)
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            EngineError::io(format!("Failed to set permissions: {}", path.display()), e)
        })?;
    }

    Ok(path)
}
