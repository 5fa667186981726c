//! Directory layout for a swup installation.
//!
//! The layout is rooted at the home directory (platform default, or
//! `SWUP_HOME_DIR`). The toolchains and bin directories default to platform
//! locations, can be recorded in the configuration at `init`, and can be
//! overridden with `SWUP_TOOLCHAINS_DIR` and `SWUP_BIN_DIR`.
//!
//! ```text
//! <home>/
//!   config.json          # installed toolchains and the active selection
//!   settings.toml        # optional user settings
//!   .swup.lock           # advisory lock serializing mutating operations
//!   active -> <toolchains>/<dir>   # stable link to the active toolchain
//!   env.sh, env.fish     # environment scripts sourced by shell profiles
//!   cache/               # cached catalog documents
//!   downloads/           # partial and verified downloads
//!   post-install/        # generated post-install scripts
//! <toolchains>/
//!   5.10.1/              # one directory per installed toolchain
//!   .staging-5.10.1/     # extraction in progress (disposable)
//!   .trash-5.9.0/        # removal in progress (disposable)
//! <bin>/                 # the swup binary
//! ```

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Overrides the home directory.
pub const HOME_DIR_ENV: &str = "SWUP_HOME_DIR";

/// Overrides the binaries directory.
pub const BIN_DIR_ENV: &str = "SWUP_BIN_DIR";

/// Overrides the toolchains directory.
pub const TOOLCHAINS_DIR_ENV: &str = "SWUP_TOOLCHAINS_DIR";

/// Prefix of extraction staging entries in the toolchains directory.
pub const STAGING_PREFIX: &str = ".staging-";

/// Prefix of entries being removed from the toolchains directory.
pub const TRASH_PREFIX: &str = ".trash-";

const CONFIG_FILE: &str = "config.json";
const SETTINGS_FILE: &str = "settings.toml";
const LOCK_FILE: &str = ".swup.lock";
const ACTIVE_LINK: &str = "active";

/// Explicitly requested directories, from the environment or from `init`
/// options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathOverrides {
    pub home: Option<PathBuf>,
    pub bin: Option<PathBuf>,
    pub toolchains: Option<PathBuf>,
}

impl PathOverrides {
    /// Reads the override variables. Empty or whitespace-only values are
    /// treated as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            home: env_path(HOME_DIR_ENV),
            bin: env_path(BIN_DIR_ENV),
            toolchains: env_path(TOOLCHAINS_DIR_ENV),
        }
    }

    /// Field-wise preference for `self`, falling back to `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            home: self.home.or(other.home),
            bin: self.bin.or(other.bin),
            toolchains: self.toolchains.or(other.toolchains),
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolved directories of one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwupPaths {
    pub home: PathBuf,
    pub toolchains: PathBuf,
    pub bin: PathBuf,
}

impl SwupPaths {
    /// Standard layout with everything under `home`.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            toolchains: home.join("toolchains"),
            bin: home.join("bin"),
            home,
        }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.home.join(SETTINGS_FILE)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.home.join(LOCK_FILE)
    }

    /// The stable link that always points at the active toolchain.
    #[must_use]
    pub fn active_link(&self) -> PathBuf {
        self.home.join(ACTIVE_LINK)
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.home.join("downloads")
    }

    #[must_use]
    pub fn post_install_dir(&self) -> PathBuf {
        self.home.join("post-install")
    }

    /// Where an in-flight download of `file_name` is written.
    #[must_use]
    pub fn partial_download(&self, file_name: &str) -> PathBuf {
        self.downloads_dir().join(format!("{file_name}.part"))
    }

    /// Where a verified download of `file_name` waits for extraction.
    #[must_use]
    pub fn verified_download(&self, file_name: &str) -> PathBuf {
        self.downloads_dir().join(file_name)
    }

    #[must_use]
    pub fn toolchain_dir(&self, dir_name: &str) -> PathBuf {
        self.toolchains.join(dir_name)
    }

    #[must_use]
    pub fn trash_dir(&self, dir_name: &str) -> PathBuf {
        self.toolchains.join(format!("{TRASH_PREFIX}{dir_name}"))
    }

    /// Creates the home, toolchains, bin and downloads directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.home,
            &self.toolchains,
            &self.bin,
            &self.downloads_dir(),
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                EngineError::io(format!("Failed to create directory: {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Resolves the layout: explicit overrides first, then directories recorded in
/// an existing configuration, then platform defaults.
pub(crate) fn resolve_paths(
    overrides: &PathOverrides,
    default_home: impl FnOnce() -> Result<PathBuf>,
    default_toolchains: impl FnOnce(&Path) -> Result<PathBuf>,
    recorded: impl FnOnce(&Path) -> Option<(PathBuf, PathBuf)>,
) -> Result<SwupPaths> {
    let home = match &overrides.home {
        Some(home) => home.clone(),
        None => default_home()?,
    };
    let (recorded_toolchains, recorded_bin) = match recorded(&home) {
        Some((toolchains, bin)) => (Some(toolchains), Some(bin)),
        None => (None, None),
    };
    let toolchains = match overrides.toolchains.clone().or(recorded_toolchains) {
        Some(dir) => dir,
        None => default_toolchains(&home)?,
    };
    let bin = overrides
        .bin
        .clone()
        .or(recorded_bin)
        .unwrap_or_else(|| home.join("bin"));
    Ok(SwupPaths {
        home,
        toolchains,
        bin,
    })
}
