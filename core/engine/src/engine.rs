//! Toolchain installation and activation engine.
//!
//! [`Engine`] drives every operation that touches the toolchain store. An
//! install moves through these states, each logged at `info`:
//!
//! ```text
//! Requested -> Downloading -> Verifying -> Extracting -> Registered -> Activated
//! ```
//!
//! Mutating operations hold the store lock for their whole duration and run
//! the repair pass first. The activation pointer is persisted before the
//! artifacts that mirror it are rewritten.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::activation::{self, ACTIVE_TOOLCHAIN_ENV, env_fish_path, env_sh_path};
use crate::catalog::{CatalogClient, ReleaseAsset};
use crate::config::{
    ActivationPointer, Config, ConfigStore, InstalledToolchain, PendingOperation,
};
use crate::download::{Downloader, ProgressCallback};
use crate::error::{EngineError, Result};
use crate::lock::StoreLock;
use crate::paths::{PathOverrides, SwupPaths, resolve_paths};
use crate::platform::{Platform, RunOptions, detect_current_platform, platform_for};
use crate::repair::{self, RepairReport};
use crate::settings::Settings;
use crate::transport::Transport;
use crate::verify::TrustedKeys;
use crate::version::{Selector, ToolchainVersion, resolve, sort_newest_first};
use crate::version_file;

/// Result of [`Engine::resolve_and_install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: ToolchainVersion,
    /// The version was installed before this call; nothing was downloaded.
    pub already_installed: bool,
    /// The version is active after this call.
    pub activated: bool,
    /// Script installing missing system dependencies, if any are missing.
    pub post_install_script: Option<PathBuf>,
}

/// One entry of [`Engine::list_available`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableToolchain {
    pub version: ToolchainVersion,
    pub asset: ReleaseAsset,
    pub installed: bool,
    pub active: bool,
}

/// One entry of [`Engine::list_installed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedToolchain {
    pub toolchain: InstalledToolchain,
    pub active: bool,
}

/// Result of [`Engine::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub version: ToolchainVersion,
    pub previous: Option<ToolchainVersion>,
}

/// Where the toolchain in effect for a directory comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainSource {
    /// A `.swift-version` file in the directory or an ancestor.
    VersionFile(PathBuf),
    /// The global default recorded in the configuration.
    GlobalDefault,
}

/// Result of [`Engine::selected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedToolchain {
    pub toolchain: InstalledToolchain,
    pub source: ToolchainSource,
}

/// Result of [`Engine::use_toolchain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseOutcome {
    pub version: ToolchainVersion,
    /// The toolchain in effect before, if any.
    pub previous: Option<ToolchainVersion>,
    /// What was changed: a version file or the global default.
    pub target: ToolchainSource,
}

/// Result of [`Engine::self_uninstall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfUninstallOutcome {
    pub removed_home: PathBuf,
    /// Set when the toolchains live outside the home directory and still
    /// hold installed toolchains, which are left in place.
    pub kept_toolchains: Option<PathBuf>,
}

/// Result of [`Engine::uninstall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UninstallOutcome {
    pub version: ToolchainVersion,
    pub was_active: bool,
    /// The active toolchain afterwards.
    pub active: Option<ToolchainVersion>,
}

/// Result of [`Engine::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub previous: ToolchainVersion,
    /// `None` when `previous` is already the newest on its line.
    pub installed: Option<InstallOutcome>,
}

/// Options of [`Engine::init`].
///
/// `assume_yes` and `no_modify_profile` are honoured by the caller, which owns
/// prompting and shell profiles. The directory options take effect when the
/// engine is opened with [`InitOptions::path_overrides`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub assume_yes: bool,
    pub skip_install: bool,
    pub no_modify_profile: bool,
    pub home_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub toolchains_dir: Option<PathBuf>,
    /// Replace an existing installation, removing its toolchains.
    pub overwrite: bool,
}

impl InitOptions {
    #[must_use]
    pub fn path_overrides(&self) -> PathOverrides {
        PathOverrides {
            home: self.home_dir.clone(),
            bin: self.bin_dir.clone(),
            toolchains: self.toolchains_dir.clone(),
        }
    }
}

/// Result of [`Engine::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// A new configuration was written.
    pub created: bool,
    pub paths: SwupPaths,
    pub env_sh: PathBuf,
    pub env_fish: PathBuf,
    pub installed: Option<InstallOutcome>,
}

/// The toolchain manager.
pub struct Engine<T> {
    paths: SwupPaths,
    settings: Settings,
    platform: Arc<dyn Platform>,
    transport: Arc<T>,
    trusted_keys: TrustedKeys,
    store: ConfigStore,
    progress: Option<ProgressCallback>,
    retry_base_delay: Option<Duration>,
}

impl<T> fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("paths", &self.paths)
            .field("platform", &self.platform)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Engine<T> {
    /// Assembles an engine from resolved parts.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if a configured trusted key is malformed.
    pub fn new(
        paths: SwupPaths,
        settings: Settings,
        platform: Arc<dyn Platform>,
        transport: Arc<T>,
    ) -> Result<Self> {
        let trusted_keys = settings.trusted_keys()?;
        Ok(Self {
            store: ConfigStore::new(paths.config_file()),
            paths,
            settings,
            platform,
            transport,
            trusted_keys,
            progress: None,
            retry_base_delay: None,
        })
    }

    /// Opens the installation selected by `overrides`, the environment and
    /// the platform defaults, in that order.
    ///
    /// An existing configuration supplies the recorded platform and
    /// directories. A configuration that cannot be read is reported by the
    /// first operation that needs it.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if the host cannot be identified and
    /// nothing was recorded, or `CorruptConfig` for a malformed settings file.
    pub fn open(transport: T, overrides: PathOverrides) -> Result<Self> {
        let overrides = overrides.or(PathOverrides::from_env());
        let detected = detect_current_platform();

        let home = match overrides.home.clone() {
            Some(home) => home,
            None => match &detected {
                Ok(platform) => platform.default_home_dir()?,
                Err(e) => return Err(EngineError::unsupported_platform(e.to_string())),
            },
        };
        let store = ConfigStore::new(SwupPaths::with_home(home.clone()).config_file());
        let recorded = match store.load() {
            Ok(config) => Some(config),
            Err(EngineError::NotInitialized { .. }) => None,
            Err(e) => {
                tracing::warn!("ignoring recorded configuration: {e}");
                None
            }
        };

        let platform = match &recorded {
            Some(config) => platform_for(&config.platform)?,
            None => detected?,
        };
        let paths = resolve_paths(
            &PathOverrides {
                home: Some(home),
                ..overrides
            },
            || Err(EngineError::invariant("home directory already resolved")),
            |home| platform.default_toolchains_dir(home),
            |_| {
                recorded
                    .as_ref()
                    .map(|c| (c.toolchains_dir.clone(), c.bin_dir.clone()))
            },
        )?;
        let settings = Settings::load(&paths.settings_file())?;
        tracing::debug!(home = %paths.home.display(), platform = %platform.descriptor(), "engine opened");

        Self::new(paths, settings, platform, Arc::new(transport))
    }

    /// Reports download progress through `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Overrides the first download retry delay.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn paths(&self) -> &SwupPaths {
        &self.paths
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.store.exists()
    }

    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` or `CorruptConfig`.
    pub fn config(&self) -> Result<Config> {
        self.store.load()
    }

    /// Resolves `selector` and installs the toolchain it names.
    ///
    /// The toolchain is activated when `activate` is set or nothing is active.
    /// An installed version is never downloaded again.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before `init`, `NoMatchingVersion` if the
    /// catalog has nothing matching, and any download, verification or
    /// extraction error. No toolchain directory is left behind on failure.
    pub async fn resolve_and_install(
        &self,
        selector: &Selector,
        activate: bool,
    ) -> Result<InstallOutcome> {
        tracing::info!(%selector, "install requested");
        let _lock = self.lock().await?;
        self.repair_locked()?;

        let config = self.store.load()?;
        if let Selector::Exact(version) = selector
            && config.is_installed(version)
        {
            return self.keep_installed(&config, *version, activate);
        }

        let asset = self.resolve_remote(selector).await?;
        if config.is_installed(&asset.version) {
            return self.keep_installed(&config, asset.version, activate);
        }
        self.install_locked(&asset, activate).await
    }

    /// Lists what the catalog offers for this platform, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Network` or `CatalogParse` if the catalog is unavailable, or
    /// `CorruptConfig` if the configuration exists but cannot be read.
    pub async fn list_available(&self, filter: Option<&Selector>) -> Result<Vec<AvailableToolchain>> {
        let config = self.store.load_optional()?;
        let entries = self
            .catalog()
            .list_available(self.platform.as_ref(), filter)
            .await?;

        Ok(entries
            .into_iter()
            .map(|(version, asset)| AvailableToolchain {
                installed: config.as_ref().is_some_and(|c| c.is_installed(&version)),
                active: config.as_ref().is_some_and(|c| c.in_use.is(&version)),
                version,
                asset,
            })
            .collect())
    }

    /// Lists installed toolchains matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` or `CorruptConfig`.
    pub fn list_installed(&self, filter: Option<&Selector>) -> Result<Vec<ListedToolchain>> {
        let config = self.store.load()?;
        let mut versions: Vec<ToolchainVersion> = config
            .installed_versions()
            .filter(|v| filter.is_none_or(|s| s.matches(v)))
            .copied()
            .collect();
        sort_newest_first(&mut versions);

        Ok(versions
            .iter()
            .filter_map(|v| config.installed(v))
            .map(|toolchain| ListedToolchain {
                active: config.in_use.is(&toolchain.version),
                toolchain: toolchain.clone(),
            })
            .collect())
    }

    /// Makes an installed toolchain the active one.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` if `version` is not installed.
    pub async fn activate(&self, version: &ToolchainVersion) -> Result<ActivateOutcome> {
        let _lock = self.lock().await?;
        self.repair_locked()?;

        let previous = self.store.load()?.active();
        let config = self.store.mutate(|mut c| {
            c.activate(*version)?;
            Ok(c)
        })?;
        self.sync_activation(&config)?;
        tracing::info!(%version, "activated");

        Ok(ActivateOutcome {
            version: *version,
            previous,
        })
    }

    /// Activates the newest installed toolchain matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` for an exact version that is not installed and
    /// `NoMatchingVersion` when no installed toolchain matches.
    pub async fn activate_matching(&self, selector: &Selector) -> Result<ActivateOutcome> {
        let version = self.installed_match(selector)?;
        self.activate(&version).await
    }

    /// The newest installed toolchain matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` for an exact version that is not installed and
    /// `NoMatchingVersion` when no installed toolchain matches.
    pub fn find_installed(&self, selector: &Selector) -> Result<InstalledToolchain> {
        let version = self.installed_match(selector)?;
        self.store
            .load()?
            .installed(&version)
            .cloned()
            .ok_or_else(|| EngineError::not_installed(version.to_string()))
    }

    /// Removes an installed toolchain.
    ///
    /// If it is active, the pointer moves to `reassign` or is cleared.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` if `version` or `reassign` is not installed,
    /// `InvariantViolation` if `reassign` is `version` itself, and `Io` if
    /// the directory cannot be removed. An interrupted removal is finished by
    /// the next repair pass.
    pub async fn uninstall(
        &self,
        version: &ToolchainVersion,
        reassign: Option<ToolchainVersion>,
    ) -> Result<UninstallOutcome> {
        let _lock = self.lock().await?;
        self.repair_locked()?;

        let config = self.store.load()?;
        let Some(installed) = config.installed(version).cloned() else {
            return Err(EngineError::not_installed(version.to_string()));
        };
        if let Some(next) = reassign {
            if next == *version {
                return Err(EngineError::invariant(format!(
                    "cannot hand activation from {version} to itself"
                )));
            }
            if !config.is_installed(&next) {
                return Err(EngineError::not_installed(next.to_string()));
            }
        }

        let was_active = config.in_use.is(version);
        if was_active {
            let config = self.store.mutate(|mut c| {
                match reassign {
                    Some(next) => c.activate(next)?,
                    None => c.in_use = ActivationPointer::Empty,
                }
                Ok(c)
            })?;
            self.sync_activation(&config)?;
        }

        self.store.mutate(|mut c| {
            c.journal(PendingOperation::uninstall(*version, installed.path.clone()));
            Ok(c)
        })?;
        self.remove_toolchain_dir(&installed.path)?;
        let config = self.store.mutate(|mut c| {
            c.unregister(version);
            c.clear_pending(version);
            Ok(c)
        })?;
        tracing::info!(%version, "uninstalled");

        Ok(UninstallOutcome {
            version: *version,
            was_active,
            active: config.active(),
        })
    }

    /// Sets up an installation: directories, configuration and activation
    /// artifacts, then installs the latest release unless told not to or a
    /// toolchain is already installed.
    ///
    /// # Errors
    ///
    /// Returns `CorruptConfig` for an unreadable existing configuration
    /// without `overwrite`, and any install error.
    pub async fn init(&self, options: &InitOptions) -> Result<InitOutcome> {
        let lock = self.lock().await?;
        self.paths.ensure_directories()?;

        if options.overwrite {
            self.discard_installation();
        }
        let existing = if options.overwrite {
            None
        } else {
            self.store.load_optional()?
        };
        let created = existing.is_none();
        let config = match existing {
            Some(config) => config,
            None => {
                let config = Config::new(self.platform.descriptor().clone(), &self.paths);
                self.store.persist(&config)?;
                tracing::info!(path = %self.store.path().display(), "configuration created");
                config
            }
        };
        self.repair_locked()?;
        self.sync_activation(&config)?;
        drop(lock);

        let installed = if options.skip_install || !config.installed_toolchains.is_empty() {
            None
        } else {
            Some(self.resolve_and_install(&Selector::Latest, true).await?)
        };

        Ok(InitOutcome {
            created,
            paths: self.paths.clone(),
            env_sh: env_sh_path(&self.paths),
            env_fish: env_fish_path(&self.paths),
            installed,
        })
    }

    /// Replaces an installed toolchain with the newest version on its line.
    ///
    /// Without a selector the active toolchain is updated. Activation follows
    /// the update when the old toolchain was active.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` or `NoMatchingVersion` if nothing installed
    /// matches, and any install or uninstall error.
    pub async fn update(&self, selector: Option<&Selector>) -> Result<UpdateOutcome> {
        let config = self.store.load()?;
        let current = match selector {
            Some(selector) => self.installed_match(selector)?,
            None => config
                .active()
                .ok_or_else(|| EngineError::no_matching_version("the active toolchain"))?,
        };

        let line = current.line_selector();
        let available = self
            .catalog()
            .list_available(self.platform.as_ref(), Some(&line))
            .await?;
        let candidates = available
            .iter()
            .map(|(v, _)| v)
            .filter(|v| current.same_line(v));
        let newest = match resolve(&line, candidates) {
            Ok(newest) => newest,
            Err(EngineError::NoMatchingVersion { .. }) => current,
            Err(e) => return Err(e),
        };
        if newest.try_cmp(&current)?.is_le() {
            tracing::info!(%current, "already up to date");
            return Ok(UpdateOutcome {
                previous: current,
                installed: None,
            });
        }

        let was_active = config.in_use.is(&current);
        tracing::info!(from = %current, to = %newest, "updating");
        let installed = self
            .resolve_and_install(&Selector::Exact(newest), was_active)
            .await?;
        self.uninstall(&current, None).await?;

        Ok(UpdateOutcome {
            previous: current,
            installed: Some(installed),
        })
    }

    /// Runs the repair pass on its own.
    ///
    /// # Errors
    ///
    /// Returns `LockContention`, `CorruptConfig`, or `Io` if a leftover cannot
    /// be removed.
    pub async fn repair(&self) -> Result<RepairReport> {
        let _lock = self.lock().await?;
        self.repair_locked()
    }

    /// The global default toolchain, if any.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` or `CorruptConfig`.
    pub fn current(&self) -> Result<Option<InstalledToolchain>> {
        let config = self.store.load()?;
        Ok(config
            .active()
            .and_then(|v| config.installed(&v).cloned()))
    }

    /// The toolchain in effect for `cwd`.
    ///
    /// The nearest `.swift-version` file wins unless `global_default` is set;
    /// its selector picks the newest installed match. Without a version file
    /// the global default applies.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVersionFile` for an unusable version file,
    /// `PinNotInstalled` when nothing installed matches it, and
    /// `NotInitialized` or `CorruptConfig`.
    pub fn selected(&self, cwd: &Path, global_default: bool) -> Result<Option<SelectedToolchain>> {
        let file = if global_default {
            None
        } else {
            version_file::find(cwd)
        };
        let Some(file) = file else {
            return Ok(self.current()?.map(|toolchain| SelectedToolchain {
                toolchain,
                source: ToolchainSource::GlobalDefault,
            }));
        };

        let selector = version_file::read(&file)?;
        let config = self.store.load()?;
        let version = match resolve(&selector, config.installed_versions()) {
            Ok(version) => version,
            Err(EngineError::NoMatchingVersion { .. }) => {
                return Err(EngineError::PinNotInstalled {
                    selector: selector.to_string(),
                    path: file,
                });
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(%version, path = %file.display(), "toolchain selected by version file");
        Ok(config.installed(&version).cloned().map(|toolchain| SelectedToolchain {
            toolchain,
            source: ToolchainSource::VersionFile(file),
        }))
    }

    /// Puts the newest installed toolchain matching `selector` in effect for
    /// `cwd`.
    ///
    /// Unless `global_default` is set, the nearest `.swift-version` file is
    /// rewritten, or one is created at the root of the enclosing git
    /// checkout. Otherwise, and outside any checkout, the global default
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` or `NoMatchingVersion` if nothing installed
    /// matches, and `Io` if the version file cannot be written.
    pub async fn use_toolchain(
        &self,
        selector: &Selector,
        cwd: &Path,
        global_default: bool,
    ) -> Result<UseOutcome> {
        let version = self.installed_match(selector)?;
        let pin = if global_default {
            None
        } else {
            version_file::find(cwd).or_else(|| version_file::new_location(cwd))
        };

        let Some(file) = pin else {
            let outcome = self.activate(&version).await?;
            return Ok(UseOutcome {
                version,
                previous: outcome.previous,
                target: ToolchainSource::GlobalDefault,
            });
        };

        let previous = match self.selected(cwd, false) {
            Ok(selected) => selected.map(|s| s.toolchain.version),
            Err(e) => {
                tracing::debug!("replacing unusable pin: {e}");
                None
            }
        };
        version_file::write(&file, &version)?;
        tracing::info!(%version, path = %file.display(), "pinned");
        Ok(UseOutcome {
            version,
            previous,
            target: ToolchainSource::VersionFile(file),
        })
    }

    /// Runs `command` with `toolchain` first on `PATH`.
    ///
    /// A program found in the toolchain's bin directory runs from there;
    /// anything else is looked up on the extended `PATH`. The child also sees
    /// `SWUP_ACTIVE_TOOLCHAIN`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` for an empty command and `SpawnFailed` if
    /// the program cannot be started.
    pub fn run(&self, toolchain: &InstalledToolchain, command: &[String]) -> Result<ExitStatus> {
        let Some((program, args)) = command.split_first() else {
            return Err(EngineError::invariant("no command to run"));
        };
        let bin = self.platform.toolchain_bin_dir(&toolchain.path);
        let path = prepend_path(&bin, std::env::var_os("PATH"))?;

        let bundled = bin.join(program);
        let program = if bundled.is_file() {
            bundled.to_string_lossy().into_owned()
        } else {
            program.clone()
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let options = RunOptions {
            env: vec![
                ("PATH".to_string(), path.to_string_lossy().into_owned()),
                (
                    ACTIVE_TOOLCHAIN_ENV.to_string(),
                    toolchain.version.to_string(),
                ),
            ],
            quiet: false,
        };
        tracing::info!(version = %toolchain.version, %program, "running");
        self.platform.run_program(&program, &args, &options)
    }

    /// Removes swup itself: the home directory with everything stored inside
    /// it, and the `swup` binary in the bin directory.
    ///
    /// Toolchains kept outside the home directory are left alone. Shell
    /// profiles belong to the caller.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when there is nothing to remove and `Io` if
    /// the home directory cannot be deleted.
    pub async fn self_uninstall(&self) -> Result<SelfUninstallOutcome> {
        let config = self.store.load()?;
        let lock = self.lock().await?;

        let home = &self.paths.home;
        let kept_toolchains = (!self.paths.toolchains.starts_with(home)
            && !config.installed_toolchains.is_empty())
        .then(|| self.paths.toolchains.clone());
        let binary = self
            .paths
            .bin
            .join(format!("swup{}", std::env::consts::EXE_SUFFIX));
        if !binary.starts_with(home)
            && binary.is_file()
            && let Err(e) = std::fs::remove_file(&binary)
        {
            tracing::warn!(path = %binary.display(), "failed to remove swup binary: {e}");
        }

        drop(lock);
        std::fs::remove_dir_all(home).map_err(|e| {
            EngineError::io(format!("Failed to remove directory: {}", home.display()), e)
        })?;
        tracing::info!(home = %home.display(), "swup removed");

        Ok(SelfUninstallOutcome {
            removed_home: home.clone(),
            kept_toolchains,
        })
    }

    async fn lock(&self) -> Result<StoreLock> {
        let lock = StoreLock::acquire(&self.paths.lock_file(), self.settings.lock_timeout()).await?;
        tracing::debug!(path = %lock.path().display(), "store lock held");
        Ok(lock)
    }

    fn repair_locked(&self) -> Result<RepairReport> {
        repair::run(&self.paths, self.platform.as_ref(), &self.store)
    }

    fn catalog(&self) -> CatalogClient<T> {
        CatalogClient::new(
            Arc::clone(&self.transport),
            &self.settings,
            Some(self.paths.cache_dir()),
        )
    }

    fn downloader(&self) -> Downloader<T> {
        let mut downloader = Downloader::new(
            Arc::clone(&self.transport),
            &self.settings,
            self.trusted_keys.clone(),
        )
        .with_extraction_dir(self.paths.toolchains.clone());
        if let Some(callback) = &self.progress {
            downloader = downloader.with_progress(Arc::clone(callback));
        }
        if let Some(delay) = self.retry_base_delay {
            downloader = downloader.with_retry_base_delay(delay);
        }
        downloader
    }

    fn sync_activation(&self, config: &Config) -> Result<()> {
        let active_bin = self.platform.toolchain_bin_dir(&self.paths.active_link());
        activation::sync_artifacts(
            &self.paths,
            repair::active_toolchain(config).as_ref(),
            &active_bin,
        )
    }

    async fn resolve_remote(&self, selector: &Selector) -> Result<ReleaseAsset> {
        let available = self
            .catalog()
            .list_available(self.platform.as_ref(), Some(selector))
            .await?;
        let version = resolve(selector, available.iter().map(|(v, _)| v))?;
        tracing::debug!(%selector, %version, "selector resolved");
        available
            .into_iter()
            .find_map(|(v, asset)| (v == version).then_some(asset))
            .ok_or_else(|| EngineError::no_matching_version(selector.to_string()))
    }

    fn installed_match(&self, selector: &Selector) -> Result<ToolchainVersion> {
        let config = self.store.load()?;
        if let Selector::Exact(version) = selector
            && !config.is_installed(version)
        {
            return Err(EngineError::not_installed(version.to_string()));
        }
        resolve(selector, config.installed_versions())
    }

    fn keep_installed(
        &self,
        config: &Config,
        version: ToolchainVersion,
        activate: bool,
    ) -> Result<InstallOutcome> {
        tracing::info!(%version, "already installed");
        let wants_activation = activate || config.active().is_none();
        let activated = if wants_activation && !config.in_use.is(&version) {
            let config = self.store.mutate(|mut c| {
                c.activate(version)?;
                Ok(c)
            })?;
            self.sync_activation(&config)?;
            tracing::info!(%version, "activated");
            true
        } else {
            config.in_use.is(&version)
        };

        Ok(InstallOutcome {
            version,
            already_installed: true,
            activated,
            post_install_script: None,
        })
    }

    async fn install_locked(&self, asset: &ReleaseAsset, activate: bool) -> Result<InstallOutcome> {
        let version = asset.version;
        self.paths.ensure_directories()?;

        tracing::info!(%version, url = %asset.url, "downloading");
        let temp_path = self.paths.partial_download(&asset.file_name);
        let staging_path = self.paths.verified_download(&asset.file_name);
        let archive = self
            .downloader()
            .fetch_and_verify(asset, &temp_path, &staging_path)
            .await
            .inspect_err(|e| tracing::info!(%version, "install failed: {e}"))?;
        tracing::info!(%version, "verified");

        let destination = self
            .paths
            .toolchain_dir(&self.platform.toolchain_dir_name(&version));
        self.store.mutate(|mut c| {
            c.journal(PendingOperation::install(version, destination.clone()));
            Ok(c)
        })?;

        tracing::info!(%version, path = %destination.display(), "extracting");
        let extracted = self.platform.extract(&archive, &destination);
        if let Err(e) = std::fs::remove_file(&archive) {
            tracing::debug!(path = %archive.display(), "failed to remove archive: {e}");
        }
        if let Err(e) = extracted {
            tracing::info!(%version, "install failed: {e}");
            if let Err(clear) = self.store.mutate(|mut c| {
                c.clear_pending(&version);
                Ok(c)
            }) {
                tracing::warn!("failed to clear install journal for {version}: {clear}");
            }
            return Err(e);
        }

        let registered = self.store.mutate(|mut c| {
            c.register(InstalledToolchain {
                version,
                path: destination.clone(),
                installed_at: Utc::now(),
            });
            c.clear_pending(&version);
            if activate || c.active().is_none() {
                c.activate(version)?;
            }
            Ok(c)
        });
        let config = match registered {
            Ok(config) => config,
            Err(e) => return Err(roll_back_promotion(&destination, e)),
        };
        tracing::info!(%version, "registered");

        let activated = config.in_use.is(&version);
        if activated {
            self.sync_activation(&config)?;
            tracing::info!(%version, "activated");
        }

        let post_install_script = match self
            .platform
            .post_install_hook(&version, &self.paths.post_install_dir())
        {
            Ok(script) => script,
            Err(e) => {
                tracing::warn!("skipping dependency check for {version}: {e}");
                None
            }
        };

        Ok(InstallOutcome {
            version,
            already_installed: false,
            activated,
            post_install_script,
        })
    }

    fn remove_toolchain_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            tracing::warn!(path = %dir.display(), "toolchain directory already gone");
            return Ok(());
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let trash = self.paths.trash_dir(&name);
        std::fs::rename(dir, &trash).map_err(|e| {
            EngineError::io(
                format!("Failed to rename {} to {}", dir.display(), trash.display()),
                e,
            )
        })?;
        std::fs::remove_dir_all(&trash).map_err(|e| {
            EngineError::io(format!("Failed to remove directory: {}", trash.display()), e)
        })
    }

    /// Best-effort removal of everything an earlier `init` left behind.
    fn discard_installation(&self) {
        if let Ok(Some(old)) = self.store.load_optional() {
            for toolchain in &old.installed_toolchains {
                if let Err(e) = std::fs::remove_dir_all(&toolchain.path) {
                    tracing::warn!(path = %toolchain.path.display(), "failed to remove toolchain: {e}");
                }
            }
        }
        for path in [self.store.path().to_path_buf(), self.paths.active_link()] {
            if path.symlink_metadata().is_ok()
                && let Err(e) = std::fs::remove_file(&path)
            {
                tracing::warn!(path = %path.display(), "failed to remove: {e}");
            }
        }
        tracing::info!(home = %self.paths.home.display(), "existing installation discarded");
    }
}

/// `PATH` with `dir` in front of the inherited entries.
fn prepend_path(dir: &Path, inherited: Option<OsString>) -> Result<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(inherited) = inherited {
        entries.extend(std::env::split_paths(&inherited));
    }
    std::env::join_paths(entries)
        .map_err(|e| EngineError::invariant(format!("cannot put {} on PATH: {e}", dir.display())))
}

/// Undoes a promotion whose registration could not be persisted.
fn roll_back_promotion(destination: &Path, cause: EngineError) -> EngineError {
    match std::fs::remove_dir_all(destination) {
        Ok(()) => cause,
        Err(e) => EngineError::inconsistent(
            format!("toolchain extracted but not registered ({cause}); removing it failed: {e}"),
            vec![destination.to_path_buf()],
        ),
    }
}
