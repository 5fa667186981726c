//! Reconciles the toolchain store with the configuration.
//!
//! Runs at the start of every mutating operation, under the store lock, and
//! on its own through `swup repair`. Leftovers of interrupted operations are
//! cleaned up or completed; anything that cannot be explained by the journal
//! is only reported.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::activation::{self, ActiveToolchain};
use crate::config::{Config, ConfigStore, InstalledToolchain, PendingKind};
use crate::error::{EngineError, Result};
use crate::paths::{STAGING_PREFIX, SwupPaths, TRASH_PREFIX};
use crate::platform::Platform;
use crate::version::ToolchainVersion;

/// What a repair pass found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Staging directories and stale verified downloads that were deleted.
    pub removed_staging: Vec<PathBuf>,
    /// Trash directories of interrupted uninstalls that were deleted.
    pub removed_trash: Vec<PathBuf>,
    /// Journaled installs whose directory was promoted but never registered.
    pub adopted: Vec<ToolchainVersion>,
    /// Journaled installs whose directory never appeared.
    pub abandoned: Vec<ToolchainVersion>,
    /// Journaled uninstalls that were finished.
    pub completed_uninstalls: Vec<ToolchainVersion>,
    /// Toolchain directories nothing accounts for. Left in place.
    pub orphans: Vec<PathBuf>,
    /// Registered toolchains whose directory is gone. Left in place.
    pub missing: Vec<InstalledToolchain>,
    /// Whether the activation artifacts had to be rewritten.
    pub artifacts_resynced: bool,
}

impl RepairReport {
    /// Whether the pass had nothing to do and nothing to report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.removed_staging.is_empty()
            && self.removed_trash.is_empty()
            && self.adopted.is_empty()
            && self.abandoned.is_empty()
            && self.completed_uninstalls.is_empty()
            && self.orphans.is_empty()
            && self.missing.is_empty()
            && !self.artifacts_resynced
    }

    /// Findings that need a human, as errors.
    #[must_use]
    pub fn problems(&self) -> Vec<EngineError> {
        let orphans = self
            .orphans
            .iter()
            .map(|path| EngineError::OrphanedDirectory { path: path.clone() });
        let missing = self.missing.iter().map(|t| {
            EngineError::inconsistent(
                format!("toolchain {} is registered but its directory is missing", t.version),
                vec![t.path.clone()],
            )
        });
        orphans.chain(missing).collect()
    }
}

/// Runs one repair pass. The caller must hold the store lock.
///
/// Without a configuration there is nothing to reconcile against and an empty
/// report is returned.
///
/// # Errors
///
/// Returns `CorruptConfig` if the configuration cannot be read, `Io` if a
/// leftover cannot be removed, or `PersistFailed` if the reconciled
/// configuration cannot be written.
pub(crate) fn run(
    paths: &SwupPaths,
    platform: &dyn Platform,
    store: &ConfigStore,
) -> Result<RepairReport> {
    let Some(mut config) = store.load_optional()? else {
        return Ok(RepairReport::default());
    };
    let original = config.clone();
    let mut report = RepairReport::default();

    report.removed_staging = remove_verified_downloads(&paths.downloads_dir())?;

    let mut present = Vec::new();
    for entry in read_store(&paths.toolchains)? {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with(STAGING_PREFIX) {
            remove_tree(&entry)?;
            report.removed_staging.push(entry);
        } else if name.starts_with(TRASH_PREFIX) {
            remove_tree(&entry)?;
            report.removed_trash.push(entry);
        } else if let Some(version) = platform.version_from_dir_name(&name) {
            present.push((version, entry));
        }
    }

    for (version, dir) in &present {
        if config.is_installed(version) {
            continue;
        }
        match config.pending_for(version).map(|op| op.kind) {
            Some(PendingKind::Install) => {
                tracing::warn!(path = %dir.display(), "adopting toolchain {version} left by an interrupted install");
                config.register(InstalledToolchain {
                    version: *version,
                    path: dir.clone(),
                    installed_at: Utc::now(),
                });
                config.clear_pending(version);
                report.adopted.push(*version);
            }
            Some(PendingKind::Uninstall) => {
                remove_tree(dir)?;
                config.clear_pending(version);
                report.completed_uninstalls.push(*version);
            }
            None => {
                tracing::warn!(path = %dir.display(), "orphaned toolchain directory");
                report.orphans.push(dir.clone());
            }
        }
    }

    let journal = config.pending.clone();
    for op in journal {
        let on_disk = present.iter().any(|(v, _)| *v == op.version);
        match op.kind {
            PendingKind::Install if !on_disk && !config.is_installed(&op.version) => {
                tracing::warn!("dropping interrupted install of {}", op.version);
                report.abandoned.push(op.version);
            }
            PendingKind::Install => {}
            PendingKind::Uninstall => {
                if on_disk {
                    remove_tree(&op.path)?;
                }
                config.unregister(&op.version);
                if !report.completed_uninstalls.contains(&op.version) {
                    report.completed_uninstalls.push(op.version);
                }
            }
        }
        config.clear_pending(&op.version);
    }

    for toolchain in &config.installed_toolchains {
        if !toolchain.path.is_dir() {
            tracing::warn!(path = %toolchain.path.display(), "toolchain {} is registered but missing", toolchain.version);
            report.missing.push(toolchain.clone());
        }
    }

    if config != original {
        store.persist(&config)?;
    }
    report.artifacts_resynced = resync_artifacts(paths, platform, &config)?;

    if !report.is_clean() {
        tracing::info!(?report, "repair pass finished");
    }
    Ok(report)
}

/// The artifact target `config` calls for.
pub(crate) fn active_toolchain(config: &Config) -> Option<ActiveToolchain> {
    let version = config.active()?;
    config.installed(&version).map(|t| ActiveToolchain {
        version,
        dir: t.path.clone(),
    })
}

/// Rewrites the activation artifacts if they disagree with `config`.
fn resync_artifacts(paths: &SwupPaths, platform: &dyn Platform, config: &Config) -> Result<bool> {
    let wanted = active_toolchain(config);
    let link = activation::link_target(paths);
    let scripts_present =
        activation::env_sh_path(paths).is_file() && activation::env_fish_path(paths).is_file();
    if scripts_present && link == wanted.as_ref().map(|t| t.dir.clone()) {
        return Ok(false);
    }
    tracing::debug!("activation artifacts out of date");
    let active_bin = platform.toolchain_bin_dir(&paths.active_link());
    activation::sync_artifacts(paths, wanted.as_ref(), &active_bin)?;
    Ok(true)
}

fn read_store(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(EngineError::io(
                format!("Failed to read directory: {}", dir.display()),
                e,
            ));
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Verified archives are only kept between download and extraction.
/// Partial downloads stay for resumption.
fn remove_verified_downloads(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in read_store(dir)? {
        let partial = path.extension().is_some_and(|ext| ext == "part");
        if partial || !path.is_file() {
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| {
            EngineError::io(format!("Failed to remove file: {}", path.display()), e)
        })?;
        removed.push(path);
    }
    Ok(removed)
}

fn remove_tree(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(
            format!("Failed to remove directory: {}", path.display()),
            e,
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::PendingOperation;
    use crate::platform::Linux;
    use crate::version::Architecture;

    struct Fixture {
        _temp: tempfile::TempDir,
        paths: SwupPaths,
        platform: Linux,
        store: ConfigStore,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let paths = SwupPaths::with_home(temp.path().to_path_buf());
        paths.ensure_directories().unwrap();
        let platform =
            Linux::from_os_release("ID=ubuntu\nVERSION_ID=\"22.04\"\n", Architecture::X86_64)
                .unwrap();
        let store = ConfigStore::new(paths.config_file());
        store
            .persist(&Config::new(platform.descriptor().clone(), &paths))
            .unwrap();
        Fixture {
            _temp: temp,
            paths,
            platform,
            store,
        }
    }

    fn toolchain_dir(f: &Fixture, version: &ToolchainVersion) -> PathBuf {
        let dir = f.paths.toolchain_dir(&f.platform.toolchain_dir_name(version));
        std::fs::create_dir_all(dir.join("usr/bin")).unwrap();
        dir
    }

    #[test]
    fn missing_config_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        let paths = SwupPaths::with_home(temp.path().to_path_buf());
        let platform =
            Linux::from_os_release("ID=ubuntu\nVERSION_ID=\"22.04\"\n", Architecture::X86_64)
                .unwrap();
        let report = run(&paths, &platform, &ConfigStore::new(paths.config_file())).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn staging_and_trash_leftovers_are_removed() {
        let f = fixture();
        let staging = f.paths.toolchains.join(".staging-5.10.0");
        let trash = f.paths.trash_dir("5.9.0");
        std::fs::create_dir_all(staging.join("usr")).unwrap();
        std::fs::create_dir_all(trash.join("usr")).unwrap();
        let partial = f.paths.partial_download("swift.tar.gz");
        std::fs::write(&partial, b"half").unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.removed_staging, vec![staging.clone()]);
        assert_eq!(report.removed_trash, vec![trash.clone()]);
        assert!(!staging.exists());
        assert!(!trash.exists());
        assert!(partial.exists());
    }

    #[test]
    fn journaled_orphan_is_adopted() {
        let f = fixture();
        let version = ToolchainVersion::release(5, 10, 0);
        let dir = toolchain_dir(&f, &version);
        f.store
            .mutate(|mut c| {
                c.journal(PendingOperation::install(version, dir.clone()));
                Ok(c)
            })
            .unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.adopted, vec![version]);
        let config = f.store.load().unwrap();
        assert!(config.is_installed(&version));
        assert!(config.pending.is_empty());
    }

    #[test]
    fn unjournaled_orphan_is_only_flagged() {
        let f = fixture();
        let dir = toolchain_dir(&f, &ToolchainVersion::release(5, 9, 0));

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.orphans, vec![dir.clone()]);
        assert!(dir.exists());
        assert!(f.store.load().unwrap().installed_toolchains.is_empty());
        assert!(matches!(
            report.problems().as_slice(),
            [EngineError::OrphanedDirectory { .. }]
        ));
    }

    #[test]
    fn install_that_never_extracted_is_dropped() {
        let f = fixture();
        let version = ToolchainVersion::release(5, 10, 1);
        let dir = f.paths.toolchain_dir("5.10.1");
        f.store
            .mutate(|mut c| {
                c.journal(PendingOperation::install(version, dir));
                Ok(c)
            })
            .unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.abandoned, vec![version]);
        assert!(f.store.load().unwrap().pending.is_empty());
    }

    #[test]
    fn interrupted_uninstall_is_completed() {
        let f = fixture();
        let version = ToolchainVersion::release(5, 9, 0);
        let dir = toolchain_dir(&f, &version);
        f.store
            .mutate(|mut c| {
                c.register(InstalledToolchain {
                    version,
                    path: dir.clone(),
                    installed_at: Utc::now(),
                });
                c.journal(PendingOperation::uninstall(version, dir.clone()));
                Ok(c)
            })
            .unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.completed_uninstalls, vec![version]);
        assert!(!dir.exists());
        let config = f.store.load().unwrap();
        assert!(!config.is_installed(&version));
        assert!(config.pending.is_empty());
    }

    #[test]
    fn missing_directory_is_reported_not_removed() {
        let f = fixture();
        let version = ToolchainVersion::release(5, 8, 0);
        f.store
            .mutate(|mut c| {
                c.register(InstalledToolchain {
                    version,
                    path: f.paths.toolchain_dir("5.8.0"),
                    installed_at: Utc::now(),
                });
                Ok(c)
            })
            .unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();

        assert_eq!(report.missing.len(), 1);
        assert!(f.store.load().unwrap().is_installed(&version));
    }

    #[test]
    fn stale_link_is_resynced_once() {
        let f = fixture();
        let version = ToolchainVersion::release(5, 10, 0);
        let dir = toolchain_dir(&f, &version);
        f.store
            .mutate(|mut c| {
                c.register(InstalledToolchain {
                    version,
                    path: dir.clone(),
                    installed_at: Utc::now(),
                });
                c.activate(version)?;
                Ok(c)
            })
            .unwrap();

        let first = run(&f.paths, &f.platform, &f.store).unwrap();
        let second = run(&f.paths, &f.platform, &f.store).unwrap();

        assert!(first.artifacts_resynced);
        assert!(!second.artifacts_resynced);
        assert_eq!(activation::link_target(&f.paths), Some(dir));
    }

    #[test]
    fn foreign_entries_are_ignored() {
        let f = fixture();
        std::fs::create_dir_all(f.paths.toolchains.join("notes")).unwrap();
        std::fs::create_dir_all(f.paths.toolchains.join(".cache")).unwrap();

        let report = run(&f.paths, &f.platform, &f.store).unwrap();
        assert!(report.orphans.is_empty());
    }
}
