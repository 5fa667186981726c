//! Persisted record of installed toolchains.
//!
//! `<home>/config.json` is the single source of truth:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "platform": { "os": "linux", "arch": "x86_64", "name": "ubuntu2204", ... },
//!   "homeDir": "/home/me/.local/share/swup",
//!   "toolchainsDir": "/home/me/.local/share/swup/toolchains",
//!   "binDir": "/home/me/.local/share/swup/bin",
//!   "inUse": { "state": "active", "version": "5.10.0" },
//!   "installedToolchains": [
//!     { "version": "5.10.0", "path": "...", "installedAt": "2024-03-05T10:00:00Z" }
//!   ],
//!   "pending": []
//! }
//! ```
//!
//! Every mutation goes through [`ConfigStore::mutate`], which validates the
//! result and replaces the file atomically.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::paths::SwupPaths;
use crate::version::{PlatformDescriptor, ToolchainVersion};

/// Current configuration schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Reads attempted before a parse failure is reported as corruption.
const READ_ATTEMPTS: u32 = 3;

const READ_RETRY_DELAY_MS: u64 = 25;

/// Which toolchain is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "version", rename_all = "lowercase")]
pub enum ActivationPointer {
    #[default]
    Empty,
    Active(ToolchainVersion),
}

impl ActivationPointer {
    #[must_use]
    pub fn version(&self) -> Option<ToolchainVersion> {
        match self {
            Self::Empty => None,
            Self::Active(v) => Some(*v),
        }
    }

    #[must_use]
    pub fn is(&self, version: &ToolchainVersion) -> bool {
        self.version().as_ref() == Some(version)
    }
}

/// One installed toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledToolchain {
    pub version: ToolchainVersion,
    pub path: PathBuf,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Install,
    Uninstall,
}

/// Journal entry for an irreversible filesystem step in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub kind: PendingKind,
    pub version: ToolchainVersion,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl PendingOperation {
    #[must_use]
    pub fn install(version: ToolchainVersion, path: PathBuf) -> Self {
        Self {
            kind: PendingKind::Install,
            version,
            path,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn uninstall(version: ToolchainVersion, path: PathBuf) -> Self {
        Self {
            kind: PendingKind::Uninstall,
            version,
            path,
            started_at: Utc::now(),
        }
    }
}

/// The persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub schema_version: u32,
    pub platform: PlatformDescriptor,
    pub home_dir: PathBuf,
    pub toolchains_dir: PathBuf,
    pub bin_dir: PathBuf,
    #[serde(default)]
    pub in_use: ActivationPointer,
    #[serde(default)]
    pub installed_toolchains: Vec<InstalledToolchain>,
    #[serde(default)]
    pub pending: Vec<PendingOperation>,
}

impl Config {
    /// A fresh configuration with nothing installed.
    #[must_use]
    pub fn new(platform: PlatformDescriptor, paths: &SwupPaths) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            platform,
            home_dir: paths.home.clone(),
            toolchains_dir: paths.toolchains.clone(),
            bin_dir: paths.bin.clone(),
            in_use: ActivationPointer::Empty,
            installed_toolchains: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Checks the invariants every persisted configuration satisfies.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` describing the first broken invariant.
    pub fn validate(&self) -> Result<()> {
        for (i, toolchain) in self.installed_toolchains.iter().enumerate() {
            if self.installed_toolchains[..i]
                .iter()
                .any(|t| t.version == toolchain.version)
            {
                return Err(EngineError::invariant(format!(
                    "toolchain {} is recorded twice",
                    toolchain.version
                )));
            }
        }
        for (i, op) in self.pending.iter().enumerate() {
            if self.pending[..i].iter().any(|p| p.version == op.version) {
                return Err(EngineError::invariant(format!(
                    "more than one pending operation for {}",
                    op.version
                )));
            }
        }
        if let ActivationPointer::Active(version) = self.in_use
            && !self.is_installed(&version)
        {
            return Err(EngineError::invariant(format!(
                "active toolchain {version} is not installed"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn installed(&self, version: &ToolchainVersion) -> Option<&InstalledToolchain> {
        self.installed_toolchains
            .iter()
            .find(|t| &t.version == version)
    }

    #[must_use]
    pub fn is_installed(&self, version: &ToolchainVersion) -> bool {
        self.installed(version).is_some()
    }

    #[must_use]
    pub fn active(&self) -> Option<ToolchainVersion> {
        self.in_use.version()
    }

    pub fn installed_versions(&self) -> impl Iterator<Item = &ToolchainVersion> {
        self.installed_toolchains.iter().map(|t| &t.version)
    }

    #[must_use]
    pub fn pending_for(&self, version: &ToolchainVersion) -> Option<&PendingOperation> {
        self.pending.iter().find(|p| &p.version == version)
    }

    /// The directories recorded at `init`.
    #[must_use]
    pub fn paths(&self) -> SwupPaths {
        SwupPaths {
            home: self.home_dir.clone(),
            toolchains: self.toolchains_dir.clone(),
            bin: self.bin_dir.clone(),
        }
    }

    /// Records `op`, replacing any earlier entry for the same version.
    pub fn journal(&mut self, op: PendingOperation) {
        self.clear_pending(&op.version);
        self.pending.push(op);
    }

    pub fn clear_pending(&mut self, version: &ToolchainVersion) {
        self.pending.retain(|p| &p.version != version);
    }

    /// Adds `toolchain`, replacing an entry with the same version.
    pub fn register(&mut self, toolchain: InstalledToolchain) {
        self.installed_toolchains
            .retain(|t| t.version != toolchain.version);
        self.installed_toolchains.push(toolchain);
    }

    /// Drops the entry for `version`, clearing the pointer if it was active.
    pub fn unregister(&mut self, version: &ToolchainVersion) {
        self.installed_toolchains.retain(|t| &t.version != version);
        if self.in_use.is(version) {
            self.in_use = ActivationPointer::Empty;
        }
    }

    /// Points at `version`.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` if `version` is not installed.
    pub fn activate(&mut self, version: ToolchainVersion) -> Result<()> {
        if !self.is_installed(&version) {
            return Err(EngineError::not_installed(version.to_string()));
        }
        self.in_use = ActivationPointer::Active(version);
        Ok(())
    }
}

/// Reads and atomically rewrites `config.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the configuration.
    ///
    /// A file that does not parse is re-read a few times, since a concurrent
    /// writer may be replacing it.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the file does not exist and `CorruptConfig`
    /// if it cannot be parsed or breaks an invariant.
    pub fn load(&self) -> Result<Config> {
        let mut attempt = 1;
        loop {
            match self.read_once() {
                Err(EngineError::CorruptConfig { message, .. }) if attempt < READ_ATTEMPTS => {
                    tracing::debug!("re-reading {}: {message}", self.path.display());
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
                }
                result => return result,
            }
        }
    }

    /// Like [`ConfigStore::load`], but a missing file is `None`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptConfig` if the file exists but cannot be used.
    pub fn load_optional(&self) -> Result<Option<Config>> {
        match self.load() {
            Ok(config) => Ok(Some(config)),
            Err(EngineError::NotInitialized { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_once(&self) -> Result<Config> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NotInitialized {
                    path: self.path.clone(),
                });
            }
            Err(e) => {
                return Err(EngineError::io(
                    format!("Failed to read configuration: {}", self.path.display()),
                    e,
                ));
            }
        };

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| EngineError::corrupt_config(&self.path, e.to_string()))?;
        if config.schema_version > SCHEMA_VERSION {
            return Err(EngineError::corrupt_config(
                &self.path,
                format!(
                    "schema version {} was written by a newer swup",
                    config.schema_version
                ),
            ));
        }
        config
            .validate()
            .map_err(|e| EngineError::corrupt_config(&self.path, e.to_string()))?;
        Ok(config)
    }

    /// Loads, transforms, validates and persists the configuration.
    ///
    /// Nothing is written if `transform` fails or its result is invalid.
    ///
    /// # Errors
    ///
    /// Returns the error of `transform`, `InvariantViolation` for an invalid
    /// result, or `PersistFailed` if the file cannot be replaced.
    pub fn mutate<F>(&self, transform: F) -> Result<Config>
    where
        F: FnOnce(Config) -> Result<Config>,
    {
        let config = transform(self.load()?)?;
        self.persist(&config)?;
        Ok(config)
    }

    /// Validates `config` and atomically replaces the file with it.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` for an invalid configuration or
    /// `PersistFailed` if the file cannot be written.
    pub fn persist(&self, config: &Config) -> Result<()> {
        config.validate()?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let persist_failed = |source| EngineError::PersistFailed {
            path: self.path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(persist_failed)?;

        let mut content = serde_json::to_string_pretty(config)
            .map_err(|e| EngineError::invariant(format!("configuration not serializable: {e}")))?;
        content.push('\n');

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(persist_failed)?;
        temp.write_all(content.as_bytes()).map_err(persist_failed)?;
        temp.as_file().sync_all().map_err(persist_failed)?;
        temp.persist(&self.path)
            .map_err(|e| persist_failed(e.error))?;

        tracing::debug!(path = %self.path.display(), "configuration persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Architecture, OsFamily};
    use proptest::prelude::*;

    fn descriptor() -> PlatformDescriptor {
        PlatformDescriptor {
            os: OsFamily::Linux,
            arch: Architecture::X86_64,
            name: "ubuntu2204".to_string(),
            name_full: "ubuntu22.04".to_string(),
            name_pretty: "Ubuntu 22.04".to_string(),
            distribution: None,
        }
    }

    fn store() -> (tempfile::TempDir, ConfigStore, Config) {
        let temp = tempfile::tempdir().unwrap();
        let paths = SwupPaths::with_home(temp.path().to_path_buf());
        let store = ConfigStore::new(paths.config_file());
        let config = Config::new(descriptor(), &paths);
        (temp, store, config)
    }

    fn installed(version: ToolchainVersion) -> InstalledToolchain {
        InstalledToolchain {
            version,
            path: PathBuf::from(format!("/store/{version}")),
            installed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn missing_file_is_not_initialized() {
        let (_temp, store, _) = store();
        assert!(matches!(
            store.load().unwrap_err(),
            EngineError::NotInitialized { .. }
        ));
        assert_eq!(store.load_optional().unwrap(), None);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let (_temp, store, mut config) = store();
        let version = ToolchainVersion::release(5, 9, 0);
        config.register(installed(version));
        config.activate(version).unwrap();
        config.journal(PendingOperation::install(
            ToolchainVersion::release(5, 10, 0),
            PathBuf::from("/store/5.10.0"),
        ));

        store.persist(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"inUse\": {"));
        assert!(raw.contains("\"state\": \"active\""));
    }

    #[test]
    fn garbage_is_corrupt_config() {
        let (_temp, store, _) = store();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.load().unwrap_err(),
            EngineError::CorruptConfig { .. }
        ));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let (_temp, store, mut config) = store();
        config.schema_version = SCHEMA_VERSION + 1;
        let content = serde_json::to_string(&config).unwrap();
        std::fs::write(store.path(), content).unwrap();
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("newer swup"));
    }

    #[test]
    fn invalid_transform_leaves_file_untouched() {
        let (_temp, store, config) = store();
        store.persist(&config).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let err = store
            .mutate(|mut c| {
                c.in_use = ActivationPointer::Active(ToolchainVersion::release(6, 0, 0));
                Ok(c)
            })
            .unwrap_err();

        assert!(matches!(err, EngineError::InvariantViolation { .. }));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn failing_transform_writes_nothing() {
        let (_temp, store, config) = store();
        store.persist(&config).unwrap();
        let err = store
            .mutate(|_| Err(EngineError::not_installed("5.9.0")))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInstalled { .. }));
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn duplicates_violate_invariants() {
        let (_temp, _store, mut config) = store();
        let version = ToolchainVersion::release(5, 9, 0);
        config.installed_toolchains.push(installed(version));
        config.installed_toolchains.push(installed(version));
        assert!(config.validate().is_err());

        config.installed_toolchains.pop();
        config.pending.push(PendingOperation::install(version, PathBuf::new()));
        config.pending.push(PendingOperation::uninstall(version, PathBuf::new()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn unregister_clears_matching_pointer() {
        let (_temp, _store, mut config) = store();
        let version = ToolchainVersion::release(5, 9, 0);
        config.register(installed(version));
        config.activate(version).unwrap();
        config.unregister(&version);
        assert_eq!(config.in_use, ActivationPointer::Empty);
        assert!(config.validate().is_ok());
        assert!(config.activate(version).is_err());
    }

    proptest! {
        #[test]
        fn mutate_round_trips(
            versions in prop::collection::vec((0u32..7, 0u32..12, 0u32..4), 0..6),
            active in prop::option::of(0usize..6),
        ) {
            let (_temp, store, config) = store();
            store.persist(&config).unwrap();

            let transform = |mut c: Config| -> Result<Config> {
                for (major, minor, patch) in &versions {
                    c.register(installed(ToolchainVersion::release(*major, *minor, *patch)));
                }
                if let Some(i) = active
                    && let Some(t) = c.installed_toolchains.get(i)
                {
                    let v = t.version;
                    c.activate(v)?;
                }
                Ok(c)
            };

            let expected = transform(store.load().unwrap()).unwrap();
            let written = store.mutate(transform).unwrap();
            prop_assert_eq!(&written, &expected);
            prop_assert_eq!(store.load().unwrap(), expected);
        }
    }
}
