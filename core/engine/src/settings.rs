//! User settings.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. environment variables (`SWUP_DIST_SERVER`, `SWUP_DOWNLOAD_SERVER`,
//!    `SWUP_LOCK_TIMEOUT_SECS`);
//! 2. the optional `<home>/settings.toml` file;
//! 3. built-in defaults.
//!
//! ```toml
//! dist_server = "https://www.swift.org"
//! download_server = "https://download.swift.org"
//! lock_timeout_secs = 30
//! max_download_attempts = 3
//! catalog_cache_ttl_secs = 900
//! # Replaces the embedded release keys when non-empty.
//! trusted_keys = []
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::verify::TrustedKeys;

/// Environment variable overriding the catalog server.
pub const DIST_SERVER_ENV: &str = "SWUP_DIST_SERVER";

/// Environment variable overriding the download server.
pub const DOWNLOAD_SERVER_ENV: &str = "SWUP_DOWNLOAD_SERVER";

/// Environment variable overriding the lock timeout, in seconds.
pub const LOCK_TIMEOUT_ENV: &str = "SWUP_LOCK_TIMEOUT_SECS";

/// Default catalog server.
pub const DEFAULT_DIST_SERVER: &str = "https://www.swift.org";

/// Default download server.
pub const DEFAULT_DOWNLOAD_SERVER: &str = "https://download.swift.org";

const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 15 * 60;
const DEFAULT_DISK_SPACE_MULTIPLIER: u64 = 3;

/// Effective engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dist_server: String,
    pub download_server: String,
    pub lock_timeout_secs: u64,
    pub max_download_attempts: u32,
    pub catalog_cache_ttl_secs: u64,
    /// Free space required relative to the download size (archive plus
    /// extracted contents).
    pub disk_space_multiplier: u64,
    /// Hex-encoded Ed25519 public keys accepted for archive signatures.
    pub trusted_keys: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dist_server: DEFAULT_DIST_SERVER.to_string(),
            download_server: DEFAULT_DOWNLOAD_SERVER.to_string(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            max_download_attempts: DEFAULT_MAX_DOWNLOAD_ATTEMPTS,
            catalog_cache_ttl_secs: DEFAULT_CATALOG_CACHE_TTL_SECS,
            disk_space_multiplier: DEFAULT_DISK_SPACE_MULTIPLIER,
            trusted_keys: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads `path` if it exists and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `CorruptConfig` if the file exists but is not valid TOML for
    /// these settings.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Self>(&content)
                .map_err(|e| EngineError::corrupt_config(path, e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(EngineError::io(
                    format!("Failed to read settings: {}", path.display()),
                    e,
                ));
            }
        };
        Ok(settings.apply_env())
    }

    /// Overlays environment variables. Empty or unparsable values are ignored.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Some(server) = env_value(DIST_SERVER_ENV) {
            self.dist_server = server;
        }
        if let Some(server) = env_value(DOWNLOAD_SERVER_ENV) {
            self.download_server = server;
        }
        match env_value(LOCK_TIMEOUT_ENV).map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) => self.lock_timeout_secs = secs,
            Some(Err(_)) => {
                tracing::warn!("ignoring non-numeric {LOCK_TIMEOUT_ENV}");
            }
            None => {}
        }
        self
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    #[must_use]
    pub fn catalog_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_cache_ttl_secs)
    }

    /// Keys accepted for archive signatures: the configured ones, or the
    /// embedded release keys when none are configured.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if a configured key is malformed.
    pub fn trusted_keys(&self) -> Result<TrustedKeys> {
        if self.trusted_keys.is_empty() {
            Ok(TrustedKeys::embedded())
        } else {
            TrustedKeys::from_hex(&self.trusted_keys)
        }
    }

    /// Catalog server without a trailing slash.
    #[must_use]
    pub fn dist_server(&self) -> &str {
        self.dist_server.trim().trim_end_matches('/')
    }

    /// Download server without a trailing slash.
    #[must_use]
    pub fn download_server(&self) -> &str {
        self.download_server.trim().trim_end_matches('/')
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
