//! Error types for the swup engine.
//!
//! Every fallible engine operation returns [`EngineError`]. Variants are grouped
//! into five categories ([`ErrorKind`]) that decide how a failure is handled:
//!
//! - **Input**: bad selector syntax, unknown or uninstalled versions. Reported
//!   immediately, never retried.
//! - **Network**: connection failures, HTTP errors, unreadable catalogs. Retried
//!   inside the download layer, surfaced once the attempt ceiling is reached.
//! - **Integrity**: checksum or signature mismatch. Always fatal.
//! - **Environment**: unsupported host, missing dependency, disk space, I/O.
//! - **State**: lock contention, corrupt configuration, orphaned directories.
//!   Reported with the exact path or version involved.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Failure category of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user asked for something that cannot be satisfied as written.
    Input,
    /// Talking to the release server failed.
    Network,
    /// A downloaded artifact did not match its checksum or signature.
    Integrity,
    /// The host cannot perform the operation.
    Environment,
    /// The persisted state is locked, corrupt, or inconsistent.
    State,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "input error",
            Self::Network => "network error",
            Self::Integrity => "integrity error",
            Self::Environment => "environment error",
            Self::State => "state error",
        };
        f.write_str(name)
    }
}

/// Consolidated error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A selector string could not be parsed.
    #[error("invalid toolchain selector `{input}`: {reason}")]
    InvalidSelectorSyntax {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A selector matched nothing in the catalog.
    #[error("no toolchain matches `{selector}`")]
    NoMatchingVersion {
        /// The selector as the user wrote it.
        selector: String,
    },

    /// An operation referred to a toolchain that is not installed.
    #[error("toolchain {version} is not installed")]
    NotInstalled {
        /// The requested version.
        version: String,
    },

    /// A `.swift-version` file does not hold a usable selector.
    #[error("invalid version file {}: {reason}", .path.display())]
    InvalidVersionFile {
        /// The version file.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A `.swift-version` file names a toolchain that is not installed.
    #[error("no installed toolchain matches `{selector}` from {}", .path.display())]
    PinNotInstalled {
        /// The selector read from the file.
        selector: String,
        /// The version file.
        path: PathBuf,
    },

    /// Two versions of different kinds or branches were compared.
    #[error("cannot compare {left} with {right}: different release lines")]
    IncomparableVersions {
        /// Left operand.
        left: String,
        /// Right operand.
        right: String,
    },

    /// A request failed or returned an unexpected status.
    #[error("request to {url} failed: {message}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A download did not complete within the retry budget.
    #[error("download of {url} failed after {attempts} attempt(s): {message}")]
    DownloadFailed {
        /// The URL being downloaded.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure.
        message: String,
    },

    /// The release catalog could not be interpreted at all.
    #[error("release catalog at {url} could not be parsed: {message}")]
    CatalogParse {
        /// The catalog URL.
        url: String,
        /// Description of the parse failure.
        message: String,
    },

    /// Checksum verification failed.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        /// The file that failed verification.
        path: PathBuf,
        /// The expected SHA-256 digest.
        expected: String,
        /// The computed SHA-256 digest.
        actual: String,
    },

    /// Signature verification failed.
    #[error("signature verification failed for {}: {reason}", .path.display())]
    SignatureInvalid {
        /// The file that failed verification.
        path: PathBuf,
        /// Why the signature was rejected.
        reason: String,
    },

    /// The running host is not a supported platform.
    #[error("unsupported platform: {details}")]
    UnsupportedPlatform {
        /// What was detected.
        details: String,
    },

    /// Not enough free space for a download and its extraction.
    #[error(
        "insufficient disk space in {}: {required} bytes required, {available} bytes available",
        .path.display()
    )]
    InsufficientDiskSpace {
        /// Directory that was checked.
        path: PathBuf,
        /// Bytes required.
        required: u64,
        /// Bytes available.
        available: u64,
    },

    /// An external program could not be started.
    #[error("failed to run `{program}`")]
    SpawnFailed {
        /// Program name.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Unpacking an archive failed.
    #[error("failed to extract {}: {message}", .archive.display())]
    ExtractionFailed {
        /// The archive being extracted.
        archive: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A system dependency is missing.
    #[error("missing system dependency: {message}")]
    MissingDependency {
        /// What is missing.
        message: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the store lock.
    #[error(
        "timed out after {}s waiting for lock {}; another swup process is running",
        .waited.as_secs(),
        .path.display()
    )]
    LockContention {
        /// The lock file.
        path: PathBuf,
        /// How long we waited.
        waited: Duration,
    },

    /// The configuration file is unreadable.
    #[error("configuration file {} is corrupt: {message}", .path.display())]
    CorruptConfig {
        /// The configuration file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// No configuration exists yet.
    #[error("swup is not initialized: {} does not exist", .path.display())]
    NotInitialized {
        /// The expected configuration file.
        path: PathBuf,
    },

    /// Writing the configuration file failed.
    #[error("failed to persist configuration to {}", .path.display())]
    PersistFailed {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration transform would break an invariant.
    #[error("configuration invariant violated: {message}")]
    InvariantViolation {
        /// The violated invariant.
        message: String,
    },

    /// A toolchain directory exists without a configuration entry.
    #[error("orphaned toolchain directory {} is not recorded in the configuration", .path.display())]
    OrphanedDirectory {
        /// The orphaned directory.
        path: PathBuf,
    },

    /// A failure could not be rolled back cleanly.
    #[error("{message}; manual cleanup required for: {}", display_paths(.paths))]
    InconsistentState {
        /// What went wrong.
        message: String,
        /// Paths left behind on disk.
        paths: Vec<PathBuf>,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// Creates a new `InvalidSelectorSyntax` error.
    #[must_use]
    pub fn invalid_selector(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelectorSyntax {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `NoMatchingVersion` error.
    #[must_use]
    pub fn no_matching_version(selector: impl Into<String>) -> Self {
        Self::NoMatchingVersion {
            selector: selector.into(),
        }
    }

    /// Creates a new `NotInstalled` error.
    #[must_use]
    pub fn not_installed(version: impl Into<String>) -> Self {
        Self::NotInstalled {
            version: version.into(),
        }
    }

    /// Creates a new `InvalidVersionFile` error.
    #[must_use]
    pub fn invalid_version_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidVersionFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new `CatalogParse` error.
    #[must_use]
    pub fn catalog_parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CatalogParse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `SignatureInvalid` error.
    #[must_use]
    pub fn signature_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(details: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            details: details.into(),
        }
    }

    /// Creates a new `ExtractionFailed` error.
    #[must_use]
    pub fn extraction_failed(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `CorruptConfig` error.
    #[must_use]
    pub fn corrupt_config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptConfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvariantViolation` error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a new `InconsistentState` error.
    #[must_use]
    pub fn inconsistent(message: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self::InconsistentState {
            message: message.into(),
            paths,
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSelectorSyntax { .. }
            | Self::NoMatchingVersion { .. }
            | Self::NotInstalled { .. }
            | Self::InvalidVersionFile { .. }
            | Self::PinNotInstalled { .. }
            | Self::IncomparableVersions { .. } => ErrorKind::Input,
            Self::Network { .. } | Self::DownloadFailed { .. } | Self::CatalogParse { .. } => {
                ErrorKind::Network
            }
            Self::ChecksumMismatch { .. } | Self::SignatureInvalid { .. } => ErrorKind::Integrity,
            Self::UnsupportedPlatform { .. }
            | Self::InsufficientDiskSpace { .. }
            | Self::SpawnFailed { .. }
            | Self::ExtractionFailed { .. }
            | Self::MissingDependency { .. }
            | Self::Io { .. } => ErrorKind::Environment,
            Self::LockContention { .. }
            | Self::CorruptConfig { .. }
            | Self::NotInitialized { .. }
            | Self::PersistFailed { .. }
            | Self::InvariantViolation { .. }
            | Self::OrphanedDirectory { .. }
            | Self::InconsistentState { .. } => ErrorKind::State,
        }
    }

    /// Returns a short hint telling the user how to get unstuck, if there is one.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSelectorSyntax { .. } => Some(
                "use `latest`, a version like `5.10` or `5.10.1`, `main-snapshot` or `5.10-snapshot`",
            ),
            Self::NoMatchingVersion { .. } => {
                Some("run `swup list-available` to see what can be installed")
            }
            Self::NotInstalled { .. } => Some("run `swup list` to see installed toolchains"),
            Self::InvalidVersionFile { .. } => Some(
                "put a single selector such as `5.10` in the file, or pass `--global-default`",
            ),
            Self::PinNotInstalled { .. } => {
                Some("install it with `swup install`, or pin another version with `swup use`")
            }
            Self::Network { .. } | Self::DownloadFailed { .. } => {
                Some("check your network connection and try again")
            }
            Self::ChecksumMismatch { .. } | Self::SignatureInvalid { .. } => Some(
                "the download may be corrupted or tampered with; it was deleted, please try again",
            ),
            Self::InsufficientDiskSpace { .. } => Some("free up disk space and try again"),
            Self::LockContention { .. } => {
                Some("wait for the other swup process to finish, then try again")
            }
            Self::NotInitialized { .. } => Some("run `swup init` first"),
            Self::CorruptConfig { .. } | Self::InvariantViolation { .. } => {
                Some("inspect the configuration file, or remove it and run `swup init`")
            }
            Self::OrphanedDirectory { .. } | Self::InconsistentState { .. } => {
                Some("remove the listed paths manually, then run `swup repair`")
            }
            Self::MissingDependency { .. } => {
                Some("install the missing dependency with your system package manager")
            }
            _ => None,
        }
    }
}
