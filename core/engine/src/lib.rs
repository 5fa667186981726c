#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! Toolchain installation and activation engine behind `swup`.
//!
//! The crate resolves version selectors against the release catalog,
//! downloads and verifies archives, installs them into the toolchain store and
//! switches the active toolchain. All state lives under the swup home
//! directory:
//!
//! ```text
//! <home>/
//! ├── config.json        installed toolchains, active pointer, journal
//! ├── settings.toml      optional user settings
//! ├── active -> toolchains/5.10.0
//! ├── env.sh, env.fish   sourced from shell profiles
//! ├── cache/             catalog documents
//! ├── downloads/         in-flight and verified archives
//! └── toolchains/        one directory per installed toolchain
//! ```
//!
//! A `.swift-version` file in a project directory pins the toolchain used
//! there, overriding the global default.
//!
//! [`Engine`] is the entry point; the other modules are public for callers that
//! need a single piece, such as selector parsing.

pub mod activation;
pub mod catalog;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod lock;
pub mod paths;
pub mod platform;
pub mod repair;
pub mod settings;
pub mod transport;
pub mod verify;
pub mod version;
pub mod version_file;

pub use catalog::{Integrity, ReleaseAsset};
pub use config::{ActivationPointer, Config, ConfigStore, InstalledToolchain};
pub use download::{ProgressCallback, ProgressEvent};
pub use engine::{
    ActivateOutcome, AvailableToolchain, Engine, InitOptions, InitOutcome, InstallOutcome,
    ListedToolchain, SelectedToolchain, SelfUninstallOutcome, ToolchainSource, UninstallOutcome,
    UpdateOutcome, UseOutcome,
};
pub use error::{EngineError, ErrorKind, Result};
pub use paths::{PathOverrides, SwupPaths};
pub use platform::{Platform, detect_current_platform};
pub use repair::RepairReport;
pub use settings::Settings;
pub use transport::{DownloadStream, HttpTransport, Transport, TransportError};
pub use version::{Selector, ToolchainVersion, parse_selector};
