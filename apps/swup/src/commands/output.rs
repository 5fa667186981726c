//! JSON documents printed with `--format json`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use swup_engine::ToolchainSource;
use swup_engine::ToolchainVersion;
use swup_engine::version::SnapshotVersion;

/// A toolchain version broken into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub name: String,
    /// `stable` or `snapshot`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl From<&ToolchainVersion> for VersionInfo {
    fn from(version: &ToolchainVersion) -> Self {
        let (branch, date) = match version {
            ToolchainVersion::Snapshot(SnapshotVersion { branch, date }) => (
                Some(branch.catalog_name()),
                Some(date.format("%Y-%m-%d").to_string()),
            ),
            ToolchainVersion::Release(_) => (None, None),
        };
        Self {
            name: version.to_string(),
            kind: if version.is_release() {
                "stable"
            } else {
                "snapshot"
            },
            branch,
            date,
        }
    }
}

/// Where the toolchain in effect was picked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceInfo {
    VersionFile { path: PathBuf },
    GlobalDefault,
}

impl From<&ToolchainSource> for SourceInfo {
    fn from(source: &ToolchainSource) -> Self {
        match source {
            ToolchainSource::VersionFile(path) => Self::VersionFile { path: path.clone() },
            ToolchainSource::GlobalDefault => Self::GlobalDefault,
        }
    }
}

/// The toolchain in effect, as printed by `swup use`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InUseInfo<'a> {
    pub version: VersionInfo,
    pub path: &'a Path,
    pub source: SourceInfo,
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
