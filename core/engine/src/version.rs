//! Toolchain versions, selectors and platform identifiers.
//!
//! Everything in this module is a plain value type: no I/O, no global state.
//!
//! ## Naming
//!
//! | Kind                    | Canonical name              | Upstream tag                                  |
//! |-------------------------|-----------------------------|-----------------------------------------------|
//! | release                 | `5.10.1`                    | `swift-5.10.1-RELEASE`                        |
//! | release (patch 0)       | `5.10.0`                    | `swift-5.10-RELEASE`                          |
//! | main snapshot           | `main-snapshot-2024-01-31`  | `swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a`     |
//! | release-branch snapshot | `5.10-snapshot-2024-01-31`  | `swift-5.10-DEVELOPMENT-SNAPSHOT-2024-01-31-a`|
//!
//! Canonical names are what the configuration file stores and what the user
//! sees; upstream tags are what the download server uses.
//!
//! ## Ordering
//!
//! Releases are ordered by `(major, minor, patch)`. Snapshots are ordered by date
//! within one branch. Comparing a release with a snapshot, or snapshots of two
//! different branches, is unsupported: `partial_cmp` returns `None`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, Result};

/// Date format used in snapshot names.
pub const SNAPSHOT_DATE_FORMAT: &str = "%Y-%m-%d";

/// A numbered release such as `5.10.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ReleaseVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The upstream spelling, which drops a zero patch component.
    #[must_use]
    pub fn short_name(&self) -> String {
        if self.patch == 0 {
            format!("{}.{}", self.major, self.minor)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The development branch a snapshot was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotBranch {
    Main,
    Release { major: u32, minor: u32 },
}

impl SnapshotBranch {
    /// Name used in snapshot catalog URLs (`main` or `5.10`).
    #[must_use]
    pub fn catalog_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SnapshotBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Release { major, minor } => write!(f, "{major}.{minor}"),
        }
    }
}

/// A dated development snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotVersion {
    pub branch: SnapshotBranch,
    pub date: NaiveDate,
}

/// A concrete, immutable toolchain version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainVersion {
    Release(ReleaseVersion),
    Snapshot(SnapshotVersion),
}

impl ToolchainVersion {
    #[must_use]
    pub const fn release(major: u32, minor: u32, patch: u32) -> Self {
        Self::Release(ReleaseVersion::new(major, minor, patch))
    }

    #[must_use]
    pub const fn main_snapshot(date: NaiveDate) -> Self {
        Self::Snapshot(SnapshotVersion {
            branch: SnapshotBranch::Main,
            date,
        })
    }

    #[must_use]
    pub const fn release_snapshot(major: u32, minor: u32, date: NaiveDate) -> Self {
        Self::Snapshot(SnapshotVersion {
            branch: SnapshotBranch::Release { major, minor },
            date,
        })
    }

    #[must_use]
    pub const fn is_release(&self) -> bool {
        matches!(self, Self::Release(_))
    }

    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }

    /// Upstream tag, e.g. `swift-5.10-RELEASE`.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Release(r) => format!("swift-{}-RELEASE", r.short_name()),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Main,
                date,
            }) => format!(
                "swift-DEVELOPMENT-SNAPSHOT-{}-a",
                date.format(SNAPSHOT_DATE_FORMAT)
            ),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Release { major, minor },
                date,
            }) => format!(
                "swift-{major}.{minor}-DEVELOPMENT-SNAPSHOT-{}-a",
                date.format(SNAPSHOT_DATE_FORMAT)
            ),
        }
    }

    /// Top-level directory on the download server holding this version.
    #[must_use]
    pub fn branch_directory(&self) -> String {
        match self {
            Self::Release(r) => format!("swift-{}-release", r.short_name()),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Main,
                ..
            }) => "development".to_string(),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Release { major, minor },
                ..
            }) => format!("swift-{major}.{minor}-branch"),
        }
    }

    /// Parses an upstream tag such as `swift-5.10-RELEASE` or
    /// `swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let body = tag.strip_prefix("swift-")?;
        if let Some(numbers) = body.strip_suffix("-RELEASE") {
            let parts = parse_numbers(numbers)?;
            return match parts.as_slice() {
                [major, minor] => Some(Self::release(*major, *minor, 0)),
                [major, minor, patch] => Some(Self::release(*major, *minor, *patch)),
                _ => None,
            };
        }
        match parse_selector(body).ok()? {
            Selector::Exact(version @ Self::Snapshot(_)) => Some(version),
            _ => None,
        }
    }

    /// Compares two versions, failing when they belong to different lines.
    ///
    /// # Errors
    ///
    /// Returns `IncomparableVersions` for a release/snapshot pair or snapshots of
    /// different branches.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        self.partial_cmp(other)
            .ok_or_else(|| EngineError::IncomparableVersions {
                left: self.to_string(),
                right: other.to_string(),
            })
    }

    /// Whether `other` is a candidate replacement for `self` when updating:
    /// the same `major.minor` for releases, the same branch for snapshots.
    #[must_use]
    pub fn same_line(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Release(a), Self::Release(b)) => a.major == b.major && a.minor == b.minor,
            (Self::Snapshot(a), Self::Snapshot(b)) => a.branch == b.branch,
            _ => false,
        }
    }

    /// Selector for the newest version on the same line as `self`.
    #[must_use]
    pub fn line_selector(&self) -> Selector {
        match self {
            Self::Release(r) => Selector::LatestPatch {
                major: r.major,
                minor: r.minor,
            },
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Main,
                ..
            }) => Selector::LatestMainSnapshot,
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Release { major, minor },
                ..
            }) => Selector::LatestReleaseSnapshot {
                major: *major,
                minor: *minor,
            },
        }
    }
}

impl PartialOrd for ToolchainVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Release(a), Self::Release(b)) => Some(a.cmp(b)),
            (Self::Snapshot(a), Self::Snapshot(b)) if a.branch == b.branch => {
                Some(a.date.cmp(&b.date))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release(r) => r.fmt(f),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Main,
                date,
            }) => write!(f, "main-snapshot-{}", date.format(SNAPSHOT_DATE_FORMAT)),
            Self::Snapshot(SnapshotVersion {
                branch: SnapshotBranch::Release { major, minor },
                date,
            }) => write!(
                f,
                "{major}.{minor}-snapshot-{}",
                date.format(SNAPSHOT_DATE_FORMAT)
            ),
        }
    }
}

impl FromStr for ToolchainVersion {
    type Err = EngineError;

    /// Parses a canonical name. Selectors like `5.10` or `latest` are rejected.
    fn from_str(s: &str) -> Result<Self> {
        match parse_selector(s)? {
            Selector::Exact(version) if version.to_string() == s.trim() => Ok(version),
            _ => Err(EngineError::invalid_selector(
                s,
                "not a complete toolchain version name",
            )),
        }
    }
}

impl Serialize for ToolchainVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ToolchainVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// The newest release.
    Latest,
    /// The newest release of a major version (`5`).
    LatestMajor { major: u32 },
    /// The newest patch of a minor version (`5.10`).
    LatestPatch { major: u32, minor: u32 },
    /// One specific version.
    Exact(ToolchainVersion),
    /// The newest snapshot of the main branch.
    LatestMainSnapshot,
    /// The newest snapshot of a release branch (`5.10-snapshot`).
    LatestReleaseSnapshot { major: u32, minor: u32 },
}

impl Selector {
    /// Whether `version` satisfies this selector.
    #[must_use]
    pub fn matches(&self, version: &ToolchainVersion) -> bool {
        match (self, version) {
            (Self::Latest, ToolchainVersion::Release(_)) => true,
            (Self::LatestMajor { major }, ToolchainVersion::Release(r)) => r.major == *major,
            (Self::LatestPatch { major, minor }, ToolchainVersion::Release(r)) => {
                r.major == *major && r.minor == *minor
            }
            (Self::Exact(wanted), v) => wanted == v,
            (Self::LatestMainSnapshot, ToolchainVersion::Snapshot(s)) => {
                s.branch == SnapshotBranch::Main
            }
            (Self::LatestReleaseSnapshot { major, minor }, ToolchainVersion::Snapshot(s)) => {
                s.branch
                    == SnapshotBranch::Release {
                        major: *major,
                        minor: *minor,
                    }
            }
            _ => false,
        }
    }

    /// The snapshot branch this selector targets, if it targets snapshots.
    #[must_use]
    pub fn snapshot_branch(&self) -> Option<SnapshotBranch> {
        match self {
            Self::LatestMainSnapshot => Some(SnapshotBranch::Main),
            Self::LatestReleaseSnapshot { major, minor } => Some(SnapshotBranch::Release {
                major: *major,
                minor: *minor,
            }),
            Self::Exact(ToolchainVersion::Snapshot(s)) => Some(s.branch),
            _ => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::LatestMajor { major } => write!(f, "{major}"),
            Self::LatestPatch { major, minor } => write!(f, "{major}.{minor}"),
            Self::Exact(version) => version.fmt(f),
            Self::LatestMainSnapshot => f.write_str("main-snapshot"),
            Self::LatestReleaseSnapshot { major, minor } => write!(f, "{major}.{minor}-snapshot"),
        }
    }
}

impl FromStr for Selector {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        parse_selector(s)
    }
}

/// Parses a user-supplied selector.
///
/// # Errors
///
/// Returns `InvalidSelectorSyntax` when the input matches none of the accepted
/// forms.
pub fn parse_selector(input: &str) -> Result<Selector> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid_selector(input, "selector is empty"));
    }
    if trimmed.eq_ignore_ascii_case("latest") {
        return Ok(Selector::Latest);
    }

    let body = trimmed.strip_prefix("swift-").unwrap_or(trimmed);

    for prefix in ["main-snapshot", "DEVELOPMENT-SNAPSHOT"] {
        if let Some(rest) = body.strip_prefix(prefix) {
            return Ok(match parse_snapshot_suffix(input, rest)? {
                Some(date) => Selector::Exact(ToolchainVersion::main_snapshot(date)),
                None => Selector::LatestMainSnapshot,
            });
        }
    }

    if let Some((numbers, rest)) = body.split_once('-') {
        let Some(parts) = parse_numbers(numbers) else {
            return Err(EngineError::invalid_selector(
                input,
                "expected a version number before `-`",
            ));
        };

        if rest == "RELEASE" {
            return match parts.as_slice() {
                [major, minor] => Ok(Selector::Exact(ToolchainVersion::release(
                    *major, *minor, 0,
                ))),
                [major, minor, patch] => Ok(Selector::Exact(ToolchainVersion::release(
                    *major, *minor, *patch,
                ))),
                _ => Err(EngineError::invalid_selector(
                    input,
                    "a release tag needs a major and minor version",
                )),
            };
        }

        let snapshot_rest = rest
            .strip_prefix("snapshot")
            .or_else(|| rest.strip_prefix("DEVELOPMENT-SNAPSHOT"));
        let Some(snapshot_rest) = snapshot_rest else {
            return Err(EngineError::invalid_selector(
                input,
                "unknown suffix; expected `-snapshot` or `-RELEASE`",
            ));
        };
        let [major, minor] = parts.as_slice() else {
            return Err(EngineError::invalid_selector(
                input,
                "a branch snapshot needs exactly a major and minor version, like `5.10-snapshot`",
            ));
        };
        return Ok(match parse_snapshot_suffix(input, snapshot_rest)? {
            Some(date) => Selector::Exact(ToolchainVersion::release_snapshot(*major, *minor, date)),
            None => Selector::LatestReleaseSnapshot {
                major: *major,
                minor: *minor,
            },
        });
    }

    match parse_numbers(body).as_deref() {
        Some([major]) => Ok(Selector::LatestMajor { major: *major }),
        Some([major, minor]) => Ok(Selector::LatestPatch {
            major: *major,
            minor: *minor,
        }),
        Some([major, minor, patch]) => Ok(Selector::Exact(ToolchainVersion::release(
            *major, *minor, *patch,
        ))),
        Some(_) => Err(EngineError::invalid_selector(
            input,
            "a version has at most three components",
        )),
        None => Err(EngineError::invalid_selector(
            input,
            "expected `latest`, a version number, or a snapshot name",
        )),
    }
}

/// Parses the part after `...snapshot`: empty, `-a`, `-YYYY-MM-DD` or
/// `-YYYY-MM-DD-a`.
fn parse_snapshot_suffix(input: &str, rest: &str) -> Result<Option<NaiveDate>> {
    if rest.is_empty() || rest == "-a" {
        return Ok(None);
    }
    let Some(rest) = rest.strip_prefix('-') else {
        return Err(EngineError::invalid_selector(
            input,
            "unexpected text after `snapshot`",
        ));
    };
    let date_text = rest.strip_suffix("-a").unwrap_or(rest);
    if date_text.len() != 10 {
        return Err(EngineError::invalid_selector(
            input,
            "snapshot dates are written YYYY-MM-DD",
        ));
    }
    NaiveDate::parse_from_str(date_text, SNAPSHOT_DATE_FORMAT)
        .map(Some)
        .map_err(|e| EngineError::invalid_selector(input, format!("invalid snapshot date: {e}")))
}

/// Splits `5.10.1` into numbers. Returns `None` for anything that is not a
/// dot-separated list of plain decimal numbers.
fn parse_numbers(text: &str) -> Option<Vec<u32>> {
    text.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse().ok()
            }
        })
        .collect()
}

/// Picks the version a selector refers to out of a catalog.
///
/// # Errors
///
/// Returns `NoMatchingVersion` when nothing in `catalog` satisfies `selector`.
pub fn resolve<'a, I>(selector: &Selector, catalog: I) -> Result<ToolchainVersion>
where
    I: IntoIterator<Item = &'a ToolchainVersion>,
{
    let mut best: Option<ToolchainVersion> = None;
    for candidate in catalog.into_iter().filter(|v| selector.matches(v)) {
        best = match best {
            Some(current) if candidate.partial_cmp(&current) != Some(Ordering::Greater) => {
                Some(current)
            }
            _ => Some(*candidate),
        };
    }
    best.ok_or_else(|| EngineError::no_matching_version(selector.to_string()))
}

/// Sorts versions newest first.
///
/// Releases come before snapshots. Snapshots are grouped by branch, `main`
/// first and then release branches from the highest `major.minor` down, each
/// group newest date first.
pub fn sort_newest_first(versions: &mut [ToolchainVersion]) {
    versions.sort_by(newest_first);
}

fn newest_first(a: &ToolchainVersion, b: &ToolchainVersion) -> Ordering {
    match (a, b) {
        (ToolchainVersion::Release(a), ToolchainVersion::Release(b)) => b.cmp(a),
        (ToolchainVersion::Release(_), ToolchainVersion::Snapshot(_)) => Ordering::Less,
        (ToolchainVersion::Snapshot(_), ToolchainVersion::Release(_)) => Ordering::Greater,
        (ToolchainVersion::Snapshot(a), ToolchainVersion::Snapshot(b)) => {
            branch_order(a.branch, b.branch).then_with(|| b.date.cmp(&a.date))
        }
    }
}

fn branch_order(a: SnapshotBranch, b: SnapshotBranch) -> Ordering {
    match (a, b) {
        (SnapshotBranch::Main, SnapshotBranch::Main) => Ordering::Equal,
        (SnapshotBranch::Main, SnapshotBranch::Release { .. }) => Ordering::Less,
        (SnapshotBranch::Release { .. }, SnapshotBranch::Main) => Ordering::Greater,
        (
            SnapshotBranch::Release { major, minor },
            SnapshotBranch::Release {
                major: other_major,
                minor: other_minor,
            },
        ) => (other_major, other_minor).cmp(&(major, minor)),
    }
}

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    #[serde(rename = "linux")]
    Linux,
    #[serde(rename = "macos")]
    MacOs,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("Linux"),
            Self::MacOs => f.write_str("macOS"),
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Architecture {
    /// The architecture this binary was compiled for.
    #[must_use]
    pub fn current() -> Option<Self> {
        Self::parse(std::env::consts::ARCH)
    }

    /// Accepts both the Rust and the common vendor spellings.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linux distribution identity as read from `os-release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxDistribution {
    pub id: String,
    pub version: String,
}

/// Identifies which downloadable assets fit the host.
///
/// `name` is the download directory spelling (`ubuntu2204`, `xcode`),
/// `name_full` the file name spelling (`ubuntu22.04`, `osx`) and `name_pretty`
/// the catalog spelling (`Ubuntu 22.04`, `Xcode`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformDescriptor {
    pub os: OsFamily,
    pub arch: Architecture,
    pub name: String,
    pub name_full: String,
    pub name_pretty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<LinuxDistribution>,
}

impl PlatformDescriptor {
    /// Whether a catalog platform entry describes this host.
    #[must_use]
    pub fn matches_catalog_name(&self, name: &str) -> bool {
        let name = name.trim();
        name.eq_ignore_ascii_case(&self.name_pretty) || name.eq_ignore_ascii_case(&self.name)
    }

    /// Whether a catalog architecture string can run on this host.
    #[must_use]
    pub fn supports_arch(&self, arch: &str) -> bool {
        arch == "universal" || Architecture::parse(arch) == Some(self.arch)
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name_pretty, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, SNAPSHOT_DATE_FORMAT).expect("valid date")
    }

    #[test]
    fn parses_release_selectors() {
        assert_eq!(parse_selector("latest").unwrap(), Selector::Latest);
        assert_eq!(
            parse_selector("5").unwrap(),
            Selector::LatestMajor { major: 5 }
        );
        assert_eq!(
            parse_selector("5.10").unwrap(),
            Selector::LatestPatch {
                major: 5,
                minor: 10
            }
        );
        assert_eq!(
            parse_selector(" 5.10.1 ").unwrap(),
            Selector::Exact(ToolchainVersion::release(5, 10, 1))
        );
        assert_eq!(
            parse_selector("swift-5.10-RELEASE").unwrap(),
            Selector::Exact(ToolchainVersion::release(5, 10, 0))
        );
    }

    #[test]
    fn parses_snapshot_selectors() {
        assert_eq!(
            parse_selector("main-snapshot").unwrap(),
            Selector::LatestMainSnapshot
        );
        assert_eq!(
            parse_selector("swift-DEVELOPMENT-SNAPSHOT").unwrap(),
            Selector::LatestMainSnapshot
        );
        assert_eq!(
            parse_selector("main-snapshot-2024-01-31").unwrap(),
            Selector::Exact(ToolchainVersion::main_snapshot(date("2024-01-31")))
        );
        assert_eq!(
            parse_selector("swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a").unwrap(),
            Selector::Exact(ToolchainVersion::main_snapshot(date("2024-01-31")))
        );
        assert_eq!(
            parse_selector("5.10-snapshot").unwrap(),
            Selector::LatestReleaseSnapshot {
                major: 5,
                minor: 10
            }
        );
        assert_eq!(
            parse_selector("5.10-DEVELOPMENT-SNAPSHOT-2024-02-15-a").unwrap(),
            Selector::Exact(ToolchainVersion::release_snapshot(
                5,
                10,
                date("2024-02-15")
            ))
        );
    }

    #[test]
    fn rejects_malformed_selectors() {
        for input in [
            "",
            "   ",
            "five",
            "5.x",
            "5.10.1.2",
            "+5",
            "5..1",
            "5-snapshot",
            "5.10.1-snapshot",
            "5.10-nightly",
            "main-snapshot-2024-13-01",
            "main-snapshot-24-01-01",
            "main-snapshotty",
            "99999999999",
        ] {
            let err = parse_selector(input).expect_err(input);
            assert!(
                matches!(err, EngineError::InvalidSelectorSyntax { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn canonical_names_round_trip() {
        for name in [
            "5.9.0",
            "5.10.1",
            "main-snapshot-2024-01-31",
            "5.10-snapshot-2024-02-15",
        ] {
            let version: ToolchainVersion = name.parse().expect(name);
            assert_eq!(version.to_string(), name);
        }
    }

    #[test]
    fn incomplete_names_are_not_versions() {
        assert!("5.10".parse::<ToolchainVersion>().is_err());
        assert!("latest".parse::<ToolchainVersion>().is_err());
        assert!("swift-5.10-RELEASE".parse::<ToolchainVersion>().is_err());
    }

    #[test]
    fn upstream_tags_follow_server_layout() {
        let release = ToolchainVersion::release(5, 10, 0);
        assert_eq!(release.tag(), "swift-5.10-RELEASE");
        assert_eq!(release.branch_directory(), "swift-5.10-release");

        let patch = ToolchainVersion::release(5, 10, 1);
        assert_eq!(patch.tag(), "swift-5.10.1-RELEASE");
        assert_eq!(patch.branch_directory(), "swift-5.10.1-release");

        let main = ToolchainVersion::main_snapshot(date("2024-01-31"));
        assert_eq!(main.tag(), "swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a");
        assert_eq!(main.branch_directory(), "development");

        let branch = ToolchainVersion::release_snapshot(6, 0, date("2024-06-01"));
        assert_eq!(branch.tag(), "swift-6.0-DEVELOPMENT-SNAPSHOT-2024-06-01-a");
        assert_eq!(branch.branch_directory(), "swift-6.0-branch");
    }

    #[test]
    fn tags_parse_back() {
        for version in [
            ToolchainVersion::release(5, 10, 0),
            ToolchainVersion::release(5, 10, 1),
            ToolchainVersion::main_snapshot(date("2024-01-31")),
            ToolchainVersion::release_snapshot(6, 0, date("2024-06-01")),
        ] {
            assert_eq!(ToolchainVersion::from_tag(&version.tag()), Some(version));
        }
        assert_eq!(ToolchainVersion::from_tag("swift-latest"), None);
        assert_eq!(ToolchainVersion::from_tag("5.10-RELEASE"), None);
    }

    #[test]
    fn ordering_is_scoped_to_one_line() {
        let a = ToolchainVersion::release(5, 9, 2);
        let b = ToolchainVersion::release(5, 10, 0);
        assert!(a < b);

        let s1 = ToolchainVersion::main_snapshot(date("2024-01-01"));
        let s2 = ToolchainVersion::main_snapshot(date("2024-02-01"));
        assert!(s1 < s2);

        let other_branch = ToolchainVersion::release_snapshot(5, 10, date("2024-03-01"));
        assert_eq!(s2.partial_cmp(&other_branch), None);
        assert_eq!(a.partial_cmp(&s1), None);
        assert!(matches!(
            a.try_cmp(&s1),
            Err(EngineError::IncomparableVersions { .. })
        ));
    }

    #[test]
    fn line_selector_stays_on_the_line() {
        let release = ToolchainVersion::release(5, 9, 1);
        assert_eq!(
            release.line_selector(),
            Selector::LatestPatch { major: 5, minor: 9 }
        );
        assert!(release.line_selector().matches(&ToolchainVersion::release(5, 9, 2)));
        assert!(!release.line_selector().matches(&ToolchainVersion::release(5, 10, 0)));

        let snapshot = ToolchainVersion::release_snapshot(5, 10, date("2024-03-01"));
        assert_eq!(
            snapshot.line_selector(),
            Selector::LatestReleaseSnapshot { major: 5, minor: 10 }
        );
        assert_eq!(
            ToolchainVersion::main_snapshot(date("2024-03-01")).line_selector(),
            Selector::LatestMainSnapshot
        );
    }

    #[test]
    fn resolve_applies_each_policy() {
        let catalog = vec![
            ToolchainVersion::release(5, 9, 0),
            ToolchainVersion::release(5, 9, 2),
            ToolchainVersion::release(5, 10, 1),
            ToolchainVersion::release(6, 0, 0),
            ToolchainVersion::main_snapshot(date("2024-01-01")),
            ToolchainVersion::main_snapshot(date("2024-03-01")),
            ToolchainVersion::release_snapshot(6, 0, date("2024-05-01")),
        ];

        let pick = |s: &str| resolve(&parse_selector(s).unwrap(), &catalog);

        assert_eq!(pick("latest").unwrap(), ToolchainVersion::release(6, 0, 0));
        assert_eq!(pick("5").unwrap(), ToolchainVersion::release(5, 10, 1));
        assert_eq!(pick("5.9").unwrap(), ToolchainVersion::release(5, 9, 2));
        assert_eq!(pick("5.9.0").unwrap(), ToolchainVersion::release(5, 9, 0));
        assert_eq!(
            pick("main-snapshot").unwrap(),
            ToolchainVersion::main_snapshot(date("2024-03-01"))
        );
        assert_eq!(
            pick("6.0-snapshot").unwrap(),
            ToolchainVersion::release_snapshot(6, 0, date("2024-05-01"))
        );
        assert!(matches!(
            pick("5.8"),
            Err(EngineError::NoMatchingVersion { .. })
        ));
        assert!(matches!(
            pick("5.10-snapshot"),
            Err(EngineError::NoMatchingVersion { .. })
        ));
    }

    #[test]
    fn sort_newest_first_groups_releases_before_snapshots() {
        let mut versions = vec![
            ToolchainVersion::main_snapshot(date("2024-01-01")),
            ToolchainVersion::release(5, 9, 0),
            ToolchainVersion::release(5, 10, 0),
        ];
        sort_newest_first(&mut versions);
        assert_eq!(versions[0], ToolchainVersion::release(5, 10, 0));
        assert_eq!(versions[1], ToolchainVersion::release(5, 9, 0));
    }

    #[test]
    fn sort_newest_first_orders_interleaved_snapshot_branches() {
        let main_old = ToolchainVersion::main_snapshot(date("2024-01-01"));
        let main_new = ToolchainVersion::main_snapshot(date("2024-06-01"));
        let six_old = ToolchainVersion::release_snapshot(6, 0, date("2024-02-01"));
        let six_new = ToolchainVersion::release_snapshot(6, 0, date("2024-05-01"));
        let five_ten = ToolchainVersion::release_snapshot(5, 10, date("2024-07-01"));
        let release = ToolchainVersion::release(5, 10, 1);
        let expected = vec![release, main_new, main_old, six_new, six_old, five_ten];

        let mut versions = vec![five_ten, main_old, six_old, release, main_new, six_new];
        sort_newest_first(&mut versions);
        assert_eq!(versions, expected);

        versions.reverse();
        sort_newest_first(&mut versions);
        assert_eq!(versions, expected);

        let mut rotated = vec![six_new, main_old, five_ten, main_new, six_old, release];
        sort_newest_first(&mut rotated);
        assert_eq!(rotated, expected);
    }

    #[test]
    fn selector_display_parses_back() {
        for input in [
            "latest",
            "5",
            "5.10",
            "5.10.1",
            "main-snapshot",
            "5.10-snapshot",
            "main-snapshot-2024-01-31",
        ] {
            let selector = parse_selector(input).unwrap();
            assert_eq!(parse_selector(&selector.to_string()).unwrap(), selector);
        }
    }

    #[test]
    fn platform_descriptor_matches_catalog_names() {
        let descriptor = PlatformDescriptor {
            os: OsFamily::Linux,
            arch: Architecture::Aarch64,
            name: "ubuntu2204".to_string(),
            name_full: "ubuntu22.04".to_string(),
            name_pretty: "Ubuntu 22.04".to_string(),
            distribution: None,
        };
        assert!(descriptor.matches_catalog_name("ubuntu 22.04"));
        assert!(descriptor.matches_catalog_name("ubuntu2204"));
        assert!(!descriptor.matches_catalog_name("Ubuntu 20.04"));
        assert!(descriptor.supports_arch("arm64"));
        assert!(descriptor.supports_arch("universal"));
        assert!(!descriptor.supports_arch("x86_64"));
    }

    #[test]
    fn version_serializes_as_name() {
        let version = ToolchainVersion::release_snapshot(5, 10, date("2024-02-15"));
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"5.10-snapshot-2024-02-15\"");
        let back: ToolchainVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
        assert!(serde_json::from_str::<ToolchainVersion>("\"5.10\"").is_err());
    }

    fn arb_version() -> impl Strategy<Value = ToolchainVersion> {
        prop_oneof![
            (0u32..4, 0u32..4, 0u32..4).prop_map(|(a, b, c)| ToolchainVersion::release(a, b, c)),
            (0i64..60).prop_map(|d| ToolchainVersion::main_snapshot(
                date("2024-01-01") + chrono::TimeDelta::days(d)
            )),
            (0i64..60).prop_map(|d| ToolchainVersion::release_snapshot(
                5,
                10,
                date("2024-01-01") + chrono::TimeDelta::days(d)
            )),
        ]
    }

    fn arb_selector() -> impl Strategy<Value = Selector> {
        prop_oneof![
            Just(Selector::Latest),
            (0u32..4).prop_map(|major| Selector::LatestMajor { major }),
            (0u32..4, 0u32..4).prop_map(|(major, minor)| Selector::LatestPatch { major, minor }),
            arb_version().prop_map(Selector::Exact),
            Just(Selector::LatestMainSnapshot),
            Just(Selector::LatestReleaseSnapshot {
                major: 5,
                minor: 10
            }),
        ]
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(
            selector in arb_selector(),
            catalog in proptest::collection::vec(arb_version(), 0..24),
        ) {
            let first = resolve(&selector, &catalog).ok();
            let second = resolve(&selector, &catalog).ok();
            prop_assert_eq!(first, second);

            let mut reversed = catalog.clone();
            reversed.reverse();
            prop_assert_eq!(first, resolve(&selector, &reversed).ok());
        }

        #[test]
        fn resolved_version_matches_and_is_maximal(
            selector in arb_selector(),
            catalog in proptest::collection::vec(arb_version(), 0..24),
        ) {
            if let Ok(found) = resolve(&selector, &catalog) {
                prop_assert!(selector.matches(&found));
                prop_assert!(catalog.contains(&found));
                for other in catalog.iter().filter(|v| selector.matches(v)) {
                    prop_assert_ne!(other.partial_cmp(&found), Some(Ordering::Greater));
                }
            } else {
                prop_assert!(!catalog.iter().any(|v| selector.matches(v)));
            }
        }

        #[test]
        fn sort_newest_first_ignores_input_order(
            catalog in proptest::collection::vec(arb_version(), 0..24),
        ) {
            let mut sorted = catalog.clone();
            sort_newest_first(&mut sorted);
            let mut reversed = catalog;
            reversed.reverse();
            sort_newest_first(&mut reversed);
            prop_assert_eq!(&sorted, &reversed);

            for pair in sorted.windows(2) {
                if let Some(ordering) = pair[0].partial_cmp(&pair[1]) {
                    prop_assert_ne!(ordering, Ordering::Less);
                }
            }
        }
    }
}
