//! Release catalog client.
//!
//! Two documents are served by the distribution server:
//!
//! - `/api/v1/install/releases.json`, every stable release with the platforms
//!   it ships for:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "releases": [
//!     {
//!       "name": "5.10",
//!       "date": "2024-03-05",
//!       "platforms": [
//!         { "name": "Ubuntu 22.04", "platform": "Linux", "archs": ["x86_64", "aarch64"],
//!           "assets": [{ "arch": "x86_64", "sha256": "ab12...", "size": 123, "signed": true }] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//!   A bare array of releases is accepted as well.
//!
//! - `/api/v1/install/dev/<main|X.Y>/<platform>.json`, the snapshots of one
//!   branch keyed by architecture:
//!
//! ```json
//! { "x86_64": [{ "dir": "swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a" }], "aarch64": [] }
//! ```
//!
//! Raw documents are cached under `<home>/cache/` for a short time. A cache
//! file that cannot be read back is deleted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activation::write_atomically;
use crate::error::{EngineError, Result};
use crate::platform::Platform;
use crate::settings::Settings;
use crate::transport::{Transport, TransportError};
use crate::version::{ReleaseVersion, Selector, SnapshotBranch, ToolchainVersion, sort_newest_first};

/// Path to the releases document on the distribution server.
const RELEASES_PATH: &str = "/api/v1/install/releases.json";

/// Prefix of the per-branch snapshot documents.
const SNAPSHOTS_PATH: &str = "/api/v1/install/dev";

/// Newest releases document schema this client understands.
const SUPPORTED_SCHEMA_MAJOR: u64 = 1;

/// How a downloaded asset is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// Detached Ed25519 signature published at `url`, optionally with the
    /// expected SHA-256 digest as well.
    Signature { url: String, sha256: Option<String> },
    /// SHA-256 digest only.
    Checksum { sha256: String },
    /// The platform installer verifies the package itself.
    PackageSignature,
}

/// A downloadable toolchain for the current platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub version: ToolchainVersion,
    pub file_name: String,
    pub url: String,
    pub integrity: Integrity,
    /// Size in bytes, when the catalog publishes it.
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    name: String,
    #[serde(default)]
    platforms: Vec<RawPlatform>,
}

#[derive(Debug, Deserialize)]
struct RawPlatform {
    name: String,
    #[serde(default)]
    archs: Option<Vec<String>>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAsset {
    #[serde(default)]
    arch: String,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    signed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    dir: String,
    #[serde(flatten)]
    asset: RawAsset,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedDocument {
    url: String,
    fetched_at: u64,
    body: String,
}

/// Client for the release catalog.
#[derive(Debug)]
pub struct CatalogClient<T> {
    transport: Arc<T>,
    dist_server: String,
    download_server: String,
    cache_dir: Option<PathBuf>,
    cache_ttl: Duration,
}

impl<T: Transport> CatalogClient<T> {
    /// Creates a client. Without a `cache_dir` every call goes to the network.
    #[must_use]
    pub fn new(transport: Arc<T>, settings: &Settings, cache_dir: Option<PathBuf>) -> Self {
        Self {
            transport,
            dist_server: settings.dist_server().to_string(),
            download_server: settings.download_server().to_string(),
            cache_dir,
            cache_ttl: settings.catalog_cache_ttl(),
        }
    }

    /// Lists the toolchains available for `platform`, newest first.
    ///
    /// Without a filter, or with a release selector, the releases document is
    /// queried. A snapshot selector queries the snapshot document of its
    /// branch instead.
    ///
    /// # Errors
    ///
    /// Returns `Network` if a document cannot be fetched and `CatalogParse` if
    /// it is not a catalog at all.
    pub async fn list_available(
        &self,
        platform: &dyn Platform,
        filter: Option<&Selector>,
    ) -> Result<Vec<(ToolchainVersion, ReleaseAsset)>> {
        let mut assets = match filter.and_then(Selector::snapshot_branch) {
            Some(branch) => self.snapshots(platform, branch).await?,
            None => self.releases(platform).await?,
        };
        if let Some(selector) = filter {
            assets.retain(|asset| selector.matches(&asset.version));
        }

        let mut versions: Vec<ToolchainVersion> = assets.iter().map(|a| a.version).collect();
        sort_newest_first(&mut versions);
        versions.dedup();

        Ok(versions
            .into_iter()
            .filter_map(|v| {
                assets
                    .iter()
                    .position(|a| a.version == v)
                    .map(|i| (v, assets.swap_remove(i)))
            })
            .collect())
    }

    async fn releases(&self, platform: &dyn Platform) -> Result<Vec<ReleaseAsset>> {
        let url = format!("{}{RELEASES_PATH}", self.dist_server);
        let Some(body) = self.fetch_document(&url, "releases.json").await? else {
            return Err(EngineError::network(&url, "release catalog not found"));
        };
        let entries = release_entries(&url, &body)?;

        let mut assets = Vec::new();
        for entry in entries {
            let release = match serde_json::from_value::<RawRelease>(entry) {
                Ok(release) => release,
                Err(e) => {
                    tracing::warn!("skipping malformed release entry in {url}: {e}");
                    continue;
                }
            };
            let Some(version) = parse_release_name(&release.name) else {
                tracing::warn!("skipping release with unparsable name `{}`", release.name);
                continue;
            };
            if let Some(asset) = self.release_asset(platform, version, &release) {
                assets.push(asset);
            }
        }
        tracing::debug!("{} releases available for {}", assets.len(), platform.descriptor());
        Ok(assets)
    }

    fn release_asset(
        &self,
        platform: &dyn Platform,
        version: ToolchainVersion,
        release: &RawRelease,
    ) -> Option<ReleaseAsset> {
        let descriptor = platform.descriptor();
        let entry = release
            .platforms
            .iter()
            .find(|p| descriptor.matches_catalog_name(&p.name));
        if !platform.lists_every_release() {
            let archs = entry?.archs.as_ref()?;
            if !archs.iter().any(|a| descriptor.supports_arch(a)) {
                return None;
            }
        }
        let raw = entry.and_then(|e| e.assets.iter().find(|a| descriptor.supports_arch(&a.arch)));
        self.asset(platform, version, raw.unwrap_or(&RawAsset::default()))
    }

    async fn snapshots(
        &self,
        platform: &dyn Platform,
        branch: SnapshotBranch,
    ) -> Result<Vec<ReleaseAsset>> {
        let catalog_name = platform.snapshot_catalog_name();
        let url = format!(
            "{}{SNAPSHOTS_PATH}/{}/{catalog_name}.json",
            self.dist_server,
            branch.catalog_name()
        );
        let cache_key = format!("dev-{}-{catalog_name}.json", branch.catalog_name());
        let Some(body) = self.fetch_document(&url, &cache_key).await? else {
            tracing::info!("no snapshots published for branch {branch}");
            return Ok(Vec::new());
        };

        let document: Value = serde_json::from_str(&body)
            .map_err(|e| EngineError::catalog_parse(&url, e.to_string()))?;
        let Value::Object(mut by_arch) = document else {
            return Err(EngineError::catalog_parse(&url, "expected an object keyed by architecture"));
        };
        let entries = match by_arch.remove(platform.snapshot_arch_key()) {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(EngineError::catalog_parse(
                    &url,
                    format!("`{}` is not a list", platform.snapshot_arch_key()),
                ));
            }
            None => Vec::new(),
        };

        let mut assets = Vec::new();
        for entry in entries {
            let snapshot = match serde_json::from_value::<RawSnapshot>(entry) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("skipping malformed snapshot entry in {url}: {e}");
                    continue;
                }
            };
            match ToolchainVersion::from_tag(&snapshot.dir) {
                Some(version @ ToolchainVersion::Snapshot(s)) if s.branch == branch => {
                    assets.extend(self.asset(platform, version, &snapshot.asset));
                }
                _ => tracing::warn!("skipping snapshot `{}` not on branch {branch}", snapshot.dir),
            }
        }
        Ok(assets)
    }

    /// Builds the download location and integrity reference of one asset.
    fn asset(
        &self,
        platform: &dyn Platform,
        version: ToolchainVersion,
        raw: &RawAsset,
    ) -> Option<ReleaseAsset> {
        let file_name = platform.asset_file_name(&version);
        let url = format!(
            "{}/{}/{}/{}/{file_name}",
            self.download_server,
            version.branch_directory(),
            platform.asset_directory(),
            version.tag()
        );
        let sha256 = raw.sha256.clone().filter(|s| !s.trim().is_empty());
        let native = platform.verifies_packages_natively();

        let integrity = if raw.signed.unwrap_or(!native) {
            Integrity::Signature {
                url: format!("{url}.sig"),
                sha256,
            }
        } else if let Some(sha256) = sha256 {
            Integrity::Checksum { sha256 }
        } else if native {
            Integrity::PackageSignature
        } else {
            tracing::warn!("skipping {version}: the catalog offers no way to verify it");
            return None;
        };

        Some(ReleaseAsset {
            version,
            file_name,
            url,
            integrity,
            size: raw.size,
        })
    }

    /// Returns the document at `url`, from cache when fresh. `None` means the
    /// server has no such document.
    async fn fetch_document(&self, url: &str, cache_key: &str) -> Result<Option<String>> {
        let cache_file = self.cache_dir.as_ref().map(|d| d.join(cache_key));
        if let Some(body) = cache_file
            .as_deref()
            .and_then(|f| load_from_cache(f, url, self.cache_ttl))
        {
            tracing::debug!("using cached catalog for {url}");
            return Ok(Some(body));
        }

        tracing::debug!("fetching catalog {url}");
        let body = match self.transport.get_text(url).await {
            Ok(body) => body,
            Err(TransportError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(EngineError::network(url, e.describe())),
        };
        serde_json::from_str::<Value>(&body)
            .map_err(|e| EngineError::catalog_parse(url, e.to_string()))?;

        if let Some(file) = cache_file {
            save_to_cache(&file, url, &body);
        }
        Ok(Some(body))
    }
}

/// Extracts the release list from either document shape, rejecting schema
/// versions newer than this client.
fn release_entries(url: &str, body: &str) -> Result<Vec<Value>> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| EngineError::catalog_parse(url, e.to_string()))?;
    match document {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut object) => {
            if let Some(schema) = object.get("schemaVersion") {
                let major = schema_major(schema).ok_or_else(|| {
                    EngineError::catalog_parse(url, format!("invalid schemaVersion {schema}"))
                })?;
                if major > SUPPORTED_SCHEMA_MAJOR {
                    return Err(EngineError::catalog_parse(
                        url,
                        format!(
                            "schema version {major} is newer than supported version {SUPPORTED_SCHEMA_MAJOR}; upgrade swup"
                        ),
                    ));
                }
            }
            match object.remove("releases") {
                Some(Value::Array(entries)) => Ok(entries),
                _ => Err(EngineError::catalog_parse(url, "missing `releases` list")),
            }
        }
        _ => Err(EngineError::catalog_parse(url, "expected a list of releases")),
    }
}

fn schema_major(schema: &Value) -> Option<u64> {
    match schema {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.split('.').next()?.trim().parse().ok(),
        _ => None,
    }
}

/// `5.10` names the release `5.10.0`.
fn parse_release_name(name: &str) -> Option<ToolchainVersion> {
    let parts = name
        .trim()
        .split('.')
        .map(str::parse::<u32>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;
    match parts.as_slice() {
        [major, minor] => Some(ToolchainVersion::Release(ReleaseVersion::new(*major, *minor, 0))),
        [major, minor, patch] => Some(ToolchainVersion::release(*major, *minor, *patch)),
        _ => None,
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn load_from_cache(cache_file: &Path, url: &str, ttl: Duration) -> Option<String> {
    let content = std::fs::read_to_string(cache_file).ok()?;

    let Ok(cached) = serde_json::from_str::<CachedDocument>(&content) else {
        let _ = std::fs::remove_file(cache_file);
        return None;
    };
    let age = current_timestamp().saturating_sub(cached.fetched_at);
    (cached.url == url && age < ttl.as_secs()).then_some(cached.body)
}

/// Replaces the cached copy in one rename, so a concurrent reader never sees
/// a truncated document.
fn save_to_cache(cache_file: &Path, url: &str, body: &str) {
    let cached = CachedDocument {
        url: url.to_string(),
        fetched_at: current_timestamp(),
        body: body.to_string(),
    };
    let Ok(content) = serde_json::to_string(&cached) else {
        return;
    };
    if let Err(e) = write_atomically(cache_file, &content) {
        tracing::debug!("could not cache catalog {url}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Linux, MacOs};
    use crate::transport::DownloadStream;
    use crate::version::Architecture as Arch;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticTransport {
        documents: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticTransport {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.documents.insert(url.to_string(), body.to_string());
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for StaticTransport {
        async fn get_text(&self, url: &str) -> std::result::Result<String, TransportError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }

        async fn get_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
            self.get_text(url).await.map(String::into_bytes)
        }

        async fn open(
            &self,
            url: &str,
            _offset: u64,
        ) -> std::result::Result<DownloadStream, TransportError> {
            Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    const RELEASES_URL: &str = "https://www.swift.org/api/v1/install/releases.json";

    const RELEASES: &str = r#"{
        "schemaVersion": 1,
        "releases": [
            { "name": "5.9", "platforms": [
                { "name": "Ubuntu 22.04", "archs": ["x86_64", "aarch64"] } ] },
            { "name": "5.10.1", "platforms": [
                { "name": "Ubuntu 22.04", "archs": ["x86_64"],
                  "assets": [{ "arch": "x86_64", "sha256": "AB12", "size": 42, "signed": false }] },
                { "name": "Xcode", "archs": ["universal"] } ] },
            { "name": "5.10", "platforms": [
                { "name": "Ubuntu 20.04", "archs": ["x86_64"] },
                { "name": "Xcode" } ] },
            { "name": "not-a-version", "platforms": [] },
            { "platforms": "broken" }
        ]
    }"#;

    fn ubuntu(arch: Arch) -> Linux {
        Linux::from_os_release("ID=ubuntu\nVERSION_ID=\"22.04\"\n", arch).unwrap()
    }

    fn client(transport: StaticTransport, cache: Option<PathBuf>) -> CatalogClient<StaticTransport> {
        CatalogClient::new(Arc::new(transport), &Settings::default(), cache)
    }

    #[tokio::test]
    async fn releases_are_filtered_to_platform_and_arch() {
        let client = client(StaticTransport::default().with(RELEASES_URL, RELEASES), None);

        let x86 = client.list_available(&ubuntu(Arch::X86_64), None).await.unwrap();
        let versions: Vec<String> = x86.iter().map(|(v, _)| v.to_string()).collect();
        assert_eq!(versions, ["5.10.1", "5.9.0"]);

        let arm = client.list_available(&ubuntu(Arch::Aarch64), None).await.unwrap();
        assert_eq!(arm.len(), 1);
        assert_eq!(arm[0].0, ToolchainVersion::release(5, 9, 0));
    }

    #[tokio::test]
    async fn asset_urls_and_integrity_follow_catalog_flags() {
        let client = client(StaticTransport::default().with(RELEASES_URL, RELEASES), None);
        let available = client.list_available(&ubuntu(Arch::X86_64), None).await.unwrap();

        let (_, checksummed) = &available[0];
        assert_eq!(checksummed.file_name, "swift-5.10.1-RELEASE-ubuntu22.04.tar.gz");
        assert_eq!(
            checksummed.url,
            "https://download.swift.org/swift-5.10.1-release/ubuntu2204/swift-5.10.1-RELEASE/swift-5.10.1-RELEASE-ubuntu22.04.tar.gz"
        );
        assert_eq!(
            checksummed.integrity,
            Integrity::Checksum {
                sha256: "AB12".to_string()
            }
        );
        assert_eq!(checksummed.size, Some(42));

        let (_, signed) = &available[1];
        assert_eq!(
            signed.integrity,
            Integrity::Signature {
                url: format!("{}.sig", signed.url),
                sha256: None,
            }
        );
    }

    #[tokio::test]
    async fn macos_lists_every_release_with_package_signatures() {
        let client = client(StaticTransport::default().with(RELEASES_URL, RELEASES), None);
        let available = client
            .list_available(&MacOs::new(Arch::Aarch64), None)
            .await
            .unwrap();
        let versions: Vec<String> = available.iter().map(|(v, _)| v.to_string()).collect();
        assert_eq!(versions, ["5.10.1", "5.10.0", "5.9.0"]);
        assert!(
            available
                .iter()
                .all(|(_, a)| a.integrity == Integrity::PackageSignature)
        );
    }

    #[tokio::test]
    async fn bare_array_is_accepted_and_filter_applies() {
        let body = r#"[
            { "name": "5.8.1", "platforms": [{ "name": "ubuntu2204", "archs": ["x86_64"] }] },
            { "name": "5.9.2", "platforms": [{ "name": "Ubuntu 22.04", "archs": ["x86_64"] }] }
        ]"#;
        let client = client(StaticTransport::default().with(RELEASES_URL, body), None);
        let filter = Selector::LatestPatch { major: 5, minor: 8 };
        let available = client
            .list_available(&ubuntu(Arch::X86_64), Some(&filter))
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].0, ToolchainVersion::release(5, 8, 1));
    }

    #[tokio::test]
    async fn newer_schema_is_rejected() {
        let body = r#"{ "schemaVersion": "2.0", "releases": [] }"#;
        let client = client(StaticTransport::default().with(RELEASES_URL, body), None);
        let err = client
            .list_available(&ubuntu(Arch::X86_64), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CatalogParse { .. }));
    }

    #[tokio::test]
    async fn unparsable_document_is_catalog_parse_error() {
        let client = client(StaticTransport::default().with(RELEASES_URL, "<html>"), None);
        let err = client
            .list_available(&ubuntu(Arch::X86_64), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CatalogParse { .. }));
    }

    #[tokio::test]
    async fn missing_release_catalog_is_network_error() {
        let client = client(StaticTransport::default(), None);
        let err = client
            .list_available(&ubuntu(Arch::X86_64), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Network { .. }));
    }

    #[tokio::test]
    async fn snapshots_come_from_branch_document() {
        let url = "https://www.swift.org/api/v1/install/dev/5.10/ubuntu2204.json";
        let body = r#"{
            "x86_64": [
                { "dir": "swift-5.10-DEVELOPMENT-SNAPSHOT-2024-01-30-a" },
                { "dir": "swift-5.10-DEVELOPMENT-SNAPSHOT-2024-02-15-a", "sha256": "ff" },
                { "dir": "swift-DEVELOPMENT-SNAPSHOT-2024-02-15-a" },
                { "nodir": true }
            ],
            "aarch64": []
        }"#;
        let client = client(StaticTransport::default().with(url, body), None);
        let filter = Selector::LatestReleaseSnapshot { major: 5, minor: 10 };
        let available = client
            .list_available(&ubuntu(Arch::X86_64), Some(&filter))
            .await
            .unwrap();

        let date = |d| NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
        assert_eq!(available.len(), 2);
        assert_eq!(available[0].0, ToolchainVersion::release_snapshot(5, 10, date(15)));
        assert_eq!(
            available[0].1.url,
            "https://download.swift.org/swift-5.10-branch/ubuntu2204/swift-5.10-DEVELOPMENT-SNAPSHOT-2024-02-15-a/swift-5.10-DEVELOPMENT-SNAPSHOT-2024-02-15-a-ubuntu22.04.tar.gz"
        );
    }

    #[tokio::test]
    async fn unknown_snapshot_branch_is_empty() {
        let client = client(StaticTransport::default(), None);
        let available = client
            .list_available(&ubuntu(Arch::X86_64), Some(&Selector::LatestMainSnapshot))
            .await
            .unwrap();
        assert!(available.is_empty());
    }

    #[tokio::test]
    async fn cache_serves_repeat_requests_and_discards_corrupt_files() {
        let temp = tempfile::tempdir().unwrap();
        let transport = Arc::new(StaticTransport::default().with(RELEASES_URL, RELEASES));
        let client = CatalogClient::new(
            Arc::clone(&transport),
            &Settings::default(),
            Some(temp.path().to_path_buf()),
        );
        let linux = ubuntu(Arch::X86_64);

        client.list_available(&linux, None).await.unwrap();
        client.list_available(&linux, None).await.unwrap();
        assert_eq!(transport.request_count(), 1);

        std::fs::write(temp.path().join("releases.json"), "{ truncated").unwrap();
        client.list_available(&linux, None).await.unwrap();
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn cache_writes_replace_the_document_whole() {
        let temp = tempfile::tempdir().unwrap();
        let cache_file = temp.path().join("cache").join("releases.json");
        let ttl = Duration::from_secs(3600);

        save_to_cache(&cache_file, RELEASES_URL, "first");
        save_to_cache(&cache_file, RELEASES_URL, "second");

        assert_eq!(
            load_from_cache(&cache_file, RELEASES_URL, ttl).as_deref(),
            Some("second")
        );
        let entries: Vec<_> = std::fs::read_dir(temp.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["releases.json"]);
    }

    #[test]
    fn failed_cache_write_keeps_previous_copy() {
        let temp = tempfile::tempdir().unwrap();
        let cache_file = temp.path().join("releases.json");
        std::fs::create_dir(&cache_file).unwrap();

        save_to_cache(&cache_file, RELEASES_URL, "body");

        assert!(cache_file.is_dir());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn release_names_normalise_to_three_components() {
        assert_eq!(parse_release_name("5.10"), Some(ToolchainVersion::release(5, 10, 0)));
        assert_eq!(parse_release_name("6.0.3"), Some(ToolchainVersion::release(6, 0, 3)));
        assert_eq!(parse_release_name("6"), None);
        assert_eq!(parse_release_name("6.x"), None);
    }
}
