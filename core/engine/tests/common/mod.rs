//! In-memory release server shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ed25519_dalek::{Signer, SigningKey};
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use swup_engine::platform::Linux;
use swup_engine::version::Architecture;
use swup_engine::{
    DownloadStream, Engine, InitOptions, Platform, Settings, SwupPaths, ToolchainVersion,
    Transport, TransportError,
};

pub const DIST_SERVER: &str = "https://dist.test";
pub const DOWNLOAD_SERVER: &str = "https://download.test";
const RELEASES_URL: &str = "https://dist.test/api/v1/install/releases.json";
const SNAPSHOTS_PREFIX: &str = "https://dist.test/api/v1/install/dev/";

/// Serves the releases document, per-branch snapshot documents and signed
/// tar.gz archives for every published version.
pub struct FakeServer {
    key: SigningKey,
    releases: Mutex<Vec<ToolchainVersion>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    corrupted: Mutex<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            key: SigningKey::from_bytes(&[9u8; 32]),
            releases: Mutex::new(Vec::new()),
            archives: Mutex::new(HashMap::new()),
            corrupted: Mutex::new(HashSet::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }

    pub fn publish(&self, version: ToolchainVersion) {
        self.archives
            .lock()
            .unwrap()
            .insert(version.tag(), toolchain_archive(&version));
        self.releases.lock().unwrap().push(version);
    }

    /// Serves the archive of `version` with one flipped bit; the signature
    /// still covers the original.
    pub fn corrupt(&self, version: ToolchainVersion) {
        self.corrupted.lock().unwrap().insert(version.tag());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    fn releases_document(&self) -> String {
        let releases: Vec<serde_json::Value> = self
            .releases
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.is_release())
            .map(|v| {
                serde_json::json!({
                    "name": v.to_string(),
                    "platforms": [{ "name": "Ubuntu 22.04", "platform": "Linux", "archs": ["x86_64", "aarch64"] }]
                })
            })
            .collect();
        serde_json::json!({ "schemaVersion": 1, "releases": releases }).to_string()
    }

    /// The snapshot document for a branch (`main`, `6.0`), keyed by
    /// architecture like the upstream one. `None` for a branch with nothing
    /// published.
    fn snapshots_document(&self, branch: &str) -> Option<String> {
        let entries: Vec<serde_json::Value> = self
            .releases
            .lock()
            .unwrap()
            .iter()
            .filter(|v| match v {
                ToolchainVersion::Snapshot(s) => s.branch.catalog_name() == branch,
                ToolchainVersion::Release(_) => false,
            })
            .map(|v| serde_json::json!({ "dir": v.tag() }))
            .collect();
        (!entries.is_empty()).then(|| serde_json::json!({ "x86_64": entries }).to_string())
    }

    fn archive_for(&self, url: &str) -> Option<(String, Vec<u8>)> {
        self.archives
            .lock()
            .unwrap()
            .iter()
            .find(|(tag, _)| url.contains(&format!("/{tag}/")))
            .map(|(tag, bytes)| (tag.clone(), bytes.clone()))
    }
}

fn not_found(url: &str) -> TransportError {
    TransportError::Status {
        url: url.to_string(),
        status: 404,
    }
}

impl Transport for FakeServer {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        if url == RELEASES_URL {
            return Ok(self.releases_document());
        }
        url.strip_prefix(SNAPSHOTS_PREFIX)
            .and_then(|rest| rest.strip_suffix("/ubuntu2204.json"))
            .and_then(|branch| self.snapshots_document(branch))
            .ok_or_else(|| not_found(url))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let archive = url
            .strip_suffix(".sig")
            .and_then(|archive_url| self.archive_for(archive_url));
        match archive {
            Some((_, bytes)) => {
                let digest: [u8; 32] = Sha256::digest(&bytes).into();
                Ok(self.key.sign(&digest).to_bytes().to_vec())
            }
            None => Err(not_found(url)),
        }
    }

    async fn open(&self, url: &str, offset: u64) -> Result<DownloadStream, TransportError> {
        let Some((tag, mut bytes)) = self.archive_for(url) else {
            return Err(not_found(url));
        };
        self.downloads.lock().unwrap().push(url.to_string());
        if self.corrupted.lock().unwrap().contains(&tag)
            && let Some(last) = bytes.last_mut()
        {
            *last ^= 0x01;
        }
        let rest = bytes.split_off(usize::try_from(offset).unwrap().min(bytes.len()));
        Ok(DownloadStream {
            content_length: Some(rest.len() as u64),
            resumed: offset > 0,
            body: futures_util::stream::iter(
                rest.chunks(512).map(|c| Ok(c.to_vec())).collect::<Vec<_>>(),
            )
            .boxed(),
        })
    }
}

/// A tar.gz shaped like an upstream toolchain: one root folder holding
/// `usr/bin/swift`.
pub fn toolchain_archive(version: &ToolchainVersion) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let script = format!("#!/bin/sh\necho 'Swift version {version}'\n");
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            format!("{}-ubuntu22.04/usr/bin/swift", version.tag()),
            script.as_bytes(),
        )
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn ubuntu() -> Arc<dyn Platform> {
    Arc::new(
        Linux::from_os_release(
            "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n",
            Architecture::X86_64,
        )
        .unwrap(),
    )
}

pub struct Harness {
    pub temp: tempfile::TempDir,
    pub server: Arc<FakeServer>,
    pub engine: Engine<FakeServer>,
}

impl Harness {
    pub fn paths(&self) -> &SwupPaths {
        self.engine.paths()
    }

    pub fn toolchain_dir(&self, version: &ToolchainVersion) -> PathBuf {
        self.paths()
            .toolchain_dir(&self.engine.platform().toolchain_dir_name(version))
    }

    /// Non-hidden entries of the toolchains directory.
    pub fn store_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.paths().toolchains)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|n| !n.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// An engine over a fresh home directory, not yet initialized.
pub fn harness(published: &[ToolchainVersion]) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let server = Arc::new(FakeServer::new());
    for version in published {
        server.publish(*version);
    }
    let settings = Settings {
        dist_server: DIST_SERVER.to_string(),
        download_server: DOWNLOAD_SERVER.to_string(),
        lock_timeout_secs: 5,
        catalog_cache_ttl_secs: 0,
        trusted_keys: vec![server.public_key_hex()],
        ..Settings::default()
    };
    let engine = Engine::new(
        SwupPaths::with_home(temp.path().join("swup")),
        settings,
        ubuntu(),
        Arc::clone(&server),
    )
    .unwrap()
    .with_retry_base_delay(Duration::from_millis(1));
    Harness {
        temp,
        server,
        engine,
    }
}

/// Like [`harness`], with `init` run and nothing installed.
pub async fn initialized(published: &[ToolchainVersion]) -> Harness {
    let h = harness(published);
    h.engine
        .init(&InitOptions {
            skip_install: true,
            ..InitOptions::default()
        })
        .await
        .unwrap();
    h
}
