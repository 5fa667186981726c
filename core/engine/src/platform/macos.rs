//! macOS hosts.
//!
//! Toolchains ship as signed `.pkg` installers. They are expanded with
//! `pkgutil` rather than installed system-wide, so each version lives in its
//! own bundle under the toolchains directory.

use std::path::{Path, PathBuf};

use super::{Platform, RunOptions, stage_and_promote, write_script};
use crate::error::{EngineError, Result};
use crate::version::{Architecture, OsFamily, PlatformDescriptor, ToolchainVersion};

const XCTOOLCHAIN_SUFFIX: &str = ".xctoolchain";

/// macOS hosts. Toolchains are signed `.pkg` installers, expanded into
/// `<tag>.xctoolchain` bundles.
#[derive(Debug, Clone)]
pub struct MacOs {
    descriptor: PlatformDescriptor,
}

impl MacOs {
    #[must_use]
    pub fn new(arch: Architecture) -> Self {
        Self {
            descriptor: PlatformDescriptor {
                os: OsFamily::MacOs,
                arch,
                name: "xcode".to_string(),
                name_full: "osx".to_string(),
                name_pretty: "macOS".to_string(),
                distribution: None,
            },
        }
    }

    fn check(&self, program: &str, args: &[&str], archive: &Path) -> Result<()> {
        let status = self.run_program(program, args, &RunOptions::quiet())?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::extraction_failed(
                archive,
                format!("`{program} {}` exited with {status}", args.join(" ")),
            ))
        }
    }

    fn unpack_pkg(
        &self,
        archive: &Path,
        version: Option<ToolchainVersion>,
        staging: &Path,
    ) -> Result<()> {
        let archive_str = archive.to_string_lossy();

        self.check("pkgutil", &["--check-signature", &*archive_str], archive)
            .map_err(|e| EngineError::signature_invalid(archive, e.to_string()))?;

        let scratch = tempfile::tempdir()
            .map_err(|e| EngineError::io("Failed to create temporary directory", e))?;
        // pkgutil refuses to expand into an existing directory.
        let expanded = scratch.path().join("expanded");
        let expanded_str = expanded.to_string_lossy();
        self.check(
            "pkgutil",
            &["--expand", &*archive_str, &*expanded_str],
            archive,
        )?;

        let payload = find_payload(&expanded, version).ok_or_else(|| {
            EngineError::extraction_failed(archive, "package has no Payload")
        })?;
        let payload_str = payload.to_string_lossy();
        let staging_str = staging.to_string_lossy();
        self.check("tar", &["-C", &*staging_str, "-xf", &*payload_str], archive)
    }
}

/// The payload sits at the package root, or inside the nested component
/// package `<tag>-osx-package.pkg`.
fn find_payload(expanded: &Path, version: Option<ToolchainVersion>) -> Option<PathBuf> {
    let direct = expanded.join("Payload");
    if direct.is_file() {
        return Some(direct);
    }
    if let Some(version) = version {
        let nested = expanded
            .join(format!("{}-osx-package.pkg", version.tag()))
            .join("Payload");
        if nested.is_file() {
            return Some(nested);
        }
    }
    std::fs::read_dir(expanded)
        .ok()?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path().join("Payload"))
        .find(|p| p.is_file())
}

impl Platform for MacOs {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    fn asset_directory(&self) -> String {
        self.descriptor.name.clone()
    }

    fn asset_file_name(&self, version: &ToolchainVersion) -> String {
        format!("{}-osx.pkg", version.tag())
    }

    fn snapshot_catalog_name(&self) -> String {
        "macos".to_string()
    }

    fn snapshot_arch_key(&self) -> &'static str {
        "universal"
    }

    fn lists_every_release(&self) -> bool {
        true
    }

    fn verifies_packages_natively(&self) -> bool {
        true
    }

    fn toolchain_dir_name(&self, version: &ToolchainVersion) -> String {
        format!("{}{XCTOOLCHAIN_SUFFIX}", version.tag())
    }

    fn version_from_dir_name(&self, name: &str) -> Option<ToolchainVersion> {
        ToolchainVersion::from_tag(name.strip_suffix(XCTOOLCHAIN_SUFFIX)?)
    }

    fn default_home_dir(&self) -> Result<PathBuf> {
        dirs::home_dir()
            .map(|d| d.join(".swup"))
            .ok_or_else(|| EngineError::unsupported_platform("cannot determine home directory"))
    }

    fn default_toolchains_dir(&self, _home: &Path) -> Result<PathBuf> {
        dirs::home_dir()
            .map(|d| d.join("Library").join("Developer").join("Toolchains"))
            .ok_or_else(|| EngineError::unsupported_platform("cannot determine home directory"))
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let version = destination
            .file_name()
            .and_then(|n| self.version_from_dir_name(&n.to_string_lossy()));
        stage_and_promote(archive, destination, |staging| {
            self.unpack_pkg(archive, version, staging)
        })
    }

    fn post_install_hook(
        &self,
        version: &ToolchainVersion,
        script_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let sdk_present = self
            .run_program(
                "xcrun",
                &["--show-sdk-path", "--sdk", "macosx"],
                &RunOptions::quiet(),
            )
            .is_ok_and(|status| status.success());
        if sdk_present {
            return Ok(None);
        }
        tracing::info!("no macOS SDK found; the toolchain needs the Xcode command line tools");
        write_script(
            script_dir,
            &format!("post-install-{version}.sh"),
            "xcode-select --install",
        )
        .map(Some)
    }
}
