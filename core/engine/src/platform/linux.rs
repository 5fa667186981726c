//! Linux hosts.
//!
//! The distribution is read from `os-release` and mapped to one of the
//! published targets. Toolchains are `.tar.gz` archives with a single root
//! folder, and a post-install script lists the system packages a toolchain
//! needs that the package manager reports as missing.

use std::path::{Path, PathBuf};

use super::{Platform, RunOptions, archive, stage_and_promote, write_script};
use crate::error::{EngineError, Result};
use crate::version::{
    Architecture, LinuxDistribution, OsFamily, PlatformDescriptor, ToolchainVersion,
};

const OS_RELEASE_FILES: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// A Linux distribution toolchains are published for.
struct Target {
    name: &'static str,
    name_full: &'static str,
    name_pretty: &'static str,
    manager: PackageManager,
    packages: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    fn install_command(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Yum => "yum",
        }
    }

    /// Query program and flag that succeed iff a package is installed.
    fn query(self) -> (&'static str, &'static str) {
        match self {
            Self::Apt => ("dpkg", "-s"),
            Self::Yum => ("rpm", "-q"),
        }
    }
}

const TARGETS: &[Target] = &[
    Target {
        name: "ubuntu1804",
        name_full: "ubuntu18.04",
        name_pretty: "Ubuntu 18.04",
        manager: PackageManager::Apt,
        packages: &[
            "binutils",
            "git",
            "libc6-dev",
            "libcurl4-openssl-dev",
            "libedit2",
            "libgcc-5-dev",
            "libpython3.6",
            "libsqlite3-0",
            "libstdc++-5-dev",
            "libxml2-dev",
            "pkg-config",
            "tzdata",
            "zlib1g-dev",
        ],
    },
    Target {
        name: "ubuntu2004",
        name_full: "ubuntu20.04",
        name_pretty: "Ubuntu 20.04",
        manager: PackageManager::Apt,
        packages: &[
            "binutils",
            "git",
            "gnupg2",
            "libc6-dev",
            "libcurl4-openssl-dev",
            "libedit2",
            "libgcc-9-dev",
            "libpython3.8",
            "libsqlite3-0",
            "libstdc++-9-dev",
            "libxml2-dev",
            "libz3-dev",
            "pkg-config",
            "tzdata",
            "zlib1g-dev",
        ],
    },
    Target {
        name: "ubuntu2204",
        name_full: "ubuntu22.04",
        name_pretty: "Ubuntu 22.04",
        manager: PackageManager::Apt,
        packages: &[
            "binutils",
            "git",
            "gnupg2",
            "libc6-dev",
            "libcurl4-openssl-dev",
            "libedit2",
            "libgcc-11-dev",
            "libpython3-dev",
            "libsqlite3-0",
            "libstdc++-11-dev",
            "libxml2-dev",
            "libz3-dev",
            "pkg-config",
            "tzdata",
            "zlib1g-dev",
        ],
    },
    Target {
        name: "ubuntu2404",
        name_full: "ubuntu24.04",
        name_pretty: "Ubuntu 24.04",
        manager: PackageManager::Apt,
        packages: &[
            "binutils",
            "git",
            "gnupg2",
            "libc6-dev",
            "libcurl4-openssl-dev",
            "libedit2",
            "libgcc-13-dev",
            "libncurses-dev",
            "libpython3-dev",
            "libsqlite3-0",
            "libstdc++-13-dev",
            "libxml2-dev",
            "libz3-dev",
            "pkg-config",
            "tzdata",
            "zlib1g-dev",
        ],
    },
    Target {
        name: "debian12",
        name_full: "debian12",
        name_pretty: "Debian 12",
        manager: PackageManager::Apt,
        packages: &[
            "binutils",
            "gcc",
            "git",
            "libcurl4-openssl-dev",
            "libedit-dev",
            "libicu-dev",
            "libncurses-dev",
            "libpython3-dev",
            "libsqlite3-dev",
            "libstdc++-12-dev",
            "libxml2-dev",
            "pkg-config",
            "tzdata",
            "uuid-dev",
        ],
    },
    Target {
        name: "fedora39",
        name_full: "fedora39",
        name_pretty: "Fedora 39",
        manager: PackageManager::Yum,
        packages: &[
            "binutils",
            "gcc",
            "git",
            "libcurl-devel",
            "libedit-devel",
            "libicu-devel",
            "libstdc++-devel",
            "libstdc++-static",
            "libuuid-devel",
            "libxml2-devel",
            "python3-devel",
            "sqlite-devel",
        ],
    },
    Target {
        name: "ubi9",
        name_full: "ubi9",
        name_pretty: "Red Hat Universal Base Image 9",
        manager: PackageManager::Yum,
        packages: &[
            "gcc-c++",
            "git",
            "libcurl-devel",
            "libedit-devel",
            "libuuid-devel",
            "libxml2-devel",
            "ncurses-devel",
            "python3-devel",
            "sqlite-devel",
        ],
    },
    Target {
        name: "amazonlinux2",
        name_full: "amazonlinux2",
        name_pretty: "Amazon Linux 2",
        manager: PackageManager::Yum,
        packages: &[
            "binutils",
            "gcc",
            "git",
            "glibc-static",
            "libcurl-devel",
            "libedit",
            "libicu",
            "libstdc++-static",
            "libuuid",
            "libxml2-devel",
            "openssl-devel",
            "tzdata",
            "zlib-devel",
        ],
    },
];

fn target_named(name: &str) -> Option<&'static Target> {
    TARGETS.iter().find(|t| t.name == name)
}

/// Linux hosts. Toolchains are `.tar.gz` archives stored under their canonical
/// version name.
#[derive(Debug, Clone)]
pub struct Linux {
    descriptor: PlatformDescriptor,
}

impl Linux {
    /// Reads `/etc/os-release` (or `/usr/lib/os-release`) to identify the host.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if no release file exists or it names a
    /// distribution without published toolchains.
    pub fn detect(arch: Architecture) -> Result<Self> {
        for file in OS_RELEASE_FILES {
            if let Ok(content) = std::fs::read_to_string(file) {
                tracing::debug!(file, "detecting Linux distribution");
                return Self::from_os_release(&content, arch);
            }
        }
        Err(EngineError::unsupported_platform(
            "unable to detect the Linux distribution: no os-release file found",
        ))
    }

    /// Identifies the distribution from `os-release` contents.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` for unknown or unsupported distributions.
    pub fn from_os_release(content: &str, arch: Architecture) -> Result<Self> {
        let mut id = None;
        let mut id_like = String::new();
        let mut version_id = None;
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => id = Some(value.to_string()),
                "ID_LIKE" => id_like = value.to_string(),
                "VERSION_ID" => version_id = Some(value.to_string()),
                _ => {}
            }
        }

        let (Some(id), Some(version)) = (id, version_id) else {
            return Err(EngineError::unsupported_platform(
                "os-release does not declare ID and VERSION_ID",
            ));
        };
        let compact_version = version.replace('.', "");
        let family = format!("{id} {id_like}");

        let target = if family.contains("amzn") {
            if compact_version != "2" {
                return Err(EngineError::unsupported_platform(format!(
                    "Amazon Linux {version}; only Amazon Linux 2 is supported"
                )));
            }
            target_named("amazonlinux2")
        } else if family.contains("rhel") {
            if !compact_version.starts_with('9') {
                return Err(EngineError::unsupported_platform(format!(
                    "RHEL {version}; only RHEL 9 is supported"
                )));
            }
            target_named("ubi9")
        } else {
            target_named(&format!("{id}{compact_version}"))
        };

        let target = target.ok_or_else(|| {
            EngineError::unsupported_platform(format!("Linux distribution {id} {version}"))
        })?;

        Ok(Self::with_target(
            target,
            arch,
            Some(LinuxDistribution { id, version }),
        ))
    }

    /// Rebuilds a Linux platform from a recorded descriptor.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if the descriptor names an unknown target.
    pub fn from_descriptor(descriptor: &PlatformDescriptor) -> Result<Self> {
        let target = target_named(&descriptor.name).ok_or_else(|| {
            EngineError::unsupported_platform(format!("unknown Linux target {}", descriptor.name))
        })?;
        Ok(Self::with_target(
            target,
            descriptor.arch,
            descriptor.distribution.clone(),
        ))
    }

    fn with_target(
        target: &Target,
        arch: Architecture,
        distribution: Option<LinuxDistribution>,
    ) -> Self {
        Self {
            descriptor: PlatformDescriptor {
                os: OsFamily::Linux,
                arch,
                name: target.name.to_string(),
                name_full: target.name_full.to_string(),
                name_pretty: target.name_pretty.to_string(),
                distribution,
            },
        }
    }

    fn target(&self) -> Option<&'static Target> {
        target_named(&self.descriptor.name)
    }

    fn arch_suffix(&self) -> &'static str {
        match self.descriptor.arch {
            Architecture::X86_64 => "",
            Architecture::Aarch64 => "-aarch64",
        }
    }

    /// System packages the toolchain needs that `is_installed` reports missing.
    fn missing_packages(&self, is_installed: impl Fn(&str) -> bool) -> Vec<&'static str> {
        self.target()
            .map(|t| {
                t.packages
                    .iter()
                    .copied()
                    .filter(|p| !is_installed(*p))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_package_installed(&self, manager: PackageManager, package: &str) -> bool {
        let (program, flag) = manager.query();
        self.run_program(program, &[flag, package], &RunOptions::quiet())
            .is_ok_and(|status| status.success())
    }
}

impl Platform for Linux {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    fn asset_directory(&self) -> String {
        format!("{}{}", self.descriptor.name, self.arch_suffix())
    }

    fn asset_file_name(&self, version: &ToolchainVersion) -> String {
        format!(
            "{}-{}{}.tar.gz",
            version.tag(),
            self.descriptor.name_full,
            self.arch_suffix()
        )
    }

    fn toolchain_dir_name(&self, version: &ToolchainVersion) -> String {
        version.to_string()
    }

    fn version_from_dir_name(&self, name: &str) -> Option<ToolchainVersion> {
        name.parse().ok()
    }

    fn default_home_dir(&self) -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("swup"))
            .ok_or_else(|| EngineError::unsupported_platform("cannot determine data directory"))
    }

    fn default_toolchains_dir(&self, home: &Path) -> Result<PathBuf> {
        Ok(home.join("toolchains"))
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        stage_and_promote(archive, destination, |staging| {
            archive::extract_tar_gz(archive, staging)?;
            #[cfg(unix)]
            archive::set_executable_permissions(&self.toolchain_bin_dir(staging))?;
            Ok(())
        })
    }

    fn post_install_hook(
        &self,
        version: &ToolchainVersion,
        script_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let Some(target) = self.target() else {
            return Ok(None);
        };
        let (query_program, _) = target.manager.query();
        if which::which(query_program).is_err() {
            tracing::debug!(
                program = query_program,
                "package query tool not found; skipping dependency check"
            );
            return Ok(None);
        }

        let missing = self.missing_packages(|p| self.is_package_installed(target.manager, p));
        if missing.is_empty() {
            return Ok(None);
        }
        tracing::info!(?missing, "toolchain dependencies are missing");
        let command = format!(
            "{} -y install {}",
            target.manager.install_command(),
            missing.join(" ")
        );
        write_script(
            script_dir,
            &format!("post-install-{version}.sh"),
            &command,
        )
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ubuntu(arch: Architecture) -> Linux {
        Linux::from_os_release(
            "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n",
            arch,
        )
        .unwrap()
    }

    #[test]
    fn detects_ubuntu() {
        let linux = ubuntu(Architecture::X86_64);
        let d = linux.descriptor();
        assert_eq!(d.name, "ubuntu2204");
        assert_eq!(d.name_full, "ubuntu22.04");
        assert_eq!(d.name_pretty, "Ubuntu 22.04");
        assert_eq!(
            d.distribution,
            Some(LinuxDistribution {
                id: "ubuntu".to_string(),
                version: "22.04".to_string()
            })
        );
    }

    #[test]
    fn detects_rhel_like_and_amazon() {
        let rocky = Linux::from_os_release(
            "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.3\"\n",
            Architecture::X86_64,
        )
        .unwrap();
        assert_eq!(rocky.descriptor().name, "ubi9");

        let amazon = Linux::from_os_release(
            "ID=\"amzn\"\nID_LIKE=\"centos rhel fedora\"\nVERSION_ID=\"2\"\n",
            Architecture::Aarch64,
        )
        .unwrap();
        assert_eq!(amazon.descriptor().name, "amazonlinux2");
    }

    #[test]
    fn rejects_unsupported_distributions() {
        for content in [
            "ID=arch\nVERSION_ID=rolling\n",
            "ID=ubuntu\nVERSION_ID=\"16.04\"\n",
            "ID=amzn\nVERSION_ID=\"2023\"\n",
            "ID=\"rhel\"\nVERSION_ID=\"8.9\"\n",
            "NAME=nothing useful\n",
        ] {
            let err = Linux::from_os_release(content, Architecture::X86_64).unwrap_err();
            assert!(
                matches!(err, EngineError::UnsupportedPlatform { .. }),
                "{content:?} should be unsupported"
            );
        }
    }

    #[test]
    fn asset_names_follow_download_layout() {
        let version = ToolchainVersion::release(5, 10, 0);
        let x86 = ubuntu(Architecture::X86_64);
        assert_eq!(x86.asset_directory(), "ubuntu2204");
        assert_eq!(
            x86.asset_file_name(&version),
            "swift-5.10-RELEASE-ubuntu22.04.tar.gz"
        );

        let arm = ubuntu(Architecture::Aarch64);
        assert_eq!(arm.asset_directory(), "ubuntu2204-aarch64");
        assert_eq!(
            arm.asset_file_name(&version),
            "swift-5.10-RELEASE-ubuntu22.04-aarch64.tar.gz"
        );

        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            x86.asset_file_name(&ToolchainVersion::main_snapshot(date)),
            "swift-DEVELOPMENT-SNAPSHOT-2024-01-31-a-ubuntu22.04.tar.gz"
        );
    }

    #[test]
    fn toolchain_dirs_use_canonical_names() {
        let linux = ubuntu(Architecture::X86_64);
        let version = ToolchainVersion::release(5, 9, 2);
        let name = linux.toolchain_dir_name(&version);
        assert_eq!(name, "5.9.2");
        assert_eq!(linux.version_from_dir_name(&name), Some(version));
        assert_eq!(linux.version_from_dir_name(".staging-5.9.2"), None);
        assert_eq!(linux.version_from_dir_name("notes.txt"), None);
    }

    #[test]
    fn descriptor_round_trips_through_platform_for() {
        let linux = ubuntu(Architecture::Aarch64);
        let rebuilt = super::super::platform_for(linux.descriptor()).unwrap();
        assert_eq!(rebuilt.descriptor(), linux.descriptor());
    }

    #[test]
    fn missing_packages_reports_only_absent_ones() {
        let linux = ubuntu(Architecture::X86_64);
        let missing = linux.missing_packages(|p| p != "git" && p != "tzdata");
        assert_eq!(missing, vec!["git", "tzdata"]);
        assert!(linux.missing_packages(|_| true).is_empty());
    }

    #[test]
    fn extract_promotes_tar_gz_contents() {
        let temp = tempfile::tempdir().unwrap();
        let archive_path = temp.path().join("swift.tar.gz");
        archive::tests::write_tar_gz(
            &archive_path,
            &[("swift-5.10-RELEASE-ubuntu22.04/usr/bin/swift", b"bin".as_slice())],
        );
        let dest = temp.path().join("toolchains").join("5.10.0");

        ubuntu(Architecture::X86_64)
            .extract(&archive_path, &dest)
            .unwrap();

        assert!(dest.join("usr/bin/swift").is_file());
        assert!(!temp.path().join("toolchains").join(".staging-5.10.0").exists());
    }
}
