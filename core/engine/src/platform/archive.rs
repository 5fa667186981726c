//! tar.gz extraction for toolchain archives.

use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{EngineError, Result};

/// Extracts a tar.gz archive into `dest_dir`.
///
/// If every entry shares one root folder and the archive has nested entries,
/// that folder is stripped (`swift-5.10-RELEASE-ubuntu22.04/usr/bin/swift`
/// becomes `usr/bin/swift`). Absolute paths and `..` components are rejected.
///
/// # Errors
///
/// Returns `ExtractionFailed` if the archive is unreadable or contains an
/// unsafe path, and `Io` if the destination cannot be written.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir).map_err(|e| {
        EngineError::io(
            format!("Failed to create directory: {}", dest_dir.display()),
            e,
        )
    })?;

    let strip_prefix = find_common_root_folder(archive_path)?;

    let mut archive = open_archive(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| unreadable(archive_path, &e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| unreadable(archive_path, &e))?;
        let entry_path = entry
            .path()
            .map_err(|e| unreadable(archive_path, &e))?
            .into_owned();

        if entry_path.is_absolute()
            || entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EngineError::extraction_failed(
                archive_path,
                format!(
                    "refusing to extract path with parent directory or absolute reference: {}",
                    entry_path.display()
                ),
            ));
        }

        let relative_path = match &strip_prefix {
            Some(prefix) => match entry_path.strip_prefix(prefix) {
                Ok(p) if p.as_os_str().is_empty() => continue,
                Ok(p) => p.to_path_buf(),
                Err(_) => entry_path.clone(),
            },
            None => entry_path.clone(),
        };

        let output_path = dest_dir.join(&relative_path);

        if entry.header().entry_type().is_dir() {
            create_dir(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                create_dir(parent)?;
            }
            entry.unpack(&output_path).map_err(|e| {
                EngineError::extraction_failed(
                    archive_path,
                    format!("failed to extract {}: {e}", output_path.display()),
                )
            })?;
        }
    }

    Ok(())
}

fn open_archive(archive_path: &Path) -> Result<Archive<GzDecoder<std::fs::File>>> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        EngineError::io(
            format!("Failed to open archive: {}", archive_path.display()),
            e,
        )
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn unreadable(archive_path: &Path, error: &std::io::Error) -> EngineError {
    EngineError::extraction_failed(archive_path, format!("failed to read tar entries: {error}"))
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        EngineError::io(format!("Failed to create directory: {}", path.display()), e)
    })
}

/// Returns the folder shared by all entries, but only when at least one
/// entry is nested below it. A lone flat file is not a root folder.
fn find_common_root_folder(archive_path: &Path) -> Result<Option<PathBuf>> {
    let mut archive = open_archive(archive_path)?;

    let mut common_root: Option<PathBuf> = None;
    let mut has_nested_entries = false;

    for entry in archive
        .entries()
        .map_err(|e| unreadable(archive_path, &e))?
    {
        let entry = entry.map_err(|e| unreadable(archive_path, &e))?;
        let path = entry.path().map_err(|e| unreadable(archive_path, &e))?;

        if path.components().count() > 1 {
            has_nested_entries = true;
        }

        let Some(first_component) = path.components().next() else {
            continue;
        };
        let root = PathBuf::from(first_component.as_os_str());

        match &common_root {
            None => common_root = Some(root),
            Some(existing) if existing != &root => return Ok(None),
            Some(_) => {}
        }
    }

    Ok(common_root.filter(|_| has_nested_entries))
}

/// Marks every regular file in `<toolchain>/usr/bin` executable.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be read or permissions cannot be set.
#[cfg(unix)]
pub fn set_executable_permissions(bin_dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !bin_dir.exists() {
        return Ok(());
    }
    let entries = std::fs::read_dir(bin_dir).map_err(|e| {
        EngineError::io(
            format!("Failed to read bin directory: {}", bin_dir.display()),
            e,
        )
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io("Failed to read directory entry", e))?;
        let path = entry.path();
        if path.is_file() {
            let mut perms = std::fs::metadata(&path)
                .map_err(|e| {
                    EngineError::io(format!("Failed to get metadata: {}", path.display()), e)
                })?
                .permissions();
            if perms.mode() & 0o111 == 0 {
                perms.set_mode(0o755);
                std::fs::set_permissions(&path, perms).map_err(|e| {
                    EngineError::io(format!("Failed to set permissions: {}", path.display()), e)
                })?;
            }
        }
    }
    Ok(())
}
