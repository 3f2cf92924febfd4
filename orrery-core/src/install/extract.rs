// orrery-core/src/install/extract.rs
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use orrery_common::error::{OrreryError, Result};
use tar::{Archive, EntryType};
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;

/// Compression of a tar archive, from its file name or, failing that, its magic bytes.
pub fn detect_archive_type(archive_path: &Path) -> Result<&'static str> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let by_name = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some("gz")
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some("xz")
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
        Some("bz2")
    } else if name.ends_with(".tar") {
        Some("tar")
    } else {
        None
    };
    if let Some(kind) = by_name {
        return Ok(kind);
    }

    match infer::get_from_path(archive_path)?.map(|k| k.extension()) {
        Some("gz") => Ok("gz"),
        Some("xz") => Ok("xz"),
        Some("bz2") => Ok("bz2"),
        Some("tar") => Ok("tar"),
        other => Err(OrreryError::Extract(format!(
            "Unsupported archive type {:?} for {}",
            other,
            archive_path.display()
        ))),
    }
}

fn open_decoded(archive_path: &Path, archive_type: &str) -> Result<Box<dyn Read>> {
    let file = File::open(archive_path).map_err(|e| {
        OrreryError::Extract(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;
    Ok(match archive_type {
        "gz" => Box::new(GzDecoder::new(file)),
        "bz2" => Box::new(BzDecoder::new(file)),
        "xz" => Box::new(XzDecoder::new(file)),
        "tar" => Box::new(file),
        other => {
            return Err(OrreryError::Extract(format!(
                "Unsupported archive type '{}' for {}",
                other,
                archive_path.display()
            )))
        }
    })
}

/// The single top-level directory shared by every entry, if there is one.
/// A lone top-level file is not a root directory.
pub fn infer_archive_root_dir(archive_path: &Path, archive_type: &str) -> Result<Option<PathBuf>> {
    debug!(
        "Inferring root directory for archive: {}",
        archive_path.display()
    );
    let mut archive = Archive::new(open_decoded(archive_path, archive_type)?);
    let mut root: Option<PathBuf> = None;
    let mut root_is_dir = false;

    for entry_result in archive.entries()? {
        let entry = entry_result.map_err(|e| {
            OrreryError::Extract(format!(
                "Error reading TAR entry from {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        // pax global headers carry no path of their own
        if entry.header().entry_type() == EntryType::XGlobalHeader {
            continue;
        }
        let path = entry.path()?.into_owned();
        // "./name/..." style entries
        let components: Vec<Component<'_>> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let name = match components.first() {
            None => continue,
            Some(Component::Normal(name)) => PathBuf::from(name),
            Some(other) => {
                debug!(
                    "Non-standard top-level component ({:?}) in {}",
                    other,
                    archive_path.display()
                );
                return Ok(None);
            }
        };
        match &root {
            Some(existing) if *existing != name => {
                debug!(
                    "Multiple top-level items found in {}, no single root.",
                    archive_path.display()
                );
                return Ok(None);
            }
            Some(_) => {}
            None => root = Some(name),
        }
        if components.len() > 1 || entry.header().entry_type() == EntryType::Directory {
            root_is_dir = true;
        }
    }

    match root {
        None => {
            warn!("Archive {} appears to be empty.", archive_path.display());
            Ok(None)
        }
        Some(root) if root_is_dir => Ok(Some(root)),
        Some(root) => {
            debug!(
                "Only top-level item {} in {} is a file, not stripping",
                root.display(),
                archive_path.display()
            );
            Ok(None)
        }
    }
}

/// Extracts `archive_path` into `target_dir`, dropping the first `strip_components` path parts.
pub fn extract_archive(
    archive_path: &Path,
    target_dir: &Path,
    strip_components: usize,
    archive_type: &str,
) -> Result<()> {
    debug!(
        "Extracting archive '{}' (type: {}) to '{}' (strip_components={})",
        archive_path.display(),
        archive_type,
        target_dir.display(),
        strip_components
    );
    fs::create_dir_all(target_dir)?;

    let mut archive = Archive::new(open_decoded(archive_path, archive_type)?);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut deferred_hardlinks: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result.map_err(|e| {
            OrreryError::Extract(format!(
                "Error reading TAR entry from {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        if entry.header().entry_type() == EntryType::XGlobalHeader {
            continue;
        }
        let original = entry.path()?.into_owned();
        let Some(dest) = stripped_destination(&original, target_dir, strip_components, &mut errors)
        else {
            continue;
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.header().entry_type() == EntryType::Link {
            match entry.link_name() {
                Ok(Some(link_target)) => {
                    deferred_hardlinks.push((dest, link_target.into_owned()));
                }
                _ => errors.push(format!(
                    "Hardlink entry '{}' has no target",
                    original.display()
                )),
            }
            continue;
        }

        if let Err(e) = entry.unpack(&dest) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                let msg = format!(
                    "Failed to unpack {} to {}: {}",
                    original.display(),
                    dest.display(),
                    e
                );
                error!("{}", msg);
                errors.push(msg);
            }
        }
    }

    // Hardlink targets must exist before the link can be made.
    for (link_path, target_in_archive) in deferred_hardlinks {
        let Some(target) =
            stripped_destination(&target_in_archive, target_dir, strip_components, &mut errors)
        else {
            continue;
        };
        if link_path.symlink_metadata().is_ok() {
            let _ = fs::remove_file(&link_path);
        }
        if let Err(e) = fs::hard_link(&target, &link_path) {
            errors.push(format!(
                "Failed to create hardlink '{}' -> '{}': {}",
                link_path.display(),
                target.display(),
                e
            ));
        }
    }

    if !errors.is_empty() {
        return Err(OrreryError::Extract(format!(
            "Failed during extraction of {} with {} error(s): {}",
            archive_path.display(),
            errors.len(),
            errors.join("; ")
        )));
    }
    debug!("Finished extraction of {}", archive_path.display());
    Ok(())
}

// Maps an archive path onto disk below `target_dir`, refusing anything that escapes it.
fn stripped_destination(
    original: &Path,
    target_dir: &Path,
    strip_components: usize,
    errors: &mut Vec<String>,
) -> Option<PathBuf> {
    let kept: Vec<Component<'_>> = original
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(strip_components)
        .collect();
    if kept.is_empty() {
        return None;
    }
    let mut dest = target_dir.to_path_buf();
    for comp in kept {
        match comp {
            Component::Normal(p) => dest.push(p),
            other => {
                let msg = format!(
                    "Disallowed component {:?} in archive path {}",
                    other,
                    original.display()
                );
                error!("{}", msg);
                errors.push(msg);
                return None;
            }
        }
    }
    Some(dest)
}

/// Unpacks a source archive into `build_dir` and returns the directory holding the sources.
/// A single top-level directory is stripped.
pub fn extract_source(archive_path: &Path, build_dir: &Path) -> Result<PathBuf> {
    let archive_type = detect_archive_type(archive_path)?;
    let strip = match infer_archive_root_dir(archive_path, archive_type)? {
        Some(root) => {
            debug!("Stripping top-level directory {}", root.display());
            1
        }
        None => 0,
    };
    extract_archive(archive_path, build_dir, strip, archive_type)?;
    Ok(build_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn strips_single_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("indi-2.0.6.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("indi-2.0.6/CMakeLists.txt", "project(indi)"),
                ("indi-2.0.6/libindi/CMakeLists.txt", "add_library()"),
            ],
        );
        assert_eq!(detect_archive_type(&archive).unwrap(), "gz");
        let build = dir.path().join("build");
        let src = extract_source(&archive, &build).unwrap();
        assert!(src.join("CMakeLists.txt").is_file());
        assert!(src.join("libindi/CMakeLists.txt").is_file());
        assert!(!src.join("indi-2.0.6").exists());
    }

    #[test]
    fn keeps_layout_when_there_are_several_roots() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.tgz");
        write_tar_gz(&archive, &[("a/one", "1"), ("b/two", "2")]);
        let build = dir.path().join("build");
        extract_source(&archive, &build).unwrap();
        assert!(build.join("a/one").is_file());
        assert!(build.join("b/two").is_file());
    }

    #[test]
    fn lone_top_level_file_is_not_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool-1.0.tar.gz");
        write_tar_gz(&archive, &[("Makefile", "all:\n")]);
        assert_eq!(infer_archive_root_dir(&archive, "gz").unwrap(), None);

        let build = dir.path().join("build");
        let src = extract_source(&archive, &build).unwrap();
        assert!(src.join("Makefile").is_file());
    }

    #[test]
    fn sniffs_type_when_name_has_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("download");
        write_tar_gz(&archive, &[("x/y", "z")]);
        assert_eq!(detect_archive_type(&archive).unwrap(), "gz");
    }
}
