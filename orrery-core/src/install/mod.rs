// orrery-core/src/install/mod.rs
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use orrery_common::config::Config;
use orrery_common::error::{OrreryError, Result};
use tracing::debug;

pub mod cask;
pub mod devtools;
pub mod extract;
pub mod system;

/// Points `opt/<name>` at `keg`, replacing whatever was there.
pub fn link_opt(config: &Config, name: &str, keg: &Path) -> Result<PathBuf> {
    let opt_link_path = config.formula_opt_path(name);
    if let Some(parent) = opt_link_path.parent() {
        fs::create_dir_all(parent)?;
    }
    remove_existing_link_target(&opt_link_path)?;
    unix_fs::symlink(keg, &opt_link_path).map_err(|e| {
        OrreryError::Io(Arc::new(std::io::Error::new(
            e.kind(),
            format!("Failed to create opt symlink for {name}: {e}"),
        )))
    })?;
    debug!(
        "Linked opt path: {} -> {}",
        opt_link_path.display(),
        keg.display()
    );
    Ok(opt_link_path)
}

/// Removes a file, symlink or directory tree at `path`, if any.
pub fn remove_existing_link_target(path: &Path) -> Result<()> {
    match path.symlink_metadata() {
        Ok(metadata) => {
            debug!("Removing existing item at {}", path.display());
            let file_type = metadata.file_type();
            if file_type.is_dir() && !file_type.is_symlink() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrreryError::Io(Arc::new(e))),
    }
}
