// orrery-core/src/install/system.rs
//! Probes for dependencies the host provides.
use std::path::{Path, PathBuf};

use orrery_common::error::{OrreryError, Result};
use orrery_common::model::{Formula, SystemProbe};
use tracing::debug;

use crate::process::{CommandRunner, CommandSpec};

/// Checks that a `system` formula is present. Returns its install prefix when one can be discovered.
pub async fn probe_system_dependency(
    formula: &Formula,
    runner: &dyn CommandRunner,
) -> Result<Option<PathBuf>> {
    let missing = |reason: String| OrreryError::MissingSystemDependency {
        name: formula.name.clone(),
        reason,
    };
    let probe = formula
        .probe
        .as_ref()
        .ok_or_else(|| missing("no probe configured".to_string()))?;

    match probe {
        SystemProbe::Binary { binary } => {
            let path = which::which(binary)
                .map_err(|e| missing(format!("'{binary}' not found on PATH: {e}")))?;
            debug!("[{}] found {}", formula.name, path.display());
            Ok(prefix_of_binary(&path))
        }
        SystemProbe::PkgConfig { pkg_config } => {
            let exists = CommandSpec::new("pkg-config").args(["--exists", pkg_config.as_str()]);
            let output = runner
                .run(&exists)
                .await
                .map_err(|e| missing(format!("cannot run pkg-config: {e}")))?;
            if !output.success() {
                return Err(missing(format!(
                    "pkg-config module '{pkg_config}' not found"
                )));
            }
            let variable = CommandSpec::new("pkg-config")
                .args(["--variable=prefix", pkg_config.as_str()]);
            let prefix = match runner.run(&variable).await {
                Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
                    Some(PathBuf::from(out.stdout.trim()))
                }
                _ => None,
            };
            debug!("[{}] pkg-config prefix {:?}", formula.name, prefix);
            Ok(prefix)
        }
        SystemProbe::Path { path } => {
            if path.exists() {
                Ok(Some(path.clone()))
            } else {
                Err(missing(format!("{} does not exist", path.display())))
            }
        }
    }
}

// /usr/local/bin/cmake -> /usr/local
fn prefix_of_binary(path: &Path) -> Option<PathBuf> {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let bin_dir = resolved.parent()?;
    if bin_dir.file_name().is_some_and(|n| n == "bin") {
        bin_dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}
