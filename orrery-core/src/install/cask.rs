// orrery-core/src/install/cask.rs
//! Disk-image installs: attach, copy the `.app` bundle, detach.
use std::fs;
use std::path::{Path, PathBuf};

use orrery_common::config::Config;
use orrery_common::error::{OrreryError, Result};
use orrery_common::model::{Formula, InstalledArtifact};
use tracing::{debug, error, warn};

use crate::process::{CommandRunner, CommandSpec};

fn step_failed(formula: &Formula, step: &str, reason: impl Into<String>) -> OrreryError {
    OrreryError::PostInstallStepFailed {
        formula: formula.name.clone(),
        step: step.to_string(),
        reason: reason.into(),
    }
}

async fn attach_dmg(
    formula: &Formula,
    dmg_path: &Path,
    mount_point: &Path,
    runner: &dyn CommandRunner,
) -> Result<()> {
    debug!("Mounting DMG {} at {}", dmg_path.display(), mount_point.display());
    let spec = CommandSpec::new("hdiutil").args([
        "attach".to_string(),
        "-nobrowse".to_string(),
        "-readonly".to_string(),
        "-mountpoint".to_string(),
        mount_point.display().to_string(),
        dmg_path.display().to_string(),
    ]);
    let output = runner
        .run(&spec)
        .await
        .map_err(|e| step_failed(formula, "hdiutil attach", e.to_string()))?;
    if !output.success() {
        error!("hdiutil attach failed for {}: {}", dmg_path.display(), output.stderr);
        return Err(step_failed(formula, "hdiutil attach", output.combined()));
    }
    Ok(())
}

async fn detach_dmg(mount_point: &Path, runner: &dyn CommandRunner) -> Result<()> {
    let mount = mount_point.display().to_string();
    let detach = CommandSpec::new("hdiutil").args(["detach", "-force", mount.as_str()]);
    match runner.run(&detach).await {
        Ok(out) if out.success() => {
            debug!("DMG successfully unmounted");
            return Ok(());
        }
        Ok(out) => debug!(
            "hdiutil detach failed ({}): {}. Trying diskutil...",
            out.status_string(),
            out.stderr.trim()
        ),
        Err(e) => debug!("hdiutil detach could not run: {e}. Trying diskutil..."),
    }
    let unmount = CommandSpec::new("diskutil").args(["unmount", "force", mount.as_str()]);
    let out = runner.run(&unmount).await?;
    if out.success() {
        Ok(())
    } else {
        Err(OrreryError::CommandExecError(format!(
            "Failed to unmount DMG at {}: {}",
            mount_point.display(),
            out.stderr.trim()
        )))
    }
}

/// Installs the cask's `.app` from `dmg_path` into the applications directory.
pub async fn install_app_from_dmg(
    formula: &Formula,
    dmg_path: &Path,
    config: &Config,
    runner: &dyn CommandRunner,
) -> Result<Vec<InstalledArtifact>> {
    let cask = formula
        .cask
        .as_ref()
        .ok_or_else(|| OrreryError::ValidationError(format!("'{}' is not a cask", formula.name)))?;

    fs::create_dir_all(config.tmp_dir())?;
    let mount_dir = tempfile::Builder::new()
        .prefix("orrery-dmg-")
        .tempdir_in(config.tmp_dir())?;
    let mount_point = mount_dir.path().to_path_buf();

    attach_dmg(formula, dmg_path, &mount_point, runner).await?;
    let copy_result = copy_app(formula, &cask.app, &mount_point, config, runner).await;
    let detach_result = detach_dmg(&mount_point, runner).await;

    let app_path = copy_result?;
    if let Err(e) = detach_result {
        warn!("[{}] {}", formula.name, e);
    }
    Ok(vec![InstalledArtifact::AppBundle { path: app_path }])
}

async fn copy_app(
    formula: &Formula,
    app_name: &str,
    mount_point: &Path,
    config: &Config,
    runner: &dyn CommandRunner,
) -> Result<PathBuf> {
    let source = mount_point.join(app_name);
    if !source.is_dir() {
        return Err(step_failed(
            formula,
            "copy app",
            format!("{app_name} not found in disk image"),
        ));
    }
    let applications = config.applications_dir();
    fs::create_dir_all(&applications)
        .map_err(|e| step_failed(formula, "copy app", e.to_string()))?;
    let destination = applications.join(app_name);
    if destination.exists() {
        warn!(
            "[{}] replacing existing {}",
            formula.name,
            destination.display()
        );
        fs::remove_dir_all(&destination)
            .map_err(|e| step_failed(formula, "copy app", e.to_string()))?;
    }

    // ditto keeps bundle metadata and extended attributes intact.
    let spec = CommandSpec::new("ditto").args([
        source.display().to_string(),
        destination.display().to_string(),
    ]);
    let output = runner
        .run(&spec)
        .await
        .map_err(|e| step_failed(formula, "copy app", e.to_string()))?;
    if !output.success() {
        return Err(step_failed(formula, "copy app", output.combined()));
    }
    debug!("Installed {}", destination.display());
    Ok(destination)
}
