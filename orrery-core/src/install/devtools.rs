// orrery-core/src/install/devtools.rs
use orrery_common::dependency::Requirement;
use orrery_common::error::{OrreryError, Result};
use orrery_common::model::Formula;
use tracing::debug;

use crate::process::{CommandRunner, CommandSpec};

/// Host macOS product version (`sw_vers -productVersion`), `None` off macOS or when it cannot be read.
pub async fn get_macos_version(runner: &dyn CommandRunner) -> Option<String> {
    if !cfg!(target_os = "macos") {
        debug!("Not on macOS, no product version");
        return None;
    }
    let spec = CommandSpec::new("sw_vers").arg("-productVersion");
    match runner.run(&spec).await {
        Ok(out) if out.success() => {
            let version = out.stdout.trim().to_string();
            debug!("Found macOS version: {version}");
            Some(version).filter(|v| !v.is_empty())
        }
        Ok(out) => {
            debug!("sw_vers failed: {}", out.stderr.trim());
            None
        }
        Err(e) => {
            debug!("Failed to execute sw_vers: {e}");
            None
        }
    }
}

/// Fails with `UnsatisfiedRequirement` for the first requirement the host does not meet.
pub fn check_requirements(formula: &Formula, macos_version: Option<&str>) -> Result<()> {
    for requirement in &formula.requirements {
        let satisfied = match requirement {
            Requirement::Macos(_) => match macos_version {
                Some(host) => requirement.is_satisfied_by_macos(host)?,
                None => false,
            },
            Requirement::Other(_) => true,
        };
        if !satisfied {
            return Err(OrreryError::UnsatisfiedRequirement {
                formula: formula.name.clone(),
                requirement: match macos_version {
                    Some(host) => format!("{requirement} (host is {host})"),
                    None => format!("{requirement} (host is not macOS)"),
                },
            });
        }
    }
    Ok(())
}
