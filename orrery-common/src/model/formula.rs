// orrery-common/src/model/formula.rs
// A formula is a read-only catalog entry: how to obtain, build and install one package.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::step::{Step, TestStep};
use crate::config::Config;
use crate::dependency::{Dependency, Requirement};
use crate::error::{OrreryError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// Built from a source archive.
    #[default]
    Formula,
    /// Prebuilt application bundle shipped in a disk image.
    Cask,
    /// Already present on the host; only probed.
    System,
}

/// How a host-provided dependency is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemProbe {
    Binary { binary: String },
    PkgConfig { pkg_config: String },
    Path { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaskArch {
    pub url: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaskSpec {
    /// Name of the `.app` bundle inside the disk image.
    pub app: String,
    /// Download per CPU architecture, keyed `arm64` / `x86_64`.
    pub arch: HashMap<String, CaskArch>,
}

impl CaskSpec {
    pub fn for_current_arch(&self) -> Option<&CaskArch> {
        self.arch.get(current_arch_key())
    }
}

pub fn current_arch_key() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86_64"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub kind: FormulaKind,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,

    /// Source archive URL (formula kind only).
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub mirrors: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,

    /// Extra variables exported to every build step.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub install: Vec<Step>,
    #[serde(default)]
    pub post_install: Vec<Step>,
    #[serde(default)]
    pub test: Vec<TestStep>,

    #[serde(default)]
    pub cask: Option<CaskSpec>,
    #[serde(default)]
    pub probe: Option<SystemProbe>,

    #[serde(default)]
    pub caveats: Option<String>,
}

impl Formula {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_system(&self) -> bool {
        self.kind == FormulaKind::System
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Keg directory for formulas, Caskroom directory for casks. System formulas have none.
    pub fn install_prefix(&self, config: &Config) -> Option<PathBuf> {
        match self.kind {
            FormulaKind::Formula => Some(config.formula_keg_path(&self.name, &self.version)),
            FormulaKind::Cask => Some(config.caskroom_version_path(&self.name, &self.version)),
            FormulaKind::System => None,
        }
    }

    /// Structural checks performed when a catalog is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrreryError::ValidationError(
                "formula with empty name".to_string(),
            ));
        }
        if self.name.contains('/') {
            return Err(OrreryError::ValidationError(format!(
                "formula name '{}' must not contain '/'",
                self.name
            )));
        }
        match self.kind {
            FormulaKind::Formula => {
                if self.version.is_empty() || self.url.is_empty() || self.sha256.is_empty() {
                    return Err(OrreryError::ValidationError(format!(
                        "formula '{}' needs version, url and sha256",
                        self.name
                    )));
                }
                warn_if_not_sha256(&self.name, &self.sha256);
            }
            FormulaKind::Cask => {
                let cask = self.cask.as_ref().ok_or_else(|| {
                    OrreryError::ValidationError(format!(
                        "cask '{}' has no [cask] section",
                        self.name
                    ))
                })?;
                if self.version.is_empty() || cask.arch.is_empty() {
                    return Err(OrreryError::ValidationError(format!(
                        "cask '{}' needs a version and at least one architecture",
                        self.name
                    )));
                }
                for (arch, spec) in &cask.arch {
                    warn_if_not_sha256(&format!("{}[{arch}]", self.name), &spec.sha256);
                }
            }
            FormulaKind::System => {
                if self.probe.is_none() {
                    return Err(OrreryError::ValidationError(format!(
                        "system formula '{}' has no probe",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// A malformed digest can never verify; flag it at load time rather than at download time.
fn warn_if_not_sha256(label: &str, digest: &str) {
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        warn!(
            "Checksum for '{}' is not a SHA-256 hex digest; installs will fail verification.",
            label
        );
    }
}
