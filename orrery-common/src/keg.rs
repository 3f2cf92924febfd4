// orrery-common/src/keg.rs
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::Config;
use super::error::{OrreryError, Result};
use super::model::{FormulaKind, InstalledArtifact};

pub const RECEIPT_FILE_NAME: &str = "INSTALL_RECEIPT.json";

/// Written last into a keg (or Caskroom version directory); its presence marks a complete install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub kind: FormulaKind,
    pub installed_at: DateTime<Utc>,
    /// Whether the user asked for this formula or it came in as a dependency.
    pub requested: bool,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<InstalledArtifact>,
}

impl InstallReceipt {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(RECEIPT_FILE_NAME)
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(dir);
        let temp_path = dir.join(format!(".{RECEIPT_FILE_NAME}.tmp"));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&temp_path, json)?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        debug!("Wrote install receipt {}", path.display());
        Ok(path)
    }

    /// `Ok(None)` when `dir` holds no receipt.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let receipt = serde_json::from_str(&contents).map_err(|e| {
            OrreryError::Generic(format!("Corrupt install receipt {}: {e}", path.display()))
        })?;
        Ok(Some(receipt))
    }
}

/// State of one versioned install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KegState {
    Absent,
    /// Directory exists but no receipt was written: an interrupted or failed install.
    Leftover,
    Complete(InstallReceipt),
}

/// Represents information about an installed package (Keg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeg {
    pub name: String,
    pub version_str: String,
    pub path: PathBuf,
    pub receipt: InstallReceipt,
}

/// Queries installed formulas in the Cellar and casks in the Caskroom.
#[derive(Debug, Clone)]
pub struct KegRegistry {
    config: Config,
}

impl KegRegistry {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn kind_dir(&self, kind: FormulaKind, name: &str, version: &str) -> Option<PathBuf> {
        match kind {
            FormulaKind::Formula => Some(self.config.formula_keg_path(name, version)),
            FormulaKind::Cask => Some(self.config.caskroom_version_path(name, version)),
            FormulaKind::System => None,
        }
    }

    pub fn keg_state(&self, kind: FormulaKind, name: &str, version: &str) -> Result<KegState> {
        let Some(dir) = self.kind_dir(kind, name, version) else {
            return Ok(KegState::Absent);
        };
        if !dir.exists() {
            return Ok(KegState::Absent);
        }
        match InstallReceipt::read_from(&dir) {
            Ok(Some(receipt)) => Ok(KegState::Complete(receipt)),
            Ok(None) => {
                debug!("[{}] {} exists without a receipt", name, dir.display());
                Ok(KegState::Leftover)
            }
            Err(e) => {
                warn!("[{}] {}; treating {} as leftover", name, e, dir.display());
                Ok(KegState::Leftover)
            }
        }
    }

    /// Latest completely installed version of `name`, compared lexicographically.
    pub fn get_installed_keg(&self, name: &str) -> Result<Option<InstalledKeg>> {
        let formula_dir = self.config.formula_cellar_dir(name);
        let mut kegs = Self::scan_versions(name, &formula_dir)?;
        if kegs.is_empty() {
            kegs = Self::scan_versions(name, &self.config.caskroom_token_path(name))?;
        }
        Ok(kegs
            .into_iter()
            .max_by(|a, b| a.version_str.cmp(&b.version_str)))
    }

    pub fn list_installed_kegs(&self) -> Result<Vec<InstalledKeg>> {
        let mut installed = Vec::new();
        for root in [self.config.cellar_dir(), self.config.caskroom_dir()] {
            if !root.is_dir() {
                debug!("{} does not exist, nothing installed there", root.display());
                continue;
            }
            for entry in fs::read_dir(&root)? {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("Error reading entry in {}: {}. Skipping.", root.display(), e);
                        continue;
                    }
                };
                let path = entry.path();
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    installed.extend(Self::scan_versions(name, &path)?);
                }
            }
        }
        installed.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.version_str.cmp(&b.version_str))
        });
        debug!("Found {} installed keg versions.", installed.len());
        Ok(installed)
    }

    fn scan_versions(name: &str, dir: &Path) -> Result<Vec<InstalledKeg>> {
        let mut kegs = Vec::new();
        if !dir.is_dir() {
            return Ok(kegs);
        }
        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(version_str) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match InstallReceipt::read_from(&path) {
                Ok(Some(receipt)) => kegs.push(InstalledKeg {
                    name: name.to_string(),
                    version_str: version_str.to_string(),
                    path: path.clone(),
                    receipt,
                }),
                Ok(None) => debug!("[{}] ignoring incomplete keg {}", name, path.display()),
                Err(e) => warn!("[{}] {}", name, e),
            }
        }
        Ok(kegs)
    }
}
