// orrery-core/src/check/installed.rs
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use orrery_common::config::Config;
use orrery_common::error::Result;
use orrery_common::keg::{InstalledKeg, KegRegistry};
use orrery_common::model::FormulaKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackageInfo {
    pub name: String,
    pub version: String,
    pub pkg_type: FormulaKind,
    pub path: PathBuf,
    pub requested: bool,
    pub installed_at: DateTime<Utc>,
    /// `opt/<name>` currently points at this version.
    pub opt_linked: bool,
}

impl InstalledPackageInfo {
    fn from_keg(keg: InstalledKeg, config: &Config) -> Self {
        let opt_linked = std::fs::read_link(config.formula_opt_path(&keg.name))
            .is_ok_and(|target| target == keg.path);
        Self {
            name: keg.name,
            version: keg.version_str,
            pkg_type: keg.receipt.kind,
            path: keg.path,
            requested: keg.receipt.requested,
            installed_at: keg.receipt.installed_at,
            opt_linked,
        }
    }
}

/// Every complete formula and cask install, sorted by name then version.
pub fn get_installed_packages(config: &Config) -> Result<Vec<InstalledPackageInfo>> {
    let kegs = KegRegistry::new(config.clone()).list_installed_kegs()?;
    debug!("Found {} installed packages", kegs.len());
    Ok(kegs
        .into_iter()
        .map(|keg| InstalledPackageInfo::from_keg(keg, config))
        .collect())
}

/// Latest complete install of `name`, if any.
pub fn get_installed_package(name: &str, config: &Config) -> Result<Option<InstalledPackageInfo>> {
    Ok(KegRegistry::new(config.clone())
        .get_installed_keg(name)?
        .map(|keg| InstalledPackageInfo::from_keg(keg, config)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use orrery_common::keg::InstallReceipt;

    use super::*;
    use crate::install::link_opt;

    #[test]
    fn reports_receipt_details_and_opt_link() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_root(root.path());
        let keg = config.formula_keg_path("indi-lib", "2.0.6");
        fs::create_dir_all(&keg).unwrap();
        InstallReceipt {
            name: "indi-lib".to_string(),
            version: "2.0.6".to_string(),
            kind: FormulaKind::Formula,
            installed_at: Utc::now(),
            requested: false,
            source_url: None,
            dependencies: vec![],
            artifacts: vec![],
        }
        .write_to(&keg)
        .unwrap();

        let info = get_installed_package("indi-lib", &config).unwrap().unwrap();
        assert!(!info.opt_linked);
        assert!(!info.requested);

        link_opt(&config, "indi-lib", &keg).unwrap();
        let all = get_installed_packages(&config).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].opt_linked);
        assert_eq!(all[0].pkg_type, FormulaKind::Formula);
        assert!(get_installed_package("kstars", &config).unwrap().is_none());
    }
}
