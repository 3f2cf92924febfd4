// orrery-common/src/catalog.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::config::Config;
use super::error::{OrreryError, Result};
use super::model::formula::Formula;

const BUILTIN_FILES: &[(&str, &str)] = &[
    ("indi-lib.toml", include_str!("../catalog/indi-lib.toml")),
    ("kstars.toml", include_str!("../catalog/kstars.toml")),
    ("kstars-full.toml", include_str!("../catalog/kstars-full.toml")),
    ("host.toml", include_str!("../catalog/host.toml")),
];

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    formula: Vec<Formula>,
}

/// The set of known formulas, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    formulas: BTreeMap<String, Arc<Formula>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        for (file_name, contents) in BUILTIN_FILES {
            catalog.add_source(file_name, contents)?;
        }
        debug!("Loaded {} built-in formulas.", catalog.len());
        Ok(catalog)
    }

    /// Loads every `*.toml` file in `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(OrreryError::NotFound(format!(
                "Catalog directory {} does not exist",
                dir.display()
            )));
        }
        let mut files: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut catalog = Self::new();
        for path in files {
            let contents = fs::read_to_string(&path)?;
            let label = path.display().to_string();
            catalog.add_source(&label, &contents)?;
        }
        debug!(
            "Loaded {} formulas from catalog directory {}.",
            catalog.len(),
            dir.display()
        );
        Ok(catalog)
    }

    /// Catalog selected by configuration: an override directory, else the built-in one.
    pub fn for_config(config: &Config) -> Result<Self> {
        match &config.catalog_override {
            Some(dir) => Self::load_dir(dir),
            None => Self::builtin(),
        }
    }

    pub fn add_source(&mut self, label: &str, contents: &str) -> Result<()> {
        let file: CatalogFile = toml::from_str(contents).map_err(|e| {
            OrreryError::Config(format!("Failed to parse catalog file {label}: {e}"))
        })?;
        for formula in file.formula {
            self.insert(formula)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, formula: Formula) -> Result<()> {
        formula.validate()?;
        if self.formulas.contains_key(&formula.name) {
            return Err(OrreryError::ValidationError(format!(
                "Duplicate formula '{}' in catalog",
                formula.name
            )));
        }
        self.formulas
            .insert(formula.name.clone(), Arc::new(formula));
        Ok(())
    }

    /// Looks up `name`; tap-qualified names (`user/tap/name`) fall back to their last segment.
    pub fn get(&self, name: &str) -> Option<&Arc<Formula>> {
        self.formulas.get(name).or_else(|| {
            name.rsplit_once('/')
                .and_then(|(_, short)| self.formulas.get(short))
        })
    }

    pub fn load_formula(&self, name: &str) -> Result<Arc<Formula>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| OrreryError::NotFound(format!("Formula '{name}' not found in catalog.")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formulas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormulaKind;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.get("indi-lib").unwrap().version, "2.0.6");
        assert_eq!(catalog.get("kstars").unwrap().version, "3.7.9");
        assert_eq!(
            catalog.get("kstars-full").unwrap().kind,
            FormulaKind::Cask
        );
        assert!(catalog.get("cmake").unwrap().is_system());
    }

    #[test]
    fn tap_qualified_names_fall_back_to_short_name() {
        let catalog = Catalog::builtin().unwrap();
        let f = catalog.get("yourusername/kstars/indi-lib").unwrap();
        assert_eq!(f.name, "indi-lib");
        assert!(catalog.get("yourusername/kstars/nope").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut catalog = Catalog::new();
        let src = r#"
            [[formula]]
            name = "cmake"
            kind = "system"
            probe = { binary = "cmake" }
        "#;
        catalog.add_source("a.toml", src).unwrap();
        assert!(catalog.add_source("b.toml", src).is_err());
    }

    #[test]
    fn loads_directory_of_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tools.toml"),
            r#"
            [[formula]]
            name = "make"
            kind = "system"
            probe = { binary = "make" }

            [[formula]]
            name = "pkg-config"
            kind = "system"
            probe = { binary = "pkg-config" }
            "#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a catalog").unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["make", "pkg-config"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let err = Catalog::load_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, OrreryError::NotFound(_)));
    }
}
