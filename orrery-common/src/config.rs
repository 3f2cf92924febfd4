// orrery-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use directories::UserDirs;
use tracing::debug;

use super::error::Result;

// Fallback install root when ORRERY_PREFIX is not set or is empty.
const DEFAULT_FALLBACK_ORRERY_ROOT: &str = "/opt/orrery";

#[derive(Debug, Clone)]
pub struct Config {
    pub orrery_root: PathBuf,
    /// Directory of catalog files. `None` means the built-in catalog.
    pub catalog_override: Option<PathBuf>,
    /// Where cask app bundles go. `None` means the platform default.
    pub appdir_override: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading orrery configuration");

        let root_str = env::var("ORRERY_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "ORRERY_PREFIX environment variable not set or empty, falling back to default: {}",
                    DEFAULT_FALLBACK_ORRERY_ROOT
                );
                DEFAULT_FALLBACK_ORRERY_ROOT.to_string()
            });

        let orrery_root = PathBuf::from(&root_str);
        debug!("Effective ORRERY_ROOT set to: {}", orrery_root.display());

        let catalog_override = env::var("ORRERY_CATALOG")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let appdir_override = env::var("ORRERY_APPDIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        debug!("Configuration loaded successfully.");
        Ok(Self {
            orrery_root,
            catalog_override,
            appdir_override,
        })
    }

    /// Builds a config rooted at `root`, ignoring the environment. Apps go to `<root>/Applications`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let orrery_root = root.into();
        Self {
            appdir_override: Some(orrery_root.join("Applications")),
            orrery_root,
            catalog_override: None,
        }
    }

    pub fn orrery_root(&self) -> &Path {
        &self.orrery_root
    }

    pub fn cellar_dir(&self) -> PathBuf {
        self.orrery_root.join("Cellar")
    }

    pub fn caskroom_dir(&self) -> PathBuf {
        self.orrery_root.join("Caskroom")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.orrery_root.join("opt")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.orrery_root.join("orrery_cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.orrery_root.join("orrery_logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.orrery_root.join("tmp")
    }

    pub fn applications_dir(&self) -> PathBuf {
        if let Some(dir) = &self.appdir_override {
            dir.clone()
        } else if cfg!(target_os = "macos") {
            PathBuf::from("/Applications")
        } else {
            self.home_dir().join("Applications")
        }
    }

    pub fn formula_cellar_dir(&self, formula_name: &str) -> PathBuf {
        self.cellar_dir().join(formula_name)
    }

    pub fn formula_keg_path(&self, formula_name: &str, version_str: &str) -> PathBuf {
        self.formula_cellar_dir(formula_name).join(version_str)
    }

    pub fn formula_opt_path(&self, formula_name: &str) -> PathBuf {
        self.opt_dir().join(formula_name)
    }

    pub fn caskroom_token_path(&self, cask_token: &str) -> PathBuf {
        self.caskroom_dir().join(cask_token)
    }

    pub fn caskroom_version_path(&self, cask_token: &str, version_str: &str) -> PathBuf {
        self.caskroom_token_path(cask_token).join(version_str)
    }

    pub fn home_dir(&self) -> PathBuf {
        UserDirs::new().map_or_else(|| PathBuf::from("/"), |ud| ud.home_dir().to_path_buf())
    }

    pub fn desktop_dir(&self) -> PathBuf {
        UserDirs::new()
            .and_then(|ud| ud.desktop_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| self.home_dir().join("Desktop"))
    }
}
