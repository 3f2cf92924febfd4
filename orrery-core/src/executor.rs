// orrery-core/src/executor.rs
//! Sequential installation of a resolved plan.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use orrery_common::config::Config;
use orrery_common::dependency::{ResolvedFormula, ResolvedGraph};
use orrery_common::error::{OrreryError, Result};
use orrery_common::keg::{InstallReceipt, KegRegistry, KegState};
use orrery_common::model::formula::current_arch_key;
use orrery_common::model::{Formula, FormulaKind, InstalledArtifact};
use orrery_common::pipeline::{InstallOutcome, InstallRecord, InstallReport};
use orrery_net::{verify_checksum, FetchRequest, SourceFetcher};
use tracing::{debug, error, info, instrument, warn};

use crate::build::{run_steps, BuildEnvironment, StepContext, StepPhase, TemplateContext};
use crate::install::cask::install_app_from_dmg;
use crate::install::devtools::{check_requirements, get_macos_version};
use crate::install::extract::extract_source;
use crate::install::system::probe_system_dependency;
use crate::install::link_opt;
use crate::process::CommandRunner;

pub struct InstallExecutor {
    config: Config,
    registry: KegRegistry,
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn SourceFetcher>,
    force: bool,
}

// What one successful plan entry leaves behind.
struct Installed {
    outcome: InstallOutcome,
    resolved_path: Option<PathBuf>,
    // Prefix later formulas see for `{opt:<name>}` and in their build environment.
    opt_prefix: Option<PathBuf>,
}

impl InstallExecutor {
    pub fn new(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            registry: KegRegistry::new(config.clone()),
            config,
            runner,
            fetcher,
            force: false,
        }
    }

    /// Reinstall requested targets even when a complete keg exists. Dependencies are never forced.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Installs every plan entry in order. A failure does not stop the run; later
    /// entries that depend on a failed one are skipped.
    #[instrument(skip_all, fields(plan = graph.install_plan.len()))]
    pub async fn install(&self, graph: &ResolvedGraph) -> InstallReport {
        let mut report = InstallReport::default();
        let mut opt_prefixes: HashMap<String, PathBuf> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();

        for node in &graph.install_plan {
            let name = node.name().to_string();
            let deps = graph.transitive_dependencies(&name);

            if let Some(blocker) = deps.iter().find(|d| failed.contains(d.name())) {
                warn!(
                    "[{}] skipped because dependency '{}' failed",
                    name,
                    blocker.name()
                );
                report.push(InstallRecord {
                    formula_name: name.clone(),
                    version: node.formula.version.clone(),
                    resolved_path: None,
                    outcome: InstallOutcome::Skipped {
                        blocked_by: blocker.name().to_string(),
                    },
                });
                failed.insert(name);
                continue;
            }

            let dep_prefixes: Vec<PathBuf> = deps
                .iter()
                .filter_map(|d| opt_prefixes.get(d.name()).cloned())
                .collect();

            match self.install_one(node, &dep_prefixes, &opt_prefixes).await {
                Ok(done) => {
                    debug!("[{}] {}", name, done.outcome);
                    if let Some(prefix) = done.opt_prefix {
                        opt_prefixes.insert(name.clone(), prefix);
                    }
                    report.push(InstallRecord {
                        formula_name: name,
                        version: node.formula.version.clone(),
                        resolved_path: done.resolved_path,
                        outcome: done.outcome,
                    });
                }
                Err(e) => {
                    error!("[{}] {}", name, e);
                    report.push(InstallRecord {
                        formula_name: name.clone(),
                        version: node.formula.version.clone(),
                        resolved_path: None,
                        outcome: InstallOutcome::Failed(e),
                    });
                    failed.insert(name);
                }
            }
        }
        report
    }

    async fn install_one(
        &self,
        node: &ResolvedFormula,
        dep_prefixes: &[PathBuf],
        opt_prefixes: &HashMap<String, PathBuf>,
    ) -> Result<Installed> {
        let formula = node.formula.as_ref();
        match formula.kind {
            FormulaKind::System => {
                let prefix = probe_system_dependency(formula, self.runner.as_ref()).await?;
                Ok(Installed {
                    outcome: InstallOutcome::Provided,
                    resolved_path: prefix.clone(),
                    opt_prefix: prefix,
                })
            }
            FormulaKind::Formula => {
                self.install_formula(node, dep_prefixes, opt_prefixes)
                    .await
            }
            FormulaKind::Cask => self.install_cask(node).await,
        }
    }

    // Decides whether an existing install directory is kept, replaced or cleaned up.
    // Returns true when nothing needs doing.
    fn prepare_install_dir(&self, node: &ResolvedFormula, dir: &Path) -> Result<bool> {
        let formula = &node.formula;
        match self
            .registry
            .keg_state(formula.kind, &formula.name, &formula.version)?
        {
            KegState::Absent => Ok(false),
            KegState::Complete(_) if !(self.force && node.requested) => {
                info!(
                    "[{}] {} is already installed",
                    formula.name, formula.version
                );
                Ok(true)
            }
            KegState::Complete(_) => {
                info!("[{}] reinstalling {}", formula.name, formula.version);
                fs::remove_dir_all(dir)?;
                Ok(false)
            }
            KegState::Leftover => {
                warn!(
                    "[{}] removing incomplete install at {}",
                    formula.name,
                    dir.display()
                );
                fs::remove_dir_all(dir)?;
                Ok(false)
            }
        }
    }

    async fn install_formula(
        &self,
        node: &ResolvedFormula,
        dep_prefixes: &[PathBuf],
        opt_prefixes: &HashMap<String, PathBuf>,
    ) -> Result<Installed> {
        let formula = node.formula.as_ref();
        let keg = self
            .config
            .formula_keg_path(&formula.name, &formula.version);
        let opt_path = self.config.formula_opt_path(&formula.name);

        if self.prepare_install_dir(node, &keg)? {
            return Ok(Installed {
                outcome: InstallOutcome::AlreadyInstalled,
                resolved_path: Some(keg),
                opt_prefix: Some(opt_path),
            });
        }

        info!("[{}] fetching {}", formula.name, formula.url);
        let archive = self
            .fetcher
            .fetch(FetchRequest {
                name: &formula.name,
                url: &formula.url,
                sha256: &formula.sha256,
                mirrors: &formula.mirrors,
            })
            .await?;
        verify_checksum(&archive, &formula.sha256)?;

        fs::create_dir_all(self.config.tmp_dir())?;
        let build_dir = tempfile::Builder::new()
            .prefix(&format!("orrery-build-{}-", formula.name))
            .tempdir_in(self.config.tmp_dir())?;
        let source_dir = extract_source(&archive, build_dir.path())?;
        debug!(
            "[{}] sources extracted to {}",
            formula.name,
            source_dir.display()
        );

        fs::create_dir_all(&keg)?;
        let template =
            TemplateContext::for_formula(formula, keg.clone(), &self.config, opt_prefixes.clone());
        let env = BuildEnvironment::new(dep_prefixes, &formula.env);
        let ctx = StepContext {
            formula,
            template: &template,
            env: &env,
            work_dir: &source_dir,
            runner: self.runner.as_ref(),
        };

        info!("[{}] building {}", formula.name, formula.version);
        run_steps(&ctx, &formula.install, StepPhase::Install).await?;
        run_steps(&ctx, &formula.post_install, StepPhase::PostInstall).await?;

        let link = link_opt(&self.config, &formula.name, &keg)?;
        let receipt = InstallReceipt {
            name: formula.name.clone(),
            version: formula.version.clone(),
            kind: FormulaKind::Formula,
            installed_at: Utc::now(),
            requested: node.requested,
            source_url: Some(formula.url.clone()),
            dependencies: node.dependencies.clone(),
            artifacts: vec![
                InstalledArtifact::Keg { path: keg.clone() },
                InstalledArtifact::OptLink {
                    link_path: link,
                    target_path: keg.clone(),
                },
            ],
        };
        receipt.write_to(&keg)?;
        info!("[{}] installed to {}", formula.name, keg.display());

        Ok(Installed {
            outcome: InstallOutcome::Installed,
            resolved_path: Some(keg),
            opt_prefix: Some(opt_path),
        })
    }

    async fn install_cask(&self, node: &ResolvedFormula) -> Result<Installed> {
        let formula = node.formula.as_ref();
        let version_dir = self
            .config
            .caskroom_version_path(&formula.name, &formula.version);

        if self.prepare_install_dir(node, &version_dir)? {
            return Ok(Installed {
                outcome: InstallOutcome::AlreadyInstalled,
                resolved_path: Some(version_dir),
                opt_prefix: None,
            });
        }

        let macos_version = get_macos_version(self.runner.as_ref()).await;
        check_requirements(formula, macos_version.as_deref())?;

        let cask = formula.cask.as_ref().ok_or_else(|| {
            OrreryError::ValidationError(format!("'{}' has no [cask] section", formula.name))
        })?;
        let download = cask.for_current_arch().ok_or_else(|| {
            OrreryError::NotFound(format!(
                "No {} download for cask '{}'",
                current_arch_key(),
                formula.name
            ))
        })?;

        info!("[{}] fetching {}", formula.name, download.url);
        let dmg = self
            .fetcher
            .fetch(FetchRequest {
                name: &formula.name,
                url: &download.url,
                sha256: &download.sha256,
                mirrors: &[],
            })
            .await?;
        verify_checksum(&dmg, &download.sha256)?;

        let artifacts =
            install_app_from_dmg(formula, &dmg, &self.config, self.runner.as_ref()).await?;

        fs::create_dir_all(&version_dir)?;
        let receipt = InstallReceipt {
            name: formula.name.clone(),
            version: formula.version.clone(),
            kind: FormulaKind::Cask,
            installed_at: Utc::now(),
            requested: node.requested,
            source_url: Some(download.url.clone()),
            dependencies: node.dependencies.clone(),
            artifacts,
        };
        receipt.write_to(&version_dir)?;

        Ok(Installed {
            outcome: InstallOutcome::Installed,
            resolved_path: Some(version_dir),
            opt_prefix: None,
        })
    }
}

/// Caveats text with placeholders expanded against the installed prefix.
pub fn render_caveats(formula: &Formula, config: &Config) -> Result<Option<String>> {
    let Some(caveats) = &formula.caveats else {
        return Ok(None);
    };
    let prefix = formula
        .install_prefix(config)
        .unwrap_or_else(|| config.orrery_root().to_path_buf());
    let template = TemplateContext::for_formula(formula, prefix, config, HashMap::new());
    template.expand(caveats.trim()).map(Some)
}
