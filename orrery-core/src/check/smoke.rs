// orrery-core/src/check/smoke.rs
//! Post-install smoke checks declared in a formula's `test` steps.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use orrery_common::config::Config;
use orrery_common::error::{OrreryError, Result};
use orrery_common::keg::{KegRegistry, KegState};
use orrery_common::model::{Formula, TestStep};
use tracing::{debug, info};

use crate::build::TemplateContext;
use crate::install::system::probe_system_dependency;
use crate::process::{CommandRunner, CommandSpec};

/// Runs every test step of an installed formula and returns how many ran.
///
/// Commands run in a scratch directory with the keg's `bin` first on `PATH`.
/// A system formula is tested by probing the host again.
pub async fn run_smoke_tests(
    formula: &Formula,
    config: &Config,
    runner: &dyn CommandRunner,
) -> Result<usize> {
    if formula.is_system() {
        probe_system_dependency(formula, runner).await?;
        return Ok(1);
    }

    let prefix = installed_prefix(formula, config)?;
    let template = TemplateContext::for_formula(formula, prefix.clone(), config, HashMap::new());
    fs::create_dir_all(config.tmp_dir())?;
    let scratch = tempfile::Builder::new()
        .prefix(&format!("orrery-test-{}-", formula.name))
        .tempdir_in(config.tmp_dir())?;

    let mut env = BTreeMap::new();
    let inherited = std::env::var("PATH").unwrap_or_default();
    env.insert(
        "PATH".to_string(),
        format!("{}:{}", prefix.join("bin").display(), inherited),
    );

    for step in &formula.test {
        match step {
            TestStep::Run {
                run,
                expect_output,
                allow_failure,
            } => {
                let args = template.expand_args(run)?;
                let Some((program, rest)) = args.split_first() else {
                    return Err(OrreryError::ValidationError(format!(
                        "empty test step in formula '{}'",
                        formula.name
                    )));
                };
                let spec = CommandSpec::new(program.as_str())
                    .args(rest.iter().cloned())
                    .current_dir(scratch.path())
                    .envs(&env);
                info!("[{}] test: {}", formula.name, spec);

                let output = runner.run(&spec).await.map_err(|e| failed(formula, e.to_string()))?;
                let combined = output.combined();
                if !output.success() && !allow_failure {
                    return Err(failed(
                        formula,
                        format!("`{}` exited with {}\n{}", spec, output.status_string(), combined),
                    ));
                }
                if let Some(expected) = expect_output {
                    if !combined.contains(expected.as_str()) {
                        return Err(failed(
                            formula,
                            format!("`{spec}` output does not contain '{expected}'\n{combined}"),
                        ));
                    }
                }
            }
            TestStep::Exists { exists } => {
                let path = template.expand_path(exists)?;
                if !path.exists() {
                    return Err(failed(formula, format!("{} does not exist", path.display())));
                }
                debug!("[{}] test: {} exists", formula.name, path.display());
            }
        }
    }
    Ok(formula.test.len())
}

fn failed(formula: &Formula, reason: String) -> OrreryError {
    OrreryError::TestFailed {
        formula: formula.name.clone(),
        reason,
    }
}

fn installed_prefix(formula: &Formula, config: &Config) -> Result<PathBuf> {
    let registry = KegRegistry::new(config.clone());
    match registry.keg_state(formula.kind, &formula.name, &formula.version)? {
        KegState::Complete(_) => formula.install_prefix(config).ok_or_else(|| {
            OrreryError::Generic(format!("'{}' has no install prefix", formula.name))
        }),
        _ => Err(OrreryError::NotFound(format!(
            "{} {} is not installed",
            formula.name, formula.version
        ))),
    }
}
