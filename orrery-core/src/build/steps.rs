// orrery-core/src/build/steps.rs
use std::fs;
use std::path::{Path, PathBuf};

use fs_extra::dir::CopyOptions;
use orrery_common::error::{OrreryError, Result};
use orrery_common::model::{Formula, Step, StepAction};
use tracing::{debug, info};

use super::env::BuildEnvironment;
use super::template::TemplateContext;
use crate::process::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Install,
    PostInstall,
}

/// Everything a step needs to run for one formula.
pub struct StepContext<'a> {
    pub formula: &'a Formula,
    pub template: &'a TemplateContext,
    pub env: &'a BuildEnvironment,
    /// Working directory for `run` steps; their `dir` is relative to it.
    pub work_dir: &'a Path,
    pub runner: &'a dyn CommandRunner,
}

impl StepContext<'_> {
    fn post_install_failure(&self, step: &StepAction, reason: impl Into<String>) -> OrreryError {
        OrreryError::PostInstallStepFailed {
            formula: self.formula.name.clone(),
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

/// Runs `steps` in order, skipping those whose `when_env` gate is closed. Stops at the first failure.
pub async fn run_steps(ctx: &StepContext<'_>, steps: &[Step], phase: StepPhase) -> Result<()> {
    for step in steps {
        if !step.is_enabled(|key| ctx.env.lookup(key)) {
            debug!(
                "[{}] skipping gated step: {}",
                ctx.formula.name, step.action
            );
            continue;
        }
        run_step(ctx, &step.action, phase).await?;
    }
    Ok(())
}

pub async fn run_step(ctx: &StepContext<'_>, action: &StepAction, phase: StepPhase) -> Result<()> {
    debug!("[{}] {}", ctx.formula.name, action);
    match action {
        StepAction::Run { run, dir } => run_command(ctx, action, run, dir.as_deref(), phase).await,
        StepAction::Mkdir { mkdir } => {
            let path = ctx.template.expand_path(mkdir)?;
            fs::create_dir_all(&path)
                .map_err(|e| ctx.post_install_failure(action, format!("{}: {e}", path.display())))
        }
        StepAction::Copy { copy, to } => {
            let src = ctx.template.expand(copy)?;
            let dest = ctx.template.expand(to)?;
            copy_into(&src, &dest).map_err(|reason| ctx.post_install_failure(action, reason))
        }
        StepAction::PlistSet {
            plist_set,
            key,
            value,
        } => {
            let path = ctx.template.expand_path(plist_set)?;
            let value = ctx.template.expand(value)?;
            set_plist_string(&path, key, &value)
                .map_err(|reason| ctx.post_install_failure(action, reason))
        }
    }
}

async fn run_command(
    ctx: &StepContext<'_>,
    action: &StepAction,
    run: &[String],
    dir: Option<&str>,
    phase: StepPhase,
) -> Result<()> {
    let args = ctx.template.expand_args(run)?;
    let Some((program, rest)) = args.split_first() else {
        return Err(OrreryError::ValidationError(format!(
            "empty run step in formula '{}'",
            ctx.formula.name
        )));
    };
    let cwd = match dir {
        Some(d) => ctx.work_dir.join(ctx.template.expand(d)?),
        None => ctx.work_dir.to_path_buf(),
    };
    let spec = CommandSpec::new(program.as_str())
        .args(rest.iter().cloned())
        .current_dir(cwd)
        .envs(ctx.env.vars());
    info!("[{}] {}", ctx.formula.name, spec);

    let failure = match ctx.runner.run(&spec).await {
        Ok(output) if output.success() => return Ok(()),
        Ok(output) => (output.status_string(), output.combined()),
        Err(e) => ("failed to start".to_string(), e.to_string()),
    };

    Err(match phase {
        StepPhase::Install => OrreryError::BuildToolNonZeroExit {
            formula: ctx.formula.name.clone(),
            command: spec.to_string(),
            status: failure.0,
            output: failure.1,
        },
        StepPhase::PostInstall => {
            ctx.post_install_failure(action, format!("{}\n{}", failure.0, failure.1))
        }
    })
}

fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Copies a file, a directory tree, or every glob match into `dest`.
/// A `dest` ending in `/` or naming an existing directory receives the sources by name.
fn copy_into(src: &str, dest: &str) -> std::result::Result<(), String> {
    let dest_path = PathBuf::from(dest);
    if has_glob_chars(src) {
        let matches: Vec<PathBuf> = glob::glob(src)
            .map_err(|e| format!("invalid pattern '{src}': {e}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        if matches.is_empty() {
            return Err(format!("no files match '{src}'"));
        }
        fs::create_dir_all(&dest_path).map_err(|e| format!("{}: {e}", dest_path.display()))?;
        for path in matches {
            copy_path(&path, &dest_path, true)?;
        }
        return Ok(());
    }

    let src_path = Path::new(src);
    if !src_path.exists() {
        return Err(format!("{} does not exist", src_path.display()));
    }
    let into_dir = dest.ends_with('/') || dest_path.is_dir();
    copy_path(src_path, &dest_path, into_dir)
}

fn copy_path(src: &Path, dest: &Path, into_dir: bool) -> std::result::Result<(), String> {
    if src.is_dir() {
        let mut options = CopyOptions::new();
        options.overwrite = true;
        // Without `into_dir`, `dest` becomes the copy of `src` itself.
        options.content_only = !into_dir;
        fs::create_dir_all(dest).map_err(|e| format!("{}: {e}", dest.display()))?;
        fs_extra::dir::copy(src, dest, &options)
            .map(|_| ())
            .map_err(|e| format!("copy {} -> {}: {e}", src.display(), dest.display()))
    } else {
        let target = if into_dir {
            fs::create_dir_all(dest).map_err(|e| format!("{}: {e}", dest.display()))?;
            match src.file_name() {
                Some(name) => dest.join(name),
                None => return Err(format!("{} has no file name", src.display())),
            }
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| format!("{}: {e}", parent.display()))?;
            }
            dest.to_path_buf()
        };
        fs::copy(src, &target)
            .map(|_| ())
            .map_err(|e| format!("copy {} -> {}: {e}", src.display(), target.display()))
    }
}

fn set_plist_string(path: &Path, key: &str, value: &str) -> std::result::Result<(), String> {
    let mut root = plist::Value::from_file(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let dict = root
        .as_dictionary_mut()
        .ok_or_else(|| format!("{} is not a dictionary plist", path.display()))?;
    dict.insert(key.to_string(), plist::Value::String(value.to_string()));
    root.to_file_xml(path)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))
}
