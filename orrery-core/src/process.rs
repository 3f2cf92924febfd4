// orrery-core/src/process.rs
//! External process execution behind a trait so install logic can be driven by a fake.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use orrery_common::error::{OrreryError, Result};
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way `2>&1` would interleave them for a quiet tool.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    pub fn status_string(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "signal".to_string(),
        }
    }
}

/// Runs external programs. Returns `Err` only when the program could not be started;
/// a non-zero exit is reported through [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(
            "Running command: {} (cwd: {:?}, envs: {:?})",
            spec,
            spec.cwd,
            spec.env.keys().collect::<Vec<_>>()
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&spec.env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        match cmd.output().await {
            Ok(output) => {
                let result = CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                if result.success() {
                    debug!("Command finished successfully: {}", spec.program);
                } else {
                    debug!("Command failed with {}: {}", result.status_string(), spec);
                    if !result.stderr.trim().is_empty() {
                        debug!("Stderr:\n{}", result.stderr.trim());
                    }
                }
                Ok(result)
            }
            Err(e) => {
                error!("Failed to execute command {}: {}", spec.program, e);
                Err(OrreryError::CommandExecError(format!(
                    "{}: {e}",
                    spec.program
                )))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Handler = Arc<dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync>;

    /// Records every invocation; programs without a handler succeed with empty output.
    #[derive(Clone, Default)]
    pub struct FakeRunner {
        calls: Arc<Mutex<Vec<CommandSpec>>>,
        handlers: Arc<Mutex<Vec<(String, Handler)>>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on<F>(&self, program: &str, handler: F) -> &Self
        where
            F: Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static,
        {
            self.handlers
                .lock()
                .unwrap()
                .push((program.to_string(), Arc::new(handler)));
            self
        }

        pub fn fail(&self, program: &str, code: i32, stderr: &str) -> &Self {
            let stderr = stderr.to_string();
            self.on(program, move |_| {
                Ok(CommandOutput {
                    code: Some(code),
                    stdout: String::new(),
                    stderr: stderr.clone(),
                })
            })
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.program).collect()
        }
    }

    pub fn ok_output(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            let handler = self
                .handlers
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(program, _)| program == &spec.program)
                .map(|(_, h)| h.clone());
            match handler {
                Some(h) => h(spec),
                None => Ok(ok_output("")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_joins_streams() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "usage".to_string(),
            stderr: "INDI Library: 2.0.6".to_string(),
        };
        assert_eq!(out.combined(), "usage\nINDI Library: 2.0.6");
        assert!(!out.success());
        assert_eq!(out.status_string(), "exit status 1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_captures_output_and_status() {
        let runner = SystemCommandRunner;
        let out = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn missing_program_is_an_exec_error() {
        let err = SystemCommandRunner
            .run(&CommandSpec::new("orrery-no-such-program-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::CommandExecError(_)));
    }
}
