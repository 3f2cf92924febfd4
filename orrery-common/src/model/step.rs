// orrery-common/src/model/step.rs
//! Declarative install, post-install and test steps.
//!
//! Steps are written in catalog files keyed by their action:
//!
//! ```toml
//! [[formula.install]]
//! run = ["cmake", "--build", "build"]
//!
//! [[formula.install]]
//! plist_set = "{bin}/KStars.app/Contents/Info.plist"
//! key = "CFBundleVersion"
//! value = "{version}"
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};

/// Gate for a step that only runs when an environment variable has a given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvCondition {
    pub var: String,
    #[serde(default = "default_env_value")]
    pub equals: String,
}

fn default_env_value() -> String {
    "1".to_string()
}

impl EnvCondition {
    /// `lookup` resolves a variable name to its value, if set.
    pub fn is_met<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.var).is_some_and(|v| v == self.equals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepAction {
    Run {
        run: Vec<String>,
        #[serde(default)]
        dir: Option<String>,
    },
    Mkdir {
        mkdir: String,
    },
    Copy {
        copy: String,
        to: String,
    },
    PlistSet {
        plist_set: String,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,
    pub when_env: Option<EnvCondition>,
}

/// Catalog form of a step. Every key is optional here; `Step::try_from` checks the combination.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    run: Option<Vec<String>>,
    dir: Option<String>,
    mkdir: Option<String>,
    copy: Option<String>,
    to: Option<String>,
    plist_set: Option<String>,
    key: Option<String>,
    value: Option<String>,
    when_env: Option<EnvCondition>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let action = match (raw.run, raw.mkdir, raw.copy, raw.plist_set) {
            (Some(run), None, None, None) => {
                reject_extra(&[("to", &raw.to), ("key", &raw.key), ("value", &raw.value)], "run")?;
                StepAction::Run { run, dir: raw.dir }
            }
            (None, Some(mkdir), None, None) => {
                reject_extra(
                    &[("dir", &raw.dir), ("to", &raw.to), ("key", &raw.key), ("value", &raw.value)],
                    "mkdir",
                )?;
                StepAction::Mkdir { mkdir }
            }
            (None, None, Some(copy), None) => {
                reject_extra(&[("dir", &raw.dir), ("key", &raw.key), ("value", &raw.value)], "copy")?;
                let to = raw.to.ok_or_else(|| format!("copy step '{copy}' needs `to`"))?;
                StepAction::Copy { copy, to }
            }
            (None, None, None, Some(plist_set)) => {
                reject_extra(&[("dir", &raw.dir), ("to", &raw.to)], "plist_set")?;
                match (raw.key, raw.value) {
                    (Some(key), Some(value)) => StepAction::PlistSet {
                        plist_set,
                        key,
                        value,
                    },
                    _ => return Err(format!("plist_set step '{plist_set}' needs `key` and `value`")),
                }
            }
            (None, None, None, None) => {
                return Err("step needs one of `run`, `mkdir`, `copy` or `plist_set`".to_string())
            }
            _ => {
                return Err(
                    "step has more than one of `run`, `mkdir`, `copy` and `plist_set`".to_string(),
                )
            }
        };
        Ok(Self {
            action,
            when_env: raw.when_env,
        })
    }
}

fn reject_extra(fields: &[(&str, &Option<String>)], action: &str) -> Result<(), String> {
    match fields.iter().find(|(_, value)| value.is_some()) {
        Some((name, _)) => Err(format!("`{name}` is not valid on a `{action}` step")),
        None => Ok(()),
    }
}

impl Step {
    pub fn is_enabled<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.when_env.as_ref().map_or(true, |cond| cond.is_met(lookup))
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run { run, .. } => write!(f, "run {}", run.join(" ")),
            Self::Mkdir { mkdir } => write!(f, "mkdir {mkdir}"),
            Self::Copy { copy, to } => write!(f, "copy {copy} -> {to}"),
            Self::PlistSet {
                plist_set, key, ..
            } => write!(f, "plist_set {key} in {plist_set}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum TestStep {
    Run {
        run: Vec<String>,
        /// Substring that must appear in combined stdout and stderr.
        #[serde(default)]
        expect_output: Option<String>,
        #[serde(default)]
        allow_failure: bool,
    },
    Exists {
        exists: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        steps: Vec<Step>,
        test: Vec<TestStep>,
    }

    #[test]
    fn parses_each_action_shape() {
        let holder: Holder = toml::from_str(
            r#"
            [[steps]]
            run = ["make", "install"]
            dir = "libindi"

            [[steps]]
            mkdir = "{bin}/KStars.app/Contents/MacOS/indi"

            [[steps]]
            copy = "{opt_bin:indi-lib}/indi*"
            to = "{bin}/KStars.app/Contents/MacOS/indi/"

            [[steps]]
            plist_set = "{bin}/KStars.app/Contents/Info.plist"
            key = "CFBundleVersion"
            value = "{version}"

            [[steps]]
            run = ["hdiutil", "create"]
            when_env = { var = "CREATE_DMG" }

            [[test]]
            run = ["{bin}/indi_getprop", "-h"]
            expect_output = "INDI Library"
            allow_failure = true

            [[test]]
            exists = "{bin}/KStars.app/Contents/MacOS/kstars"
            "#,
        )
        .unwrap();

        assert!(matches!(
            &holder.steps[0].action,
            StepAction::Run { dir: Some(d), .. } if d == "libindi"
        ));
        assert!(matches!(holder.steps[1].action, StepAction::Mkdir { .. }));
        assert!(matches!(holder.steps[2].action, StepAction::Copy { .. }));
        assert!(matches!(holder.steps[3].action, StepAction::PlistSet { .. }));
        assert_eq!(
            holder.steps[4].when_env,
            Some(EnvCondition {
                var: "CREATE_DMG".to_string(),
                equals: "1".to_string()
            })
        );
        assert!(matches!(
            &holder.test[0],
            TestStep::Run { allow_failure: true, expect_output: Some(_), .. }
        ));
        assert!(matches!(holder.test[1], TestStep::Exists { .. }));
    }

    #[test]
    fn misspelled_step_keys_are_rejected() {
        let typo = toml::from_str::<Holder>(
            r#"
            test = []
            [[steps]]
            run = ["make"]
            dri = "libindi"
            "#,
        );
        let err = typo.err().unwrap().to_string();
        assert!(err.contains("dri"), "{err}");

        let misplaced = toml::from_str::<Holder>(
            r#"
            test = []
            [[steps]]
            mkdir = "{share}/kstars"
            to = "{bin}"
            "#,
        );
        assert!(misplaced.is_err());

        let two_actions = toml::from_str::<Holder>(
            r#"
            test = []
            [[steps]]
            run = ["make"]
            mkdir = "{share}"
            "#,
        );
        assert!(two_actions.is_err());

        let incomplete = toml::from_str::<Holder>(
            r#"
            test = []
            [[steps]]
            copy = "{opt_bin:indi-lib}/indi*"
            "#,
        );
        assert!(incomplete.is_err());
    }

    #[test]
    fn misspelled_test_keys_are_rejected() {
        let result = toml::from_str::<Holder>(
            r#"
            steps = []
            [[test]]
            run = ["{bin}/kstars", "--version"]
            expect_ouput = "KStars"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn env_gate_requires_exact_value() {
        let step = Step {
            action: StepAction::Mkdir {
                mkdir: "x".to_string(),
            },
            when_env: Some(EnvCondition {
                var: "CREATE_DMG".to_string(),
                equals: "1".to_string(),
            }),
        };
        let mut env = HashMap::new();
        assert!(!step.is_enabled(|k| env.get(k).cloned()));
        env.insert("CREATE_DMG".to_string(), "0".to_string());
        assert!(!step.is_enabled(|k| env.get(k).cloned()));
        env.insert("CREATE_DMG".to_string(), "1".to_string());
        assert!(step.is_enabled(|k| env.get(k).cloned()));
    }
}
