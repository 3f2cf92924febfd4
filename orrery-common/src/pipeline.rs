// orrery-common/src/pipeline.rs
use std::fmt;
use std::path::PathBuf;

use crate::error::OrreryError;

/// What happened to one entry of an install plan.
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed,
    /// A complete keg with a receipt was already present; nothing was touched.
    AlreadyInstalled,
    /// Host-provided dependency found by its probe.
    Provided,
    Failed(OrreryError),
    /// Not attempted because a dependency failed.
    Skipped { blocked_by: String },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Installed | Self::AlreadyInstalled | Self::Provided
        )
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::Provided => write!(f, "provided by host"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Skipped { blocked_by } => write!(f, "skipped ({blocked_by} failed)"),
        }
    }
}

/// One per executed plan entry.
#[derive(Debug, Clone)]
pub struct InstallRecord {
    pub formula_name: String,
    pub version: String,
    /// Keg, Caskroom directory, or discovered host prefix.
    pub resolved_path: Option<PathBuf>,
    pub outcome: InstallOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub records: Vec<InstallRecord>,
}

impl InstallReport {
    pub fn push(&mut self, record: InstallRecord) {
        self.records.push(record);
    }

    pub fn get(&self, name: &str) -> Option<&InstallRecord> {
        self.records.iter().find(|r| r.formula_name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstallRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn count_installed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, InstallOutcome::Installed))
            .count()
    }

    /// First hard error in plan order, for the process exit path.
    pub fn first_error(&self) -> Option<&OrreryError> {
        self.records.iter().find_map(|r| match &r.outcome {
            InstallOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }
}
