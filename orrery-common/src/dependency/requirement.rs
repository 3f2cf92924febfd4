// orrery-common/src/dependency/requirement.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Minimum macOS product version, e.g. `"12"` for Monterey.
    Macos(String),
    Other(String),
}

impl Requirement {
    /// Checks a host macOS version (as printed by `sw_vers -productVersion`).
    pub fn is_satisfied_by_macos(&self, host_version: &str) -> Result<bool> {
        match self {
            Self::Macos(min) => {
                let min = semver::Version::parse(&pad_version(min))?;
                let host = semver::Version::parse(&pad_version(host_version))?;
                Ok(host >= min)
            }
            Self::Other(_) => Ok(true),
        }
    }
}

// "12" -> "12.0.0", "14.2" -> "14.2.0"
fn pad_version(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.split('.').count() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macos(v) => write!(f, "macOS >= {v}"),
            Self::Other(s) => write!(f, "Requirement: {s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_short_macos_versions() {
        let monterey = Requirement::Macos("12".to_string());
        assert!(monterey.is_satisfied_by_macos("14.2.1").unwrap());
        assert!(monterey.is_satisfied_by_macos("12.0").unwrap());
        assert!(!monterey.is_satisfied_by_macos("11.7").unwrap());
    }
}
