// orrery-common/src/model/artifact.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Represents an item installed or managed by orrery, recorded in the install receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstalledArtifact {
    /// The versioned install directory of a formula.
    Keg { path: PathBuf },
    /// The stable `opt/<name>` symlink pointing at the keg.
    OptLink {
        link_path: PathBuf,
        target_path: PathBuf,
    },
    /// An application bundle copied into the applications directory.
    AppBundle { path: PathBuf },
}
