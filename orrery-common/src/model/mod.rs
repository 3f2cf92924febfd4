// orrery-common/src/model/mod.rs
pub mod artifact;
pub mod formula;
pub mod step;

pub use artifact::InstalledArtifact;
pub use formula::{CaskArch, CaskSpec, Formula, FormulaKind, SystemProbe};
pub use step::{EnvCondition, Step, StepAction, TestStep};
