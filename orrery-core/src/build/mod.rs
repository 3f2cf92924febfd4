// orrery-core/src/build/mod.rs
// Building a formula from source: environment, placeholder expansion and step execution.

pub mod env;
pub mod steps;
pub mod template;

pub use env::BuildEnvironment;
pub use steps::{run_step, run_steps, StepContext, StepPhase};
pub use template::{std_cmake_args, TemplateContext};
