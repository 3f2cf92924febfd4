// orrery-core/src/lib.rs

pub mod build;
pub mod check;
pub mod executor;
pub mod install;
pub mod process;

pub use check::{InstalledPackageInfo, run_smoke_tests};
pub use executor::{render_caveats, InstallExecutor};
pub use process::{CommandRunner, CommandSpec, SystemCommandRunner};
