pub mod installed;
pub mod smoke;

pub use installed::{get_installed_package, get_installed_packages, InstalledPackageInfo};
pub use smoke::run_smoke_tests;
