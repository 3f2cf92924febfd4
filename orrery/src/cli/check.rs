// orrery/src/cli/check.rs
use clap::Args;
use colored::Colorize;
use orrery_common::dependency::check_catalog;
use orrery_common::error::{OrreryError, Result};
use orrery_common::Catalog;

use super::print_status;

#[derive(Args, Debug)]
pub struct Check {}

impl Check {
    pub fn run(&self, catalog: &Catalog) -> Result<()> {
        print_status(&format!("Checking {} formulas", catalog.len()));
        let problems = check_catalog(catalog);
        if problems.is_empty() {
            println!("{}", "Catalog OK".green().bold());
            return Ok(());
        }
        for (name, error) in &problems {
            println!("  {} {}: {}", "✘".red(), name.bold(), error);
        }
        Err(OrreryError::ValidationError(format!(
            "{} formula(s) failed to resolve",
            problems.len()
        )))
    }
}
