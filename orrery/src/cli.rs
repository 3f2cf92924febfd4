// orrery/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use orrery_common::error::Result;
use orrery_common::{Catalog, Config};

pub mod check;
pub mod deps;
pub mod info;
pub mod install;
pub mod list;

use crate::cli::check::Check;
use crate::cli::deps::Deps;
use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::test::TestArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "orrery", bin_name = "orrery")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory of catalog files to use instead of the built-in catalog
    #[arg(long, global = true, value_name = "DIR")]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and install formulas or casks
    Install(InstallArgs),
    /// Run an installed formula's smoke checks
    Test(TestArgs),
    /// Print the resolved install order
    Deps(Deps),
    /// Show catalog metadata for a formula
    Info(Info),
    /// List installed formulas and casks
    List(List),
    /// Validate the whole catalog
    Check(Check),
}

impl Command {
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config, catalog).await,
            Self::Test(command) => command.run(config, catalog).await,
            Self::Deps(command) => command.run(catalog),
            Self::Info(command) => command.run(config, catalog),
            Self::List(command) => command.run(config),
            Self::Check(command) => command.run(catalog),
        }
    }
}

/// `==> message` status line.
pub(crate) fn print_status(message: &str) {
    println!("{}{}", "==> ".bold().blue(), message.bold());
}
