// orrery/src/cli/install.rs
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use orrery_common::dependency::{DependencyResolver, ResolutionContext};
use orrery_common::error::{OrreryError, Result};
use orrery_common::pipeline::{InstallOutcome, InstallReport};
use orrery_common::{Catalog, Config};
use orrery_core::{render_caveats, InstallExecutor, SystemCommandRunner};
use orrery_net::HttpFetcher;
use prettytable::{format, Cell, Row, Table};
use tracing::{instrument, warn};

use super::print_status;

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[arg(required = true)]
    names: Vec<String>,

    /// Reinstall the named targets even if already installed
    #[arg(long)]
    force: bool,
    #[arg(long)]
    include_optional: bool,
    #[arg(long)]
    skip_recommended: bool,
}

impl InstallArgs {
    #[instrument(skip(self, config, catalog), fields(targets = ?self.names))]
    pub async fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let mut context = ResolutionContext::new(catalog);
        context.include_optional = self.include_optional;
        context.skip_recommended = self.skip_recommended;
        let graph = DependencyResolver::new(context).resolve_targets(&self.names)?;

        print_status(&format!(
            "Installing {} ({} formulas in plan)",
            self.names.join(", "),
            graph.install_plan.len()
        ));

        let executor = InstallExecutor::new(
            config.clone(),
            Arc::new(SystemCommandRunner),
            Arc::new(HttpFetcher::new(config)?),
        )
        .with_force(self.force);
        let report = executor.install(&graph).await;

        print_report(&report);

        for node in graph.install_plan.iter().filter(|n| n.requested) {
            let installed_now = report
                .get(node.name())
                .is_some_and(|r| matches!(r.outcome, InstallOutcome::Installed));
            if !installed_now {
                continue;
            }
            match render_caveats(&node.formula, config) {
                Ok(Some(text)) => {
                    println!("\n{}", format!("Caveats for {}", node.name()).blue().bold());
                    println!("{text}");
                }
                Ok(None) => {}
                Err(e) => warn!("[{}] could not render caveats: {}", node.name(), e),
            }
        }

        match report.first_error() {
            Some(e) => Err(e.clone()),
            None if report.has_failures() => Err(OrreryError::Generic(
                "Some formulas were not installed".to_string(),
            )),
            None => Ok(()),
        }
    }
}

fn print_report(report: &InstallReport) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(vec![
        Cell::new("Name").style_spec("b"),
        Cell::new("Version").style_spec("b"),
        Cell::new("Result").style_spec("b"),
    ]));
    for record in &report.records {
        let (label, style) = match &record.outcome {
            InstallOutcome::Installed => ("installed".to_string(), "Fg"),
            InstallOutcome::AlreadyInstalled => ("already installed".to_string(), ""),
            InstallOutcome::Provided => ("provided by host".to_string(), ""),
            InstallOutcome::Failed(_) => ("failed".to_string(), "Fr"),
            other @ InstallOutcome::Skipped { .. } => (other.to_string(), "Fy"),
        };
        table.add_row(Row::new(vec![
            Cell::new(&record.formula_name).style_spec("Fb"),
            Cell::new(if record.version.is_empty() {
                "-"
            } else {
                &record.version
            }),
            Cell::new(&label).style_spec(style),
        ]));
    }
    table.printstd();

    let installed = report.count_installed();
    let failed = report.failures().count();
    if failed > 0 {
        println!(
            "{}",
            format!("{installed} installed, {failed} not installed").red().bold()
        );
    } else {
        println!("{}", format!("{installed} installed").bold());
    }
}
