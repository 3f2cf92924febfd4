// orrery/src/cli/info.rs
use clap::Args;
use colored::Colorize;
use orrery_common::error::Result;
use orrery_common::model::{Formula, FormulaKind, SystemProbe};
use orrery_common::{Catalog, Config};
use orrery_core::check::get_installed_package;
use prettytable::{format, row, Table};

#[derive(Args, Debug)]
pub struct Info {
    name: String,
}

impl Info {
    pub fn run(&self, config: &Config, catalog: &Catalog) -> Result<()> {
        let formula = catalog.load_formula(&self.name)?;
        let installed = get_installed_package(&formula.name, config)?;
        print_formula_info(&formula, installed.map(|i| i.version).as_deref());
        Ok(())
    }
}

fn print_formula_info(formula: &Formula, installed: Option<&str>) {
    let heading = match formula.kind {
        FormulaKind::Formula => "Formula",
        FormulaKind::Cask => "Cask",
        FormulaKind::System => "System dependency",
    };
    println!("{}", format!("{heading}: {}", formula.name).green().bold());

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    if !formula.version.is_empty() {
        table.add_row(row!["Version", formula.version]);
    }
    table.add_row(row!["Installed", installed.unwrap_or("no")]);
    table.add_row(row!["License", formula.license.as_deref().unwrap_or("N/A")]);
    table.add_row(row!["Homepage", formula.homepage.as_deref().unwrap_or("N/A")]);
    match formula.kind {
        FormulaKind::Formula => {
            table.add_row(row!["Source", formula.url]);
        }
        FormulaKind::Cask => {
            if let Some(cask) = &formula.cask {
                table.add_row(row!["App", cask.app]);
                let mut arches: Vec<&String> = cask.arch.keys().collect();
                arches.sort();
                for arch in arches {
                    table.add_row(row![format!("Download ({arch})"), cask.arch[arch].url]);
                }
            }
        }
        FormulaKind::System => {
            let probe = match &formula.probe {
                Some(SystemProbe::Binary { binary }) => format!("binary `{binary}` on PATH"),
                Some(SystemProbe::PkgConfig { pkg_config }) => {
                    format!("pkg-config module `{pkg_config}`")
                }
                Some(SystemProbe::Path { path }) => format!("path {}", path.display()),
                None => "none".to_string(),
            };
            table.add_row(row!["Probe", probe]);
        }
    }
    table.printstd();

    if let Some(desc) = formula.desc.as_deref().filter(|d| !d.is_empty()) {
        println!("\n{}", "Description".blue().bold());
        println!("  {desc}");
    }

    if !formula.requirements.is_empty() {
        println!("\n{}", "Requirements".blue().bold());
        for requirement in &formula.requirements {
            println!("  {requirement}");
        }
    }

    if !formula.dependencies.is_empty() {
        println!("\n{}", "Dependencies".blue().bold());
        let mut dep_table = Table::new();
        dep_table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        for dep in &formula.dependencies {
            dep_table.add_row(row![format!("  {}", dep.name), format!("({})", dep.tags)]);
        }
        dep_table.printstd();
    }

    if let Some(caveats) = formula.caveats.as_deref().filter(|c| !c.trim().is_empty()) {
        println!("\n{}", "Caveats".blue().bold());
        for line in caveats.trim().lines() {
            println!("  {line}");
        }
    }
}
