// orrery/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use orrery_common::error::Result;
use orrery_common::model::FormulaKind;
use orrery_common::Config;
use orrery_core::check::get_installed_packages;
use prettytable::{format, Cell, Row, Table};

#[derive(Args, Debug)]
pub struct List {}

impl List {
    pub fn run(&self, config: &Config) -> Result<()> {
        let installed = get_installed_packages(config)?;
        if installed.is_empty() {
            println!("{}", "0 formulas and casks installed".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Type").style_spec("b"),
            Cell::new("Name").style_spec("b"),
            Cell::new("Installed").style_spec("b"),
            Cell::new("Linked").style_spec("b"),
            Cell::new("Date").style_spec("b"),
        ]));

        let mut formula_count = 0;
        let mut cask_count = 0;
        for pkg in &installed {
            let kind = match pkg.pkg_type {
                FormulaKind::Cask => {
                    cask_count += 1;
                    Cell::new("Cask").style_spec("Fy")
                }
                _ => {
                    formula_count += 1;
                    Cell::new("Formula").style_spec("Fg")
                }
            };
            let name = if pkg.requested {
                pkg.name.clone()
            } else {
                format!("{} (dependency)", pkg.name)
            };
            table.add_row(Row::new(vec![
                kind,
                Cell::new(&name).style_spec("Fb"),
                Cell::new(&pkg.version),
                Cell::new(if pkg.opt_linked { "✔" } else { "" }),
                Cell::new(&pkg.installed_at.format("%Y-%m-%d").to_string()),
            ]));
        }
        table.printstd();

        if formula_count > 0 && cask_count > 0 {
            println!(
                "{}",
                format!("{formula_count} formulas, {cask_count} casks installed").bold()
            );
        } else if formula_count > 0 {
            println!("{}", format!("{formula_count} formulas installed").bold());
        } else {
            println!("{}", format!("{cask_count} casks installed").bold());
        }
        Ok(())
    }
}
