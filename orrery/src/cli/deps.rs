// orrery/src/cli/deps.rs
use clap::Args;
use colored::Colorize;
use orrery_common::dependency::{DependencyResolver, DependencyTag, ResolutionContext};
use orrery_common::error::Result;
use orrery_common::Catalog;
use prettytable::{format, Cell, Row, Table};

#[derive(Args, Debug)]
pub struct Deps {
    #[arg(required = true)]
    names: Vec<String>,

    #[arg(long)]
    include_optional: bool,

    /// Also list dependencies only needed while building
    #[arg(long)]
    include_build: bool,
}

impl Deps {
    pub fn run(&self, catalog: &Catalog) -> Result<()> {
        let mut context = ResolutionContext::new(catalog);
        context.include_optional = self.include_optional;
        let graph = DependencyResolver::new(context).resolve_targets(&self.names)?;

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("#").style_spec("b"),
            Cell::new("Name").style_spec("b"),
            Cell::new("Version").style_spec("b"),
            Cell::new("Kind").style_spec("b"),
            Cell::new("Tags").style_spec("b"),
        ]));

        let mut shown = 0;
        for node in &graph.install_plan {
            let build_only = !node.requested && node.accumulated_tags == DependencyTag::BUILD;
            if build_only && !self.include_build {
                continue;
            }
            shown += 1;
            let name_style = if node.requested { "Fgb" } else { "Fb" };
            table.add_row(Row::new(vec![
                Cell::new(&shown.to_string()),
                Cell::new(node.name()).style_spec(name_style),
                Cell::new(if node.formula.version.is_empty() {
                    "-"
                } else {
                    &node.formula.version
                }),
                Cell::new(&format!("{:?}", node.formula.kind).to_lowercase()),
                Cell::new(&node.accumulated_tags.to_string()),
            ]));
        }
        table.printstd();

        let hidden = graph.install_plan.len() - shown;
        if hidden > 0 {
            println!(
                "{}",
                format!("{hidden} build-only dependencies hidden (use --include-build)").dimmed()
            );
        }
        Ok(())
    }
}
