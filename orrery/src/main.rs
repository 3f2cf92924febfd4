// orrery/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use orrery_common::catalog::Catalog;
use orrery_common::config::Config;
use orrery_common::error::Result;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

fn init_logging(config: &Config, verbose: u8) {
    let level_filter = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("ORRERY_LOG")
        .from_env_lossy();

    let log_dir = config.logs_dir();
    if verbose == 0 {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
        return;
    }

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "{} Failed to create log directory {}: {}",
            "Warning:".yellow().bold(),
            log_dir.display(),
            e
        );
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
        return;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "orrery.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let stderr_writer = std::io::stderr.with_max_level(max_log_level);
    let file_writer = non_blocking_appender.with_max_level(max_log_level);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr_writer.and(file_writer))
        .with_ansi(true)
        .without_time()
        .try_init();

    // Flushes the file writer on drop; it must live for the whole process.
    Box::leak(Box::new(guard));
    debug!(
        "Verbose logging enabled. Writing logs to: {}/orrery.log",
        log_dir.display()
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli_args = CliArgs::parse();

    if let Err(e) = run(cli_args).await {
        error!("Command failed: {:#}", e);
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli_args: CliArgs) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = &cli_args.catalog {
        config.catalog_override = Some(dir.clone());
    }
    init_logging(&config, cli_args.verbose);

    let catalog = Catalog::for_config(&config)?;
    debug!(
        "Using {} catalog with {} formulas",
        config
            .catalog_override
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
        catalog.len()
    );

    cli_args.command.run(&config, &catalog).await?;
    debug!("Command completed successfully.");
    Ok(())
}
