use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::util::SubscriberInitExt;

use romtool::catalog::{DEFAULT_CONFIG_FILE, RomToolConfig};
use romtool::layout::FlashLayout;
use romtool::pipeline;

#[derive(Parser)]
#[command(name = "romtool")]
#[command(version, about = "Builds UF2 ROM and config images for the CPC ROM board", long_about = None)]
struct Cli {
    /// Config file to read
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// More logging, repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = RomToolConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let written = pipeline::run(&config, FlashLayout::default()).context("Build failed")?;
    info!("Done, wrote {} file(s)", written.len());
    Ok(())
}
