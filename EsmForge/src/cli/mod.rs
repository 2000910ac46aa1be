//! EsmForge CLI - Command-line interface for ESM/ESP/omwsave files

pub mod commands;

use clap::Parser;
use commands::Commands;

use crate::formats::common::TextEncoding;

#[derive(Parser)]
#[command(name = "esmforge")]
#[command(version, about = "EsmForge: TES3 content and save file tools", long_about = None)]
struct Cli {
    /// Text encoding of strings in the files (utf8, win1250, win1251, win1252)
    #[arg(long, global = true, default_value_t = TextEncoding::Windows1252)]
    encoding: TextEncoding,

    /// Log reader progress and skipped data
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Run the EsmForge CLI
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    cli.command.execute(cli.encoding)?;

    Ok(())
}
