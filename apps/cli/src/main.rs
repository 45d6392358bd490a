//! goalforge CLI: trim Amazon Ads bulk exports and synthesize Perpetua
//! single-campaign goal sheets.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
