//! bizclass CLI: classify businesses into NAICS, SIC and MCC codes.
//!
//! Looks at the business name and, when given, its website, and prints the
//! classification result as JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
