//! digestmerge CLI: merge a batch of newsletter digests into one
//! deduplicated compendium.
//!
//! Reads digests from a Maildir, keeps each distinct paragraph once, mails
//! the result, and archives the processed messages.

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
