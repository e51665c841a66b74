mod cli;
mod commands;
mod logging;

use std::process;

use clap::Parser;
use tracing::error;

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let args = Args::parse();
    logging::init(args.log_format, args.verbose);

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether every notification passed.
async fn run(args: Args) -> anyhow::Result<bool> {
    match args.command {
        Commands::Send(send) => {
            let report = commands::send(send).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.all_succeeded())
        }
        Commands::Validate(input) => {
            let report = commands::validate(&input)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.is_clean())
        }
    }
}
