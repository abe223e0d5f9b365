//! promosync: push pro-plan customers with recent engagement to the
//! Iterable marketing API.

mod config;
mod export;
mod logging;
mod run;

use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = config::Cli::parse();
    logging::init(&cli.log_level, &cli.log_dir);

    if let Err(err) = run::run(&cli).await {
        tracing::error!("Sync run failed: {err:#}");
        std::process::exit(1);
    }
}
