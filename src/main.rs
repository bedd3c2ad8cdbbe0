mod app;
mod cli;
mod db;
mod device;
mod http;
mod paths;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    app::run(cli)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "podshuffler=warn",
        1 => "podshuffler=info",
        2 => "podshuffler=debug",
        _ => "podshuffler=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
