use anyhow::Result;
use clap::Parser;

use posixkit::Config;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    match cli.command {
        Commands::Run(args) => {
            let code = cli::run::run(args, &config?)?;
            std::process::exit(code);
        }
        Commands::Sendfile(args) => cli::sendfile::run(args),
        Commands::Config(args) => cli::config::run(args, cli.config.as_deref()),
    }
}
