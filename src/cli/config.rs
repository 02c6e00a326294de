use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use posixkit::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., logging.level, profiles.daemon)
        key: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(explicit, &format),
        ConfigCommands::Get { key } => get_config(explicit, &key),
        ConfigCommands::Path => show_path(explicit),
        ConfigCommands::Init { force } => init_config(explicit, force),
    }
}

fn show_config(explicit: Option<&Path>, format: &str) -> Result<()> {
    let config = Config::load(explicit)?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn get_config(explicit: Option<&Path>, key: &str) -> Result<()> {
    let config = Config::load(explicit)?;
    let value = config.get_value(key)?;
    println!("{}", value);
    Ok(())
}

fn show_path(explicit: Option<&Path>) -> Result<()> {
    let path = Config::resolve_path(explicit)?;
    println!("{}", path.display());
    Ok(())
}

fn init_config(explicit: Option<&Path>, force: bool) -> Result<()> {
    let config = Config {
        path: Config::resolve_path(explicit)?,
        ..Config::default()
    };
    config.save_with_template(force)?;

    println!("Created config file at {}", config.path.display());
    Ok(())
}
