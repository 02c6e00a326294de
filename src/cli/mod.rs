pub mod config;
pub mod run;
pub mod sendfile;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "posixkit")]
#[command(author, version, about = "Launch programs with POSIX spawn attributes")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "POSIXKIT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program with spawn attributes applied
    Run(run::RunArgs),

    /// Copy a file with sendfile
    Sendfile(sendfile::SendfileArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}
