use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nc-controller", version, about = "Network Controller core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a config file and start the controller and evidence worker.
    Run(RunCmd),
}

#[derive(Debug, Parser)]
pub struct RunCmd {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    pub config: String,
}
