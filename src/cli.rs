//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// EdgeMesh Control Plane - zero-trust connection authorization
#[derive(Parser, Debug)]
#[command(name = "edgemesh-control")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGEMESH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "EDGEMESH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "EDGEMESH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "EDGEMESH_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGEMESH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the control plane server (default)
    Serve,
}
