//! Command-line flags for the `chessbot` binary.

use std::path::PathBuf;

use clap::Parser;

/// A Matrix bot that plays chess in the rooms it is invited to.
#[derive(Debug, Parser)]
#[command(name = "chessbot", version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CHESSBOT_CONFIG", default_value = "./config.toml")]
    pub config: PathBuf,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long, env = "CHESSBOT_LOGLEVEL", default_value = "debug")]
    pub loglevel: String,

    /// Also append logs to this file.
    #[arg(long, env = "CHESSBOT_LOGFILE")]
    pub logfile: Option<PathBuf>,

    /// SQLite database holding sessions and room state.
    #[arg(long, env = "CHESSBOT_DBFILE", default_value = "./chessbot.db")]
    pub dbfile: PathBuf,
}
