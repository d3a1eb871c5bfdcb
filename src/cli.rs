//! Command line interface built on clap.
//!
//! [`Cli`] carries the global flags (--config, --rules, --verbose) and one of
//! the [`Command`] subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Job entitlement engine: validate rule tables and replay job transitions.
#[derive(Debug, Parser)]
#[command(name = "jobgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the engine config file.
    #[arg(long, global = true, default_value = crate::config::CONFIG_FILE)]
    pub config: PathBuf,

    /// Rule table to use instead of the configured one.
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Loads and validates the rule table, then prints a summary per job.
    Check,

    /// Shows the bundle a user at LEVEL receives when joining JOB.
    Resolve {
        job: String,
        level: u32,
    },

    /// Replays a JSON scenario through the engine with in-memory collaborators.
    Simulate {
        /// Path to the scenario file.
        scenario: PathBuf,

        /// Dispatch all events at once instead of one after another.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Print each transition record as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
