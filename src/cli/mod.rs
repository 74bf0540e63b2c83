//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// Model registry - register, version, and promote machine-learning models
#[derive(Parser, Debug)]
#[command(name = "mreg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout for scripts and agents
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/mreg/config.toml, then .mreg/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backing store connection string, e.g. sqlite:///registry.db
    #[arg(long, global = true, value_name = "URI")]
    pub store_uri: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage registered models
    Model(commands::model::ModelArgs),

    /// Manage model versions
    Version(commands::version::VersionArgs),

    /// Search model versions with a single equality filter
    Search(commands::search::SearchArgs),

    /// Show the effective configuration
    Config(commands::config::ConfigArgs),
}
