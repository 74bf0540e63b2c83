//! Command implementations

pub mod config;
pub mod model;
pub mod search;
pub mod version;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Model(args) => model::run(ctx, args),
        Commands::Version(args) => version::run(ctx, args),
        Commands::Search(args) => search::run(ctx, args),
        Commands::Config(args) => config::run(ctx, args),
    }
}
