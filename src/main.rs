//! Parcel subdivision feasibility CLI.
//!
//! Resolves one county parcel, overlays hazard and utility layers, carves the
//! buildable area into candidate lot layouts, and scores, costs, and exports
//! them. See `pfeas --help` for the command surface.
mod cli;
mod client;
mod config;
mod context;
mod crs;
mod error;
mod geometry;
mod pipeline;
mod staging;
mod summary;
mod tags;
mod util;
mod workflow;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    init_tracing(args.command.verbose());

    match args.command {
        cli::Command::Run(args) => workflow::run_run(args),
        cli::Command::InitConfig(args) => workflow::run_init_config(args),
        cli::Command::CheckConfig(args) => workflow::run_check_config(args),
    }
}
