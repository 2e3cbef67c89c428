//! CLI argument parsing for the feasibility workflow.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "pfeas",
    version,
    about = "Parcel subdivision feasibility over county GIS services",
    after_help = "Commands:\n  run --parcel-id <id>          Analyze one parcel and write exports + summary.json\n  init-config --out <path>      Write the default config\n  check-config --config <path>  Load and validate a config\n\nExamples:\n  pfeas init-config --out feasibility.json\n  pfeas run --parcel-id 00373600100100 --config feasibility.json\n  pfeas run --parcel-id 00373600100100 --offline --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    InitConfig(InitConfigArgs),
    CheckConfig(CheckConfigArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Run(args) => args.verbose,
            Command::InitConfig(_) | Command::CheckConfig(_) => false,
        }
    }
}

/// Run command inputs for a single parcel.
#[derive(Parser, Debug)]
#[command(about = "Run the feasibility pipeline for one parcel")]
pub struct RunArgs {
    /// County parcel identifier
    #[arg(long, value_name = "ID")]
    pub parcel_id: String,

    /// Feasibility config JSON (defaults apply when omitted)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory for exports and summary.json
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Serve every request from fixtures; never touch the network
    #[arg(long)]
    pub offline: bool,

    /// Fixture directory used in offline mode
    #[arg(long, value_name = "DIR")]
    pub fixtures: Option<PathBuf>,

    /// Directory for cached layer queries
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Write the default feasibility config")]
pub struct InitConfigArgs {
    /// Destination path for the config JSON
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Load and validate a feasibility config")]
pub struct CheckConfigArgs {
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse() {
        let args = RootArgs::try_parse_from([
            "pfeas",
            "run",
            "--parcel-id",
            "00373600100100",
            "--offline",
            "--fixtures",
            "fx",
            "--json",
        ])
        .expect("parse");
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.parcel_id, "00373600100100");
        assert!(run.offline && run.json && !run.verbose);
        assert_eq!(run.fixtures, Some(PathBuf::from("fx")));
        assert_eq!(run.out, None);
    }

    #[test]
    fn run_requires_parcel_id() {
        assert!(RootArgs::try_parse_from(["pfeas", "run", "--offline"]).is_err());
    }

    #[test]
    fn subcommands_use_kebab_case() {
        let args = RootArgs::try_parse_from(["pfeas", "check-config", "--config", "c.json"])
            .expect("parse");
        assert!(matches!(args.command, Command::CheckConfig(_)));
        assert!(!args.command.verbose());
    }
}
