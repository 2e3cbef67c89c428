use crate::cli::{CheckConfigArgs, InitConfigArgs, RunArgs};
use crate::client::FeatureClient;
use crate::config::{default_config, load_config, write_config, FeasibilityConfig};
use crate::pipeline::{run_feasibility, PipelineEnv};
use crate::summary::FeasibilitySummary;
use crate::util::{display_path, sanitize_file_component};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// `<tmp>/feasibility_outputs/<parcel>`.
pub fn default_output_dir(parcel_id: &str) -> PathBuf {
    std::env::temp_dir()
        .join("feasibility_outputs")
        .join(sanitize_file_component(parcel_id))
}

/// CLI flags win over the config file and environment.
fn apply_cli_overrides(config: &mut FeasibilityConfig, args: &RunArgs) {
    if args.offline {
        config.client.offline = true;
    }
    if let Some(dir) = &args.fixtures {
        config.client.fixtures_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.client.cache_dir = Some(dir.clone());
    }
}

fn shown(path: &Path) -> String {
    let cwd = std::env::current_dir().ok();
    display_path(path, cwd.as_deref())
}

pub fn run_run(args: RunArgs) -> Result<()> {
    let parcel_id = args.parcel_id.trim();
    if parcel_id.is_empty() {
        return Err(anyhow!("--parcel-id must be non-empty"));
    }
    let output_dir = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_dir(parcel_id));
    FeasibilitySummary::pending(parcel_id).write(&output_dir)?;

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            FeasibilitySummary::aborted(parcel_id, &err).write(&output_dir)?;
            return Err(err);
        }
    };
    apply_cli_overrides(&mut config, &args);
    let client = FeatureClient::from_settings(&config.client);
    let env = PipelineEnv {
        client: &client,
        config: &config,
        output_dir: &output_dir,
    };
    FeasibilitySummary::running(parcel_id).write(&output_dir)?;
    info!(output_dir = %output_dir.display(), "writing outputs");

    let (mut summary, outcome) = match run_feasibility(parcel_id, &env) {
        Ok(ctx) => (FeasibilitySummary::from_context(&ctx), Ok(())),
        Err(err) => {
            error!(parcel_id, error = %err, "feasibility run rejected");
            let summary = FeasibilitySummary::failed(parcel_id, &err);
            (summary, Err(anyhow::Error::new(err)))
        }
    };
    summary.exports.insert(
        "summary".to_string(),
        output_dir.join(crate::summary::SUMMARY_FILE),
    );
    let path = summary.write(&output_dir)?;

    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
        println!("{text}");
    } else {
        print!("{}", summary.render_text());
        println!("wrote {}", shown(&path));
    }
    outcome
}

pub fn run_init_config(args: InitConfigArgs) -> Result<()> {
    if args.out.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.out.display()
        ));
    }
    write_config(&args.out, &default_config())?;
    println!("wrote {}", shown(&args.out));
    Ok(())
}

pub fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = load_config(Some(&args.config))
        .with_context(|| format!("check config {}", args.config.display()))?;
    println!(
        "ok: {} ({} zoning rules, {} parcel sources)",
        shown(&args.config),
        config.zoning_rules.len(),
        config.services.parcel_sources.len()
    );
    Ok(())
}
