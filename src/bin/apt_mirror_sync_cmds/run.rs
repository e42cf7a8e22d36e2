use anyhow::{Context, Error};
use serde_json::Value;

use proxmox_router::cli::CliCommand;
use proxmox_schema::api;

use apt_mirror_sync::config::Config;
use apt_mirror_sync::fetch::HttpFetcher;
use apt_mirror_sync::orchestrator::Run;

use super::get_config_path;

#[api(
    input: {
        properties: {
            conf: {
                type: String,
                optional: true,
                description: "Path to the mirroring configuration file.",
            },
            test: {
                type: bool,
                optional: true,
                default: false,
                description: "Discover and plan the sync, but fetch no artifacts and delete nothing.",
            },
            clean: {
                type: bool,
                optional: true,
                default: false,
                description: "Only run discovery and sweep (stages 1-4 and 7) - no artifact fetch or promotion.",
            },
            "no-progress": {
                type: bool,
                optional: true,
                default: false,
                description: "Suppress the human-readable progress summary.",
            },
        },
    },
)]
/// Synchronise the configured APT repositories into the local mirror.
async fn run(
    conf: Option<String>,
    test: bool,
    clean: bool,
    no_progress: bool,
    _param: Value,
) -> Result<(), Error> {
    let conf = conf.unwrap_or_else(get_config_path);
    let text = std::fs::read_to_string(&conf).with_context(|| format!("reading {conf}"))?;
    let config = Config::parse(&text)?;
    let test_mode = test || config.test;

    let fetcher = HttpFetcher::new(&config)?;
    let mut run = Run::new(config, &fetcher, test_mode);
    let summary = run.execute(clean)?;

    if summary.interrupted_previous_run {
        eprintln!("previous run was interrupted; reprocessed every index and artifact");
    }
    for uri in &summary.excluded_repositories {
        eprintln!("excluded {uri} from this run (no usable Release file)");
    }

    if !no_progress {
        println!("{}", summary.progress);
        println!(
            "promoted {} file(s) ({}b)",
            summary.promote_totals.files_copied, summary.promote_totals.bytes_copied
        );
        println!(
            "swept {} file(s) ({}b), pruned {} empty director{}",
            summary.sweep_totals.files_deleted,
            summary.sweep_totals.bytes_deleted,
            summary.sweep_totals.directories_pruned,
            if summary.sweep_totals.directories_pruned == 1 { "y" } else { "ies" },
        );
    }

    Ok(())
}

pub fn run_command() -> CliCommand {
    CliCommand::new(&API_METHOD_RUN)
}
