use anyhow::{Context, Error};
use serde_json::Value;

use proxmox_router::cli::{CliCommand, CliCommandMap, CommandLineInterface};
use proxmox_schema::api;

use apt_mirror_sync::config::Config;
use apt_mirror_sync::repository::Repository;

#[api(
    input: {
        properties: {
            path: {
                type: String,
                description: "Path to the mirroring configuration file to validate.",
            },
        },
    },
)]
/// Parse and validate a configuration file without running a sync. Prints
/// the parsed repository list and the resolved mirror/staging/var roots;
/// exits non-zero on a parse failure.
async fn check(path: String, _param: Value) -> Result<(), Error> {
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = Config::parse(&text)?;

    println!("mirror root: {}", config.mirror_root().display());
    println!("staging root: {}", config.skel_root().display());
    println!("var root: {}", config.var_root().display());
    println!("{} repositories:", config.repositories.len());
    for repo in &config.repositories {
        println!("  {}", describe(repo));
    }

    Ok(())
}

fn describe(repo: &Repository) -> String {
    if repo.flat() {
        format!("{:?} (flat) {}", repo.kind, repo.uri)
    } else {
        format!(
            "{:?} {} {} [{}] arches={}",
            repo.kind,
            repo.uri,
            repo.distribution,
            repo.components.join(","),
            repo.architectures.join(",")
        )
    }
}

pub fn config_commands() -> CommandLineInterface {
    CliCommandMap::new()
        .insert("check", CliCommand::new(&API_METHOD_CHECK).arg_param(&["path"]))
        .into()
}
