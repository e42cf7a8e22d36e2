use proxmox_router::cli::{run_cli_command, CliCommandMap, CliEnvironment};

mod apt_mirror_sync_cmds;
use apt_mirror_sync_cmds::{config::config_commands, run::run_command};

fn main() {
    let rpcenv = CliEnvironment::new();

    let cmd_def = CliCommandMap::new()
        .insert("run", run_command())
        .insert("config", config_commands());

    run_cli_command(
        cmd_def,
        rpcenv,
        Some(|future| proxmox_async::runtime::main(future)),
    );
}
