pub mod config;
pub mod run;

pub fn get_config_path() -> String {
    std::env::var("APT_MIRROR_SYNC_CONFIG")
        .unwrap_or_else(|_| "/etc/apt-mirror-sync.conf".to_string())
}
