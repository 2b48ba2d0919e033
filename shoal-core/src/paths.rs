// ABOUTME: Per-user locations the relay reads and writes outside its config
// ABOUTME: Resolves the daily log directory, default attachment store and user config file

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "shoal", "shoal")
}

/// Root for everything the relay writes (~/.local/share/shoal on Linux).
/// Falls back to ./data when no home directory can be determined.
fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Where the daily `shoal.log` files roll
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Attachment directory used when `[localstore] path` is left out
pub fn store_dir() -> PathBuf {
    data_dir().join("files")
}

/// Last place config discovery looks, after `SHOAL_CONFIG_PATH` and ./config.toml
pub fn config_file() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}
