// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, config file discovery, env var overrides, and validation errors

use serial_test::serial;
use std::io::Write;

use shoal::message::ChannelType;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("SHOAL_CONFIG_PATH");
    std::env::remove_var("TELEGRAM_BOT_TOKEN");
    std::env::remove_var("SHOAL_ADMINS");
    std::env::remove_var("LOCALSTORE_PATH");
    std::env::remove_var("LOCALSTORE_BASE_URL");
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let config_path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    config_path
}

const BASIC: &str = r#"
[bindings.generalChat]
wechat = "wechatRoomA"
telegram = "-100123"

[localstore]
path = "/srv/shoal/files"
base_url = "https://files.example.com"

[telegram]
bot_token = "123456:ABC"
admins = [42]
"#;

#[test]
#[serial]
fn test_config_loads_from_env_path() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, BASIC);
    std::env::set_var("SHOAL_CONFIG_PATH", path.to_str().unwrap());

    let config = shoal::config::Config::load().unwrap();

    assert_eq!(
        config.bound_channels(),
        vec![ChannelType::Telegram, ChannelType::Wechat]
    );
    let binding = config.binding_for(ChannelType::Wechat).unwrap();
    assert_eq!(binding.logical_room("wechatRoomA"), Some("generalChat"));
    assert_eq!(config.operator_recipients(), vec![42]);
    assert_eq!(config.supervisor.notify_timeout_secs, 10);
    assert!(!config.console.enabled);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_env_var_overrides() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, BASIC);

    std::env::set_var("TELEGRAM_BOT_TOKEN", "999:OVERRIDE");
    std::env::set_var("SHOAL_ADMINS", "7, 8");
    std::env::set_var("LOCALSTORE_BASE_URL", "https://cdn.example.com");
    std::env::set_var("LOCALSTORE_PATH", "/tmp/shoal-files");

    let config = shoal::config::Config::load_from(&path).unwrap();
    let tg = config.telegram.as_ref().unwrap();
    assert_eq!(tg.bot_token, "999:OVERRIDE");
    assert_eq!(tg.admins, vec![7, 8]);
    let store = config.localstore.as_ref().unwrap();
    assert_eq!(store.base_url, "https://cdn.example.com");
    assert_eq!(store.path, "/tmp/shoal-files");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_rejects_non_numeric_admins() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, BASIC);
    std::env::set_var("SHOAL_ADMINS", "42,alice");

    let err = shoal::config::Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("SHOAL_ADMINS"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_requires_bindings() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[console]\nenabled = true\n");

    let err = shoal::config::Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("bindings"));
}

#[test]
#[serial]
fn test_config_rejects_unknown_backend() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[bindings.lobby]\nicq = \"12345\"\n");

    let err = shoal::config::Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Unknown channel type: icq"));
}

#[test]
#[serial]
fn test_config_debug_redacts_token() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, BASIC);

    let config = shoal::config::Config::load_from(&path).unwrap();
    let debug = format!("{:?}", config);
    assert!(!debug.contains("123456:ABC"));
    assert!(debug.contains("[REDACTED]"));
}
