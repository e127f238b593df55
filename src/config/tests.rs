use super::settings::Settings;
use super::{load_config, load_config_from};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.channel_capacity, 16);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    temp_env::with_vars_unset(
        ["HUBBUB_BROKER__CHANNEL_CAPACITY", "HUBBUB_LOG__LEVEL"],
        || {
            let cfg = load_config_from("does/not/exist").expect("load_config failed");
            assert_eq!(cfg, Settings::default());
        },
    );
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let base = tmp.path().join("hubbub");
    fs::write(
        base.with_extension("toml"),
        r#"
            [broker]
            channel_capacity = 4
        "#,
    )
    .expect("write config file");

    temp_env::with_vars_unset(
        ["HUBBUB_BROKER__CHANNEL_CAPACITY", "HUBBUB_LOG__LEVEL"],
        || {
            let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");
            assert_eq!(cfg.broker.channel_capacity, 4);
            // untouched section keeps its default
            assert_eq!(cfg.log.level, "info");
        },
    );
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let base = tmp.path().join("hubbub");
    fs::write(
        base.with_extension("toml"),
        r#"
            [broker]
            channel_capacity = 4

            [log]
            level = "warn"
        "#,
    )
    .expect("write config file");

    temp_env::with_vars(
        [
            ("HUBBUB_BROKER__CHANNEL_CAPACITY", Some("128")),
            ("HUBBUB_LOG__LEVEL", None),
        ],
        || {
            let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");
            assert_eq!(cfg.broker.channel_capacity, 128);
            assert_eq!(cfg.log.level, "warn");
        },
    );
}

#[test]
#[serial]
fn test_load_config_reads_working_directory() {
    // load_config picks up config/default.toml relative to the current dir.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = std::env::current_dir().expect("current_dir");
    std::env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    fs::write(
        "config/default.toml",
        r#"
            [log]
            level = "debug"
        "#,
    )
    .expect("write config file");

    let cfg = temp_env::with_vars_unset(
        ["HUBBUB_BROKER__CHANNEL_CAPACITY", "HUBBUB_LOG__LEVEL"],
        load_config,
    );

    // restore cwd before asserting so a failure doesn't leak into other tests
    std::env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.broker.channel_capacity, 16);
}
