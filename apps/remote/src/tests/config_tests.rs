use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_match_core_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.service_port, 8060);
    assert_eq!(settings.broadcast_timeout_ms, 3000);
    assert_eq!(settings.probe_timeout_ms, 1000);
    assert_eq!(settings.request_timeout_ms, 5000);
    assert_eq!(settings.idle_timeout_ms, 10_000);
    assert_eq!(settings.fade_duration_ms, 500);
    assert_eq!(settings.remote_settings(), RemoteSettings::default());
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    settings.apply_file(
        "service_port = 9080\nprobe_timeout_ms = 250\n",
        Path::new("remote.toml"),
    );

    assert_eq!(settings.service_port, 9080);
    assert_eq!(settings.probe_timeout_ms, 250);
    assert_eq!(settings.broadcast_timeout_ms, 3000);
}

#[test]
fn unparseable_file_keeps_defaults() {
    let mut settings = Settings::default();
    settings.apply_file("service_port = \"not a port\"", Path::new("remote.toml"));
    assert_eq!(settings, Settings::default());
}

#[test]
fn env_overrides_file_and_skips_bad_values() {
    let mut settings = Settings::default();
    settings.apply_file("idle_timeout_ms = 2000\n", Path::new("remote.toml"));
    settings.apply_env(env_of(&[
        ("REMOTE__IDLE_TIMEOUT_MS", "4000"),
        ("REMOTE__FADE_DURATION_MS", " 120 "),
        ("REMOTE__SERVICE_PORT", "seventy"),
        ("IDLE_TIMEOUT_MS", "1"),
    ]));

    assert_eq!(settings.idle_timeout_ms, 4000);
    assert_eq!(settings.fade_duration_ms, 120);
    assert_eq!(settings.service_port, 8060);

    let core = settings.remote_settings();
    assert_eq!(core.activity.idle_timeout, Duration::from_secs(4));
    assert_eq!(core.activity.fade_duration, Duration::from_millis(120));
    assert_eq!(core.activity.frame_interval, Duration::from_millis(16));
}

#[test]
fn explicit_config_path_must_exist() {
    let missing = env::temp_dir().join("remote_config_that_does_not_exist.toml");
    let err = load_settings(Some(&missing)).expect_err("missing explicit config");
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn explicit_config_file_is_loaded() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("remote_config_test_{suffix}.toml"));
    fs::write(&path, "request_timeout_ms = 750\n").expect("write config");

    let settings = load_settings(Some(&path)).expect("config loads");
    fs::remove_file(&path).expect("cleanup");

    if env::var("REMOTE__REQUEST_TIMEOUT_MS").is_err() {
        assert_eq!(settings.request_timeout_ms, 750);
    }
}
