use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use remote_core::{ActivitySettings, DispatchSettings, RemoteSettings, ScanSettings};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "remote.toml";
const ENV_PREFIX: &str = "REMOTE__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_port: u16,
    pub broadcast_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub fade_duration_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let core = RemoteSettings::default();
        Self {
            service_port: core.scan.service_port,
            broadcast_timeout_ms: millis(core.scan.broadcast_timeout),
            probe_timeout_ms: millis(core.scan.probe_timeout),
            request_timeout_ms: millis(core.dispatch.request_timeout),
            idle_timeout_ms: millis(core.activity.idle_timeout),
            fade_duration_ms: millis(core.activity.fade_duration),
        }
    }
}

/// Keys accepted in `remote.toml`; anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    service_port: Option<u16>,
    broadcast_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
    fade_duration_ms: Option<u64>,
}

/// Defaults, then the config file, then `REMOTE__*` variables.
///
/// A missing `remote.toml` in the working directory is fine; a missing file passed
/// explicitly with `--config` is an error.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => settings.apply_file(&raw, &path),
        Err(err) if err.kind() == ErrorKind::NotFound && explicit.is_none() => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config '{}'", path.display()))
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

impl Settings {
    fn apply_file(&mut self, raw: &str, path: &Path) {
        let file_cfg = match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => file_cfg,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config: ignoring unparseable file");
                return;
            }
        };

        if let Some(v) = file_cfg.service_port {
            self.service_port = v;
        }
        if let Some(v) = file_cfg.broadcast_timeout_ms {
            self.broadcast_timeout_ms = v;
        }
        if let Some(v) = file_cfg.probe_timeout_ms {
            self.probe_timeout_ms = v;
        }
        if let Some(v) = file_cfg.request_timeout_ms {
            self.request_timeout_ms = v;
        }
        if let Some(v) = file_cfg.idle_timeout_ms {
            self.idle_timeout_ms = v;
        }
        if let Some(v) = file_cfg.fade_duration_ms {
            self.fade_duration_ms = v;
        }
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_from(&lookup, "SERVICE_PORT", &mut self.service_port);
        override_from(&lookup, "BROADCAST_TIMEOUT_MS", &mut self.broadcast_timeout_ms);
        override_from(&lookup, "PROBE_TIMEOUT_MS", &mut self.probe_timeout_ms);
        override_from(&lookup, "REQUEST_TIMEOUT_MS", &mut self.request_timeout_ms);
        override_from(&lookup, "IDLE_TIMEOUT_MS", &mut self.idle_timeout_ms);
        override_from(&lookup, "FADE_DURATION_MS", &mut self.fade_duration_ms);
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            scan: ScanSettings {
                service_port: self.service_port,
                broadcast_timeout: Duration::from_millis(self.broadcast_timeout_ms),
                probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            },
            activity: ActivitySettings {
                idle_timeout: Duration::from_millis(self.idle_timeout_ms),
                fade_duration: Duration::from_millis(self.fade_duration_ms),
                ..ActivitySettings::default()
            },
            dispatch: DispatchSettings {
                request_timeout: Duration::from_millis(self.request_timeout_ms),
            },
        }
    }
}

fn override_from<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) {
    let key = format!("{ENV_PREFIX}{name}");
    let Some(raw) = lookup(&key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(%key, value = %raw, "config: ignoring unparseable value"),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
