use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel/app identifier understood by the `/launch/{id}` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(pub u32);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discrete control request. Each variant maps to one fixed request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "app_id", rename_all = "snake_case")]
pub enum Command {
    Power,
    Back,
    Home,
    Up,
    Down,
    Left,
    Right,
    Select,
    Launch(AppId),
}

impl Command {
    pub const KEYPRESSES: [Command; 8] = [
        Command::Power,
        Command::Back,
        Command::Home,
        Command::Up,
        Command::Down,
        Command::Left,
        Command::Right,
        Command::Select,
    ];

    pub fn path(&self) -> String {
        match self {
            Command::Launch(app_id) => format!("/launch/{app_id}"),
            key => format!("/keypress/{}", key.key_name().unwrap_or_default()),
        }
    }

    /// Short name of a keypress command; `None` for launches.
    pub fn key_name(&self) -> Option<&'static str> {
        match self {
            Command::Power => Some("power"),
            Command::Back => Some("back"),
            Command::Home => Some("home"),
            Command::Up => Some("up"),
            Command::Down => Some("down"),
            Command::Left => Some("left"),
            Command::Right => Some("right"),
            Command::Select => Some("select"),
            Command::Launch(_) => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Accepts key names (`home`, `ok`), `launch:<id>`, or a streaming app name (`netflix`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized == "ok" {
            return Ok(Command::Select);
        }
        if let Some(command) = Command::KEYPRESSES
            .into_iter()
            .find(|command| command.key_name() == Some(normalized.as_str()))
        {
            return Ok(command);
        }
        if let Some(id) = normalized.strip_prefix("launch:") {
            return id
                .parse::<u32>()
                .map(|id| Command::Launch(AppId(id)))
                .map_err(|_| UnknownCommand(raw.to_string()));
        }
        StreamingApp::find(&normalized)
            .map(|app| app.command())
            .ok_or_else(|| UnknownCommand(raw.to_string()))
    }
}

/// A well-known app with a fixed launch id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingApp {
    pub name: &'static str,
    pub app_id: AppId,
}

pub const STREAMING_APPS: [StreamingApp; 11] = [
    StreamingApp::new("Netflix", 12),
    StreamingApp::new("Hulu", 2285),
    StreamingApp::new("Max", 61322),
    StreamingApp::new("Apple TV", 551012),
    StreamingApp::new("Disney+", 291097),
    StreamingApp::new("Prime Video", 13),
    StreamingApp::new("YouTube", 837),
    StreamingApp::new("Paramount+", 291098),
    StreamingApp::new("Peacock", 593099),
    StreamingApp::new("ESPN+", 55270),
    StreamingApp::new("Crunchyroll", 2595),
];

/// Apps bound to the four launch buttons until the user reassigns them.
pub const DEFAULT_QUICK_LAUNCH: [&str; 4] = ["Hulu", "Netflix", "Max", "Apple TV"];

impl StreamingApp {
    const fn new(name: &'static str, app_id: u32) -> Self {
        Self {
            name,
            app_id: AppId(app_id),
        }
    }

    /// Case-insensitive lookup; spaces are optional (`appletv` matches `Apple TV`).
    pub fn find(name: &str) -> Option<StreamingApp> {
        let wanted = squash(name);
        STREAMING_APPS
            .into_iter()
            .find(|app| squash(app.name) == wanted)
    }

    pub fn command(&self) -> Command {
        Command::Launch(self.app_id)
    }
}

fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
