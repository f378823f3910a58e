use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dungeon_engine::{run_off_thread, TurnQueue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub(crate) const DEFAULT_PLAYER_ADDRESS: &str = "local-player";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) pixel_art_mode: bool,
    pub(crate) show_fps: bool,
    pub(crate) show_health_bars: bool,
    pub(crate) player_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pixel_art_mode: true,
            show_fps: false,
            show_health_bars: true,
            player_address: DEFAULT_PLAYER_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("failed to read settings '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings '{}' at {field}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings '{}': {field} {message}", .path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        message: &'static str,
    },
    #[error("failed to start settings loader: {0}")]
    Worker(#[source] io::Error),
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub(crate) fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let settings = parse_settings(path, &raw)?;
    validate_settings(path, &settings)?;
    Ok(settings)
}

fn parse_settings(path: &Path, raw: &str) -> Result<Settings, SettingsError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Settings>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        SettingsError::Parse {
            path: path.to_path_buf(),
            field: if field.is_empty() { ".".to_string() } else { field },
            source: error.into_inner(),
        }
    })
}

fn validate_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let address = &settings.player_address;
    if address.is_empty() {
        return Err(SettingsError::Invalid {
            path: path.to_path_buf(),
            field: "player_address",
            message: "must not be empty",
        });
    }
    if address.chars().any(char::is_whitespace) {
        return Err(SettingsError::Invalid {
            path: path.to_path_buf(),
            field: "player_address",
            message: "must not contain whitespace",
        });
    }
    Ok(())
}

fn with_player_override(mut settings: Settings, player: Option<&str>) -> Settings {
    if let Some(player) = player {
        settings.player_address = player.to_string();
    }
    settings
}

/// Loads settings on a worker thread; results are picked up by [`Self::poll`].
#[derive(Debug)]
pub(crate) struct SettingsLoader {
    path: PathBuf,
    player_override: Option<String>,
    results: TurnQueue<Result<Settings, SettingsError>>,
}

impl SettingsLoader {
    pub(crate) fn new(path: PathBuf, player_override: Option<String>) -> Self {
        Self {
            path,
            player_override,
            results: TurnQueue::new(),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// What to run with when the file cannot be used.
    pub(crate) fn fallback(&self) -> Settings {
        with_player_override(Settings::default(), self.player_override.as_deref())
    }

    pub(crate) fn request(&self) {
        let path = self.path.clone();
        let player_override = self.player_override.clone();
        info!(path = %self.path.display(), "settings_load_requested");
        let spawned = run_off_thread("settings-load", self.results.sender(), move || {
            load_settings(&path)
                .map(|settings| with_player_override(settings, player_override.as_deref()))
        });
        if let Err(error) = spawned {
            warn!(error = %error, "settings_loader_spawn_failed");
            let _ = self
                .results
                .sender()
                .deliver(Err(SettingsError::Worker(error)));
        }
    }

    /// The newest completed load, if any arrived since the last poll.
    pub(crate) fn poll(&self) -> Option<Result<Settings, SettingsError>> {
        self.results.drain().pop()
    }
}
