use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod clock;
pub mod host;
pub mod reactive;
pub mod timers;
pub mod turns;

pub use app::{
    glyph_advance, line_advance, run_app, text_width, ActionStates, AppError, Canvas, ClientApp,
    InputAction, InputSnapshot, LoopConfig, LoopMetricsSnapshot, MetricsHandle, Renderer, Rgba,
    Scene, SceneMachine, Viewport,
};
pub use clock::{Clock, ManualClock, SystemClock, MANUAL_CLOCK_EPOCH_MS};
pub use host::{
    EngineError, EngineFactory, FrameEngine, LifecycleCounters, MountOutcome, RenderLoopHost,
};
pub use reactive::{EventHub, Invalidation, Observable, Subscription, TrackingScope};
pub use timers::{TimerHandle, TimerQueue};
pub use turns::{run_off_thread, TurnQueue, TurnSender};

pub const ROOT_ENV_VAR: &str = "DUNGEON_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir.join("runs.ledger")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create data directory at {path}: {source}")]
    CreateDataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "DUNGEON_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and a crates/ directory."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Set {env_var} to the checkout that contains Cargo.toml and crates/."
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    paths_for_root(root)
}

pub fn paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).map_err(|source| StartupError::CreateDataDir {
        path: data_dir.clone(),
        source,
    })?;
    Ok(AppPaths { root, data_dir })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && path.join("crates").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn repo_marker_requires_cargo_toml_and_crates() {
        let temp = TempDir::new().expect("temp dir");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        assert!(!is_repo_marker(temp.path()));

        fs::create_dir(temp.path().join("crates")).expect("crates dir");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn paths_for_root_creates_data_dir() {
        let temp = TempDir::new().expect("temp dir");
        let paths = paths_for_root(temp.path().to_path_buf()).expect("paths");

        assert!(paths.data_dir.is_dir());
        assert_eq!(paths.settings_file(), paths.data_dir.join("settings.json"));
        assert_eq!(paths.ledger_file(), paths.data_dir.join("runs.ledger"));
    }
}
