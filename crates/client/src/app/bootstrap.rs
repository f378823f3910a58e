use std::rc::Rc;
use std::sync::Arc;

use dungeon_engine::{
    resolve_app_paths, LoopConfig, MetricsHandle, StartupError, SystemClock, Viewport,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::screen::{GameScreen, ScreenConfig};
use crate::submission::LedgerStore;

const RELAY_ADDR_ENV_VAR: &str = "DUNGEON_RELAY_ADDR";
const PLAYER_ENV_VAR: &str = "DUNGEON_PLAYER";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) screen: GameScreen,
    pub(crate) metrics: MetricsHandle,
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    info!("=== Dungeon Crawler Startup ===");

    let paths = resolve_app_paths()?;
    let config = LoopConfig::default();
    let metrics = MetricsHandle::default();
    let relay_addr = non_empty_env(RELAY_ADDR_ENV_VAR);
    info!(
        root = %paths.root.display(),
        relay = relay_addr.as_deref().unwrap_or("disabled"),
        "app_paths_resolved"
    );

    let screen = GameScreen::new(ScreenConfig {
        settings_path: paths.settings_file(),
        player_override: non_empty_env(PLAYER_ENV_VAR),
        store: Arc::new(LedgerStore::new(paths.ledger_file())),
        relay_addr,
        clock: Rc::new(SystemClock),
        metrics: metrics.clone(),
        viewport: Viewport {
            width: config.window_width,
            height: config.window_height,
        },
    });

    Ok(AppWiring {
        config,
        screen,
        metrics,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
