//! The game screen: owns the stores for its whole lifetime and mounts the
//! engine through a [`RenderLoopHost`] once settings are available.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use dungeon_engine::{
    text_width, Canvas, ClientApp, Clock, EngineError, EngineFactory, FrameEngine, InputAction,
    InputSnapshot, MetricsHandle, MountOutcome, Observable, RenderLoopHost, Rgba, SceneMachine,
    TimerQueue, Viewport,
};
use tracing::{debug, info, warn};

use crate::net::{Outbox, RelayLink};
use crate::overlay::{OverlayLayer, OverlaySources};
use crate::scenes::{build_roster, roster, SceneContext, SceneFlow, SceneStyle, ScreenSignals};
use crate::settings::{Settings, SettingsLoader};
use crate::state::{ActiveScene, MultiplayerState, SessionState};
use crate::submission::{RecordStore, ResultSubmitter, SubmissionBridge};

const LOADING_BACKGROUND: Rgba = [12, 10, 16, 255];
const LOADING_TEXT: Rgba = [160, 160, 176, 255];

/// Submission capability compared by identity.
#[derive(Clone)]
pub(crate) struct SubmitterHandle(pub(crate) Rc<dyn ResultSubmitter>);

impl PartialEq for SubmitterHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for SubmitterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubmitterHandle({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Everything the engine is rebuilt for when it changes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EngineDeps {
    pub(crate) pixel_art: bool,
    pub(crate) submitter: SubmitterHandle,
}

pub(crate) struct DungeonEngine {
    machine: SceneMachine<ActiveScene>,
    session: SessionState,
}

impl DungeonEngine {
    /// Starts whichever scene `active_scene` names, if it is not running.
    fn follow_active_scene(&mut self) {
        let target = self.session.active_scene.get();
        if self.machine.active_scene() != Some(target) {
            self.machine.start(target);
        }
    }

    pub(crate) fn running_scene(&self) -> Option<ActiveScene> {
        self.machine.active_scene()
    }

    fn debug_title(&self) -> Option<String> {
        self.machine.debug_title_active()
    }
}

impl FrameEngine for DungeonEngine {
    fn tick(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        self.follow_active_scene();
        self.machine.update_active(fixed_dt_seconds, input);
        self.follow_active_scene();
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        self.machine.render_active(canvas);
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.machine.shutdown_all();
        Ok(())
    }
}

pub(crate) struct DungeonEngineFactory {
    flow: Rc<SceneFlow>,
    outbox: Outbox,
    signals: ScreenSignals,
}

impl EngineFactory for DungeonEngineFactory {
    type Engine = DungeonEngine;
    type Deps = EngineDeps;

    fn construct(&mut self, deps: &EngineDeps) -> Result<DungeonEngine, EngineError> {
        let context = SceneContext {
            flow: Rc::clone(&self.flow),
            outbox: self.outbox.clone(),
            signals: self.signals.clone(),
            style: SceneStyle {
                pixel_art: deps.pixel_art,
            },
        };
        let scenes = build_roster(roster(Rc::clone(&deps.submitter.0)), &context)?;
        let mut engine = DungeonEngine {
            machine: SceneMachine::new(scenes),
            session: self.flow.session().clone(),
        };
        engine.follow_active_scene();
        Ok(engine)
    }
}

pub(crate) struct ScreenConfig {
    pub(crate) settings_path: PathBuf,
    pub(crate) player_override: Option<String>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) relay_addr: Option<String>,
    pub(crate) clock: Rc<dyn Clock>,
    pub(crate) metrics: MetricsHandle,
    pub(crate) viewport: Viewport,
}

pub(crate) struct GameScreen {
    flow: Rc<SceneFlow>,
    settings: Observable<Option<Settings>>,
    settings_loader: SettingsLoader,
    store: Arc<dyn RecordStore>,
    submitter: Option<Rc<SubmissionBridge>>,
    host: RenderLoopHost<DungeonEngineFactory>,
    overlay: OverlayLayer,
    timers: TimerQueue,
    relay: Option<RelayLink>,
    outbox: Outbox,
    signals: ScreenSignals,
    viewport: Observable<Viewport>,
}

impl GameScreen {
    pub(crate) fn new(config: ScreenConfig) -> Self {
        let session = SessionState::new();
        let multiplayer = MultiplayerState::new();
        let flow = Rc::new(SceneFlow::new(
            session.clone(),
            multiplayer.clone(),
            Rc::clone(&config.clock),
        ));
        let outbox = Outbox::default();
        let signals = ScreenSignals::default();
        let settings = Observable::new(None);
        let timers = TimerQueue::new();
        let viewport = Observable::new(config.viewport);

        let overlay = OverlayLayer::new(OverlaySources {
            session,
            multiplayer,
            settings: settings.clone(),
            submission: None,
            metrics: config.metrics,
            timers: timers.clone(),
            clock: config.clock,
            viewport: viewport.clone(),
        });
        let host = RenderLoopHost::new(DungeonEngineFactory {
            flow: Rc::clone(&flow),
            outbox: outbox.clone(),
            signals: signals.clone(),
        });

        let settings_loader = SettingsLoader::new(config.settings_path, config.player_override);
        settings_loader.request();
        let relay = config.relay_addr.map(RelayLink::connect);

        Self {
            flow,
            settings,
            settings_loader,
            store: config.store,
            submitter: None,
            host,
            overlay,
            timers,
            relay,
            outbox,
            signals,
            viewport,
        }
    }

    fn apply_loaded_settings(&mut self) {
        let Some(result) = self.settings_loader.poll() else {
            return;
        };
        match result {
            Ok(settings) => {
                info!(
                    pixel_art = settings.pixel_art_mode,
                    show_fps = settings.show_fps,
                    player = %settings.player_address,
                    "settings_loaded"
                );
                self.settings.set(Some(settings));
            }
            Err(error) => {
                warn!(
                    path = %self.settings_loader.path().display(),
                    error = %error,
                    "settings_load_failed"
                );
                if self.settings.with(Option::is_none) {
                    self.settings.set(Some(self.settings_loader.fallback()));
                }
            }
        }
    }

    /// Keeps one submission bridge per player address.
    fn sync_submitter(&mut self) {
        let Some(player) = self
            .settings
            .with(|settings| settings.as_ref().map(|settings| settings.player_address.clone()))
        else {
            return;
        };
        if self
            .submitter
            .as_ref()
            .is_some_and(|submitter| submitter.player() == player)
        {
            return;
        }
        info!(player = %player, "submission_bridge_created");
        let bridge = Rc::new(SubmissionBridge::new(player, Arc::clone(&self.store)));
        self.overlay.set_submission_status(Some(bridge.status()));
        self.submitter = Some(bridge);
    }

    fn engine_deps(&self) -> Option<EngineDeps> {
        let pixel_art = self
            .settings
            .with(|settings| settings.as_ref().map(|settings| settings.pixel_art_mode))?;
        let submitter = self.submitter.as_ref()?;
        Some(EngineDeps {
            pixel_art,
            submitter: SubmitterHandle(Rc::clone(submitter) as Rc<dyn ResultSubmitter>),
        })
    }

    fn sync_engine(&mut self) -> MountOutcome {
        let deps = self.engine_deps();
        self.host.sync(deps)
    }

    fn flush_outbox(&mut self) {
        for request in self.outbox.take() {
            match &mut self.relay {
                Some(relay) => relay.send(request),
                None => debug!(request = ?request, "relay_request_without_link"),
            }
        }
    }
}

impl ClientApp for GameScreen {
    fn turn(&mut self, now: Instant) {
        self.apply_loaded_settings();
        self.sync_submitter();
        if let Some(submitter) = &self.submitter {
            submitter.poll();
        }
        self.flush_outbox();
        if let Some(relay) = &mut self.relay {
            relay.poll(self.flow.multiplayer());
            if relay.is_closed() {
                info!("relay_link_released");
                self.relay = None;
            }
        }
        self.timers.run_due(now);
        self.sync_engine();
        self.overlay.reconcile();
    }

    fn tick(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        let (width, height) = input.window_size();
        if width > 0 && height > 0 {
            self.viewport.set(Viewport { width, height });
        }
        if input.pressed(InputAction::ReloadSettings) {
            self.settings_loader.request();
        }
        if let Some(engine) = self.host.engine_mut() {
            engine.tick(fixed_dt_seconds, input);
        }
        self.overlay.reconcile();
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        match self.host.engine_mut() {
            Some(engine) => engine.render(canvas),
            None => {
                canvas.fill(LOADING_BACKGROUND);
                let label = "Loading...";
                let x = (canvas.width() as i32 - text_width(label, 3)) / 2;
                let y = canvas.height() as i32 / 2;
                canvas.text(x, y, label, 3, LOADING_TEXT);
            }
        }
        self.overlay.render(canvas);
    }

    fn exit_requested(&self) -> bool {
        self.signals.exit_requested()
    }

    fn window_title(&self) -> Option<String> {
        let Some(engine) = self.host.engine() else {
            return Some("Dungeon Crawler | loading".to_string());
        };
        let scene = engine
            .running_scene()
            .map_or("none", ActiveScene::as_str);
        match engine.debug_title() {
            Some(detail) => Some(format!("Dungeon Crawler | {scene} | {detail}")),
            None => Some(format!("Dungeon Crawler | {scene}")),
        }
    }

    fn shutdown(&mut self) {
        let was_mounted = self.host.unmount();
        let counters = self.host.counters();
        info!(
            was_mounted,
            constructed = counters.constructed,
            destroyed = counters.destroyed,
            "game_screen_shutdown"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use dungeon_engine::{LifecycleCounters, ManualClock, MANUAL_CLOCK_EPOCH_MS};
    use run_ledger::{AppendOutcome, RunEntry};
    use tempfile::TempDir;

    use super::*;
    use crate::net::{apply_relay_message, RelayMessage};
    use crate::scenes::SceneAction;
    use crate::submission::{SubmissionStatus, SubmitError};

    #[derive(Default)]
    struct MemoryStore {
        stored: Mutex<Vec<RunEntry>>,
    }

    impl RecordStore for MemoryStore {
        fn store(&self, entry: &RunEntry) -> Result<AppendOutcome, SubmitError> {
            self.stored.lock().expect("store lock").push(entry.clone());
            Ok(AppendOutcome::Appended)
        }
    }

    struct Harness {
        _temp: TempDir,
        settings_path: PathBuf,
        clock: Rc<ManualClock>,
        store: Arc<MemoryStore>,
        screen: GameScreen,
    }

    impl Harness {
        fn new(settings_json: Option<&str>) -> Self {
            let temp = TempDir::new().expect("temp dir");
            let settings_path = temp.path().join("settings.json");
            if let Some(raw) = settings_json {
                fs::write(&settings_path, raw).expect("write settings");
            }
            let clock = Rc::new(ManualClock::new());
            let store = Arc::new(MemoryStore::default());
            let screen = GameScreen::new(ScreenConfig {
                settings_path: settings_path.clone(),
                player_override: None,
                store: Arc::clone(&store) as Arc<dyn RecordStore>,
                relay_addr: None,
                clock: Rc::clone(&clock) as Rc<dyn Clock>,
                metrics: MetricsHandle::default(),
                viewport: Viewport {
                    width: 320,
                    height: 200,
                },
            });
            Self {
                _temp: temp,
                settings_path,
                clock,
                store,
                screen,
            }
        }

        fn turn(&mut self) {
            self.screen.turn(self.clock.now());
        }

        fn tick(&mut self, input: InputSnapshot) {
            self.screen.tick(1.0 / 60.0, &input);
        }

        fn turn_until(&mut self, mut done: impl FnMut(&GameScreen) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            self.turn();
            while !done(&self.screen) {
                assert!(Instant::now() < deadline, "condition never held");
                thread::sleep(Duration::from_millis(2));
                self.turn();
            }
        }

        fn mounted(&mut self) {
            self.turn_until(|screen| screen.host.is_mounted());
        }

        fn session(&self) -> SessionState {
            self.screen.flow.session().clone()
        }

        fn running_scene(&mut self) -> Option<ActiveScene> {
            self.screen
                .host
                .engine_mut()
                .and_then(|engine| engine.running_scene())
        }

        fn counters(&self) -> LifecycleCounters {
            self.screen.host.counters()
        }
    }

    fn pressed(action: InputAction) -> InputSnapshot {
        InputSnapshot::empty().with_pressed(action)
    }

    fn submission_settled(screen: &GameScreen) -> bool {
        screen
            .submitter
            .as_ref()
            .is_some_and(|bridge| matches!(bridge.status().get(), SubmissionStatus::Submitted(_)))
    }

    #[test]
    fn engine_waits_for_settings_then_constructs_once() {
        let mut harness = Harness::new(None);
        assert!(!harness.screen.host.is_mounted());

        harness.mounted();
        for _ in 0..10 {
            harness.turn();
            harness.tick(InputSnapshot::empty());
        }
        assert_eq!(
            harness.counters(),
            LifecycleCounters {
                constructed: 1,
                destroyed: 0,
            }
        );
        assert_eq!(harness.running_scene(), Some(ActiveScene::Home));
    }

    #[test]
    fn confirm_on_home_starts_a_run_with_one_round() {
        let mut harness = Harness::new(None);
        harness.mounted();

        harness.tick(pressed(InputAction::Confirm));

        let session = harness.session();
        assert_eq!(session.active_scene.get(), ActiveScene::Game);
        assert_eq!(harness.running_scene(), Some(ActiveScene::Game));
        assert_eq!(session.score.get(), 0);
        assert_eq!(session.level.get(), 1);
        let times = session.times.get();
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].round, 1);
        assert_eq!(times[0].start, harness.clock.now());
    }

    #[test]
    fn death_submits_the_frozen_run() {
        let mut harness = Harness::new(Some(r#"{ "player_address": "0xabc" }"#));
        harness.mounted();
        harness.tick(pressed(InputAction::Confirm));
        let session = harness.session();
        harness.clock.advance(Duration::from_millis(3_200));
        session.score.set(50);

        session.player_health.set(0);
        harness.screen.flow.dispatch(SceneAction::PlayerDied);
        harness.tick(InputSnapshot::empty());
        session.score.set(10_000);
        assert_eq!(harness.running_scene(), Some(ActiveScene::GameOver));

        harness.turn_until(submission_settled);
        let stored = harness.store.stored.lock().expect("store lock").clone();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].player, "0xabc");
        assert_eq!(stored[0].recorded_at_ms, MANUAL_CLOCK_EPOCH_MS + 3_200);
        assert_eq!(stored[0].score, 50);
        assert_eq!(stored[0].level, 1);
        assert_eq!(stored[0].duration_ms, 3_200);
        assert_eq!(stored[0].rounds, 1);
    }

    #[test]
    fn dependency_change_rebuilds_and_shutdown_destroys() {
        let mut harness = Harness::new(Some(r#"{ "pixel_art_mode": true }"#));
        harness.mounted();
        harness.tick(pressed(InputAction::Confirm));

        fs::write(&harness.settings_path, r#"{ "pixel_art_mode": false }"#)
            .expect("rewrite settings");
        harness.tick(pressed(InputAction::ReloadSettings));
        harness.turn_until(|screen| screen.host.counters().constructed == 2);
        assert_eq!(harness.counters().destroyed, 1);
        assert_eq!(harness.running_scene(), Some(ActiveScene::Game));

        harness.screen.shutdown();
        assert_eq!(
            harness.counters(),
            LifecycleCounters {
                constructed: 2,
                destroyed: 2,
            }
        );
        assert!(!harness.screen.host.is_mounted());
    }

    #[test]
    fn rebuild_on_game_over_keeps_a_single_record() {
        let mut harness = Harness::new(Some(r#"{ "pixel_art_mode": true }"#));
        harness.mounted();
        harness.tick(pressed(InputAction::Confirm));
        harness.clock.advance(Duration::from_millis(1_500));
        harness.screen.flow.dispatch(SceneAction::PlayerDied);
        harness.tick(InputSnapshot::empty());
        harness.turn_until(submission_settled);

        fs::write(&harness.settings_path, r#"{ "pixel_art_mode": false }"#)
            .expect("rewrite settings");
        harness.clock.advance(Duration::from_secs(2));
        harness.tick(pressed(InputAction::ReloadSettings));
        harness.turn_until(|screen| screen.host.counters().constructed == 2);
        assert_eq!(harness.running_scene(), Some(ActiveScene::GameOver));
        for _ in 0..5 {
            harness.turn();
            harness.tick(InputSnapshot::empty());
        }

        let stored = harness.store.stored.lock().expect("store lock").clone();
        assert_eq!(stored.len(), 1);
        let status = harness
            .screen
            .submitter
            .as_ref()
            .map(|bridge| bridge.status().get());
        assert_eq!(status, Some(SubmissionStatus::Submitted(stored[0].id.clone())));
    }

    #[test]
    fn relay_left_in_dungeon_returns_engine_to_lobby() {
        let mut harness = Harness::new(None);
        harness.mounted();
        let multiplayer = harness.screen.flow.multiplayer().clone();
        multiplayer.connect(None);
        harness.tick(pressed(InputAction::Multiplayer));
        multiplayer.join_room("crypt-7".to_string());
        harness.tick(InputSnapshot::empty());
        assert_eq!(
            harness.running_scene(),
            Some(ActiveScene::MultiplayerDungeon)
        );

        apply_relay_message(&multiplayer, RelayMessage::Left);
        for _ in 0..3 {
            harness.turn();
            harness.tick(InputSnapshot::empty());
        }

        assert_eq!(
            harness.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
        assert_eq!(harness.running_scene(), Some(ActiveScene::MultiplayerLobby));
        assert_eq!(multiplayer.current_room(), None);
    }

    #[test]
    fn disconnect_returns_engine_to_home() {
        let mut harness = Harness::new(None);
        harness.mounted();
        let multiplayer = harness.screen.flow.multiplayer().clone();
        multiplayer.connect(None);
        harness.tick(pressed(InputAction::Multiplayer));
        assert_eq!(harness.running_scene(), Some(ActiveScene::MultiplayerLobby));

        multiplayer.join_room("crypt-7".to_string());
        harness.tick(InputSnapshot::empty());
        assert_eq!(
            harness.running_scene(),
            Some(ActiveScene::MultiplayerDungeon)
        );

        multiplayer.disconnect();
        assert_eq!(harness.session().active_scene.get(), ActiveScene::Home);
        harness.tick(InputSnapshot::empty());
        assert_eq!(harness.running_scene(), Some(ActiveScene::Home));
    }

    #[test]
    fn back_on_home_requests_exit() {
        let mut harness = Harness::new(None);
        harness.mounted();
        assert!(!harness.screen.exit_requested());
        harness.tick(pressed(InputAction::Back));
        assert!(harness.screen.exit_requested());
    }

    #[test]
    fn join_request_reaches_the_outbox_once() {
        let mut harness = Harness::new(None);
        harness.mounted();
        harness.screen.flow.multiplayer().connect(None);
        harness.tick(pressed(InputAction::Multiplayer));
        harness.tick(pressed(InputAction::Join));
        harness.tick(pressed(InputAction::Join));
        assert_eq!(harness.screen.outbox.take(), vec![crate::net::Outbound::Join]);
    }

    #[test]
    fn overlay_follows_the_scene() {
        use crate::overlay::WidgetKind;

        let mut harness = Harness::new(None);
        harness.mounted();
        assert_eq!(
            harness.screen.overlay.mounted_kinds(),
            vec![WidgetKind::BackButton]
        );
        harness.tick(pressed(InputAction::Confirm));
        assert!(harness
            .screen
            .overlay
            .mounted_kinds()
            .contains(&WidgetKind::RoundTimer));
        assert!(!harness
            .screen
            .overlay
            .mounted_kinds()
            .contains(&WidgetKind::BackButton));
    }
}
