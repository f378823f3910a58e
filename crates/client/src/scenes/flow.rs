//! Scene transitions for the whole client.
//!
//! Scenes never set `active_scene` themselves. They hand a [`SceneAction`] to
//! the flow, which checks it against the current scene and applies the run
//! bookkeeping that goes with the move. Anything not listed in
//! [`SceneFlow::dispatch`] is a no-op.
//!
//! Connection events move the multiplayer scenes directly: a disconnect sends
//! them home, a joined room takes the lobby into the dungeon and a lost room
//! takes the dungeon back to the lobby.

use std::rc::Rc;

use dungeon_engine::{Clock, Observable, Subscription};
use tracing::{debug, info};

use crate::state::{ActiveScene, ConnectionEvent, MultiplayerState, RunSnapshot, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SceneAction {
    SinglePlayer,
    MultiplayerSelect,
    PlayerDied,
    ExitRun,
    LevelCleared,
    Restart,
    ReturnHome,
    RoomJoined,
    LeaveRoom,
    LeaveLobby,
    ConnectionLost,
}

pub(crate) struct SceneFlow {
    session: SessionState,
    multiplayer: MultiplayerState,
    clock: Rc<dyn Clock>,
    finished_run: Observable<Option<RunSnapshot>>,
    _connection_watch: Subscription,
}

impl SceneFlow {
    pub(crate) fn new(
        session: SessionState,
        multiplayer: MultiplayerState,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let watched = session.clone();
        let connection_watch = multiplayer.events().subscribe(move |event| match event {
            ConnectionEvent::Disconnected => {
                force_home(&watched);
            }
            ConnectionEvent::RoomJoined(_) => {
                follow_room(
                    &watched,
                    ActiveScene::MultiplayerLobby,
                    ActiveScene::MultiplayerDungeon,
                );
            }
            ConnectionEvent::RoomLeft => {
                follow_room(
                    &watched,
                    ActiveScene::MultiplayerDungeon,
                    ActiveScene::MultiplayerLobby,
                );
            }
            ConnectionEvent::Connected => {}
        });
        Self {
            session,
            multiplayer,
            clock,
            finished_run: Observable::new(None),
            _connection_watch: connection_watch,
        }
    }

    pub(crate) fn session(&self) -> &SessionState {
        &self.session
    }

    pub(crate) fn multiplayer(&self) -> &MultiplayerState {
        &self.multiplayer
    }

    pub(crate) fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// The run that ended most recently, as it was at the moment it ended.
    pub(crate) fn finished_run(&self) -> &Observable<Option<RunSnapshot>> {
        &self.finished_run
    }

    /// Applies `action` if it is legal in the current scene. Returns whether
    /// anything changed.
    pub(crate) fn dispatch(&self, action: SceneAction) -> bool {
        let scene = self.session.active_scene.get();
        let applied = match (scene, action) {
            (ActiveScene::Home, SceneAction::SinglePlayer)
            | (ActiveScene::GameOver, SceneAction::Restart) => {
                self.start_new_run();
                true
            }
            (ActiveScene::Home, SceneAction::MultiplayerSelect) => {
                if self.multiplayer.is_connected() {
                    self.enter(ActiveScene::MultiplayerLobby)
                } else {
                    debug!("multiplayer_select_before_connect");
                    false
                }
            }
            (ActiveScene::Game, SceneAction::PlayerDied)
            | (ActiveScene::Game, SceneAction::ExitRun) => {
                self.finish_run();
                true
            }
            (ActiveScene::Game, SceneAction::LevelCleared) => {
                self.session.level.update(|level| *level = level.saturating_add(1));
                self.session.record_round_start(self.clock.now());
                info!(level = self.session.level.get(), "level_entered");
                true
            }
            (ActiveScene::GameOver, SceneAction::ReturnHome)
            | (ActiveScene::MultiplayerLobby, SceneAction::LeaveLobby) => {
                self.enter(ActiveScene::Home)
            }
            (ActiveScene::MultiplayerLobby, SceneAction::RoomJoined) => {
                if self.multiplayer.current_room().is_some() {
                    self.enter(ActiveScene::MultiplayerDungeon)
                } else {
                    false
                }
            }
            (ActiveScene::MultiplayerDungeon, SceneAction::LeaveRoom) => {
                // The RoomLeft event already moves the scene when a room was set.
                self.multiplayer.leave_room() || self.enter(ActiveScene::MultiplayerLobby)
            }
            (ActiveScene::MultiplayerLobby, SceneAction::ConnectionLost)
            | (ActiveScene::MultiplayerDungeon, SceneAction::ConnectionLost) => {
                force_home(&self.session)
            }
            _ => false,
        };
        if !applied {
            debug!(scene = %scene, action = ?action, "scene_action_ignored");
        }
        applied
    }

    fn start_new_run(&self) {
        self.session.reset_for_new_run();
        self.finished_run.set(None);
        self.session.active_scene.set(ActiveScene::Game);
        info!("run_started");
    }

    fn finish_run(&self) {
        let snapshot = self
            .session
            .snapshot(self.clock.now(), self.clock.unix_millis());
        info!(
            score = snapshot.score,
            level = snapshot.level,
            rounds = snapshot.rounds,
            duration_ms = snapshot.duration.as_millis() as u64,
            "run_finished"
        );
        self.finished_run.set(Some(snapshot));
        self.session.active_scene.set(ActiveScene::GameOver);
    }

    fn enter(&self, scene: ActiveScene) -> bool {
        self.session.active_scene.set(scene)
    }
}

fn force_home(session: &SessionState) -> bool {
    let scene = session.active_scene.get();
    if !scene.is_multiplayer() {
        return false;
    }
    info!(from = %scene, "connection_lost_returning_home");
    session.active_scene.set(ActiveScene::Home)
}

fn follow_room(session: &SessionState, from: ActiveScene, to: ActiveScene) -> bool {
    if session.active_scene.get() != from {
        return false;
    }
    info!(from = %from, to = %to, "room_change_moved_scene");
    session.active_scene.set(to)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dungeon_engine::{ManualClock, TrackingScope, MANUAL_CLOCK_EPOCH_MS};

    use super::*;
    use crate::net::{apply_relay_message, RelayMessage};
    use crate::state::{RoundTime, FULL_HEALTH, STARTING_LIVES};

    struct Fixture {
        clock: Rc<ManualClock>,
        flow: SceneFlow,
    }

    fn fixture() -> Fixture {
        let clock = Rc::new(ManualClock::new());
        let flow = SceneFlow::new(
            SessionState::new(),
            MultiplayerState::new(),
            Rc::clone(&clock) as Rc<dyn Clock>,
        );
        Fixture { clock, flow }
    }

    fn assert_fresh_run(session: &SessionState) {
        assert_eq!(session.active_scene.get(), ActiveScene::Game);
        assert_eq!(session.score.get(), 0);
        assert_eq!(session.level.get(), 1);
        assert_eq!(session.player_health.get(), FULL_HEALTH);
        assert_eq!(session.total_lives.get(), STARTING_LIVES);
        assert!(session.times.get().is_empty());
    }

    #[test]
    fn single_player_from_home_starts_a_fresh_run() {
        let Fixture { flow, .. } = fixture();
        assert!(flow.dispatch(SceneAction::SinglePlayer));
        assert_fresh_run(flow.session());
    }

    #[test]
    fn death_freezes_the_run_at_that_moment() {
        let Fixture { clock, flow } = fixture();
        let session = flow.session().clone();
        flow.dispatch(SceneAction::SinglePlayer);
        session.record_round_start(clock.now());
        clock.advance(Duration::from_secs(4));
        flow.dispatch(SceneAction::LevelCleared);
        session.score.set(70);
        clock.advance(Duration::from_millis(2_500));

        session.player_health.set(0);
        assert!(flow.dispatch(SceneAction::PlayerDied));

        session.score.set(999);
        clock.advance(Duration::from_secs(30));

        assert_eq!(session.active_scene.get(), ActiveScene::GameOver);
        assert_eq!(
            flow.finished_run().get(),
            Some(RunSnapshot {
                score: 70,
                level: 2,
                rounds: 2,
                duration: Duration::from_millis(6_500),
                ended_at_ms: MANUAL_CLOCK_EPOCH_MS + 6_500,
            })
        );
    }

    #[test]
    fn restart_discards_previous_times() {
        let Fixture { clock, flow } = fixture();
        let session = flow.session().clone();
        flow.dispatch(SceneAction::SinglePlayer);
        session.record_round_start(clock.now());
        flow.dispatch(SceneAction::LevelCleared);
        flow.dispatch(SceneAction::LevelCleared);
        session.score.set(40);
        session.total_lives.set(1);
        flow.dispatch(SceneAction::PlayerDied);

        assert!(flow.dispatch(SceneAction::Restart));
        assert_fresh_run(&session);
        assert_eq!(flow.finished_run().get(), None);
    }

    #[test]
    fn multiplayer_select_waits_for_connection() {
        let Fixture { flow, .. } = fixture();
        assert!(!flow.dispatch(SceneAction::MultiplayerSelect));
        assert_eq!(flow.session().active_scene.get(), ActiveScene::Home);

        flow.multiplayer().connect(None);
        assert!(flow.dispatch(SceneAction::MultiplayerSelect));
        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
    }

    #[test]
    fn disconnect_in_dungeon_forces_home_in_the_same_turn() {
        let Fixture { flow, .. } = fixture();
        enter_dungeon(&flow);

        let mut scope = TrackingScope::new();
        flow.session().active_scene.track(&mut scope);
        flow.multiplayer().disconnect();

        assert_eq!(flow.session().active_scene.get(), ActiveScene::Home);
        assert!(scope.needs_render());
    }

    #[test]
    fn disconnect_outside_multiplayer_leaves_scene_alone() {
        let Fixture { flow, .. } = fixture();
        flow.multiplayer().connect(None);
        flow.dispatch(SceneAction::SinglePlayer);
        flow.multiplayer().disconnect();
        assert_eq!(flow.session().active_scene.get(), ActiveScene::Game);
    }

    #[test]
    fn leaving_a_room_returns_to_lobby_and_clears_it() {
        let Fixture { flow, .. } = fixture();
        flow.multiplayer().connect(Some("crypt-7".to_string()));
        flow.dispatch(SceneAction::MultiplayerSelect);
        flow.dispatch(SceneAction::RoomJoined);

        assert!(flow.dispatch(SceneAction::LeaveRoom));
        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
        assert_eq!(flow.multiplayer().current_room(), None);
        assert!(flow.multiplayer().is_connected());
    }

    fn enter_dungeon(flow: &SceneFlow) {
        flow.multiplayer().connect(None);
        flow.dispatch(SceneAction::MultiplayerSelect);
        flow.multiplayer().join_room("crypt-7".to_string());
        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerDungeon
        );
    }

    #[test]
    fn joined_room_event_moves_lobby_into_dungeon() {
        let Fixture { flow, .. } = fixture();
        flow.multiplayer().connect(None);
        assert!(flow.multiplayer().join_room("early".to_string()));
        assert_eq!(flow.session().active_scene.get(), ActiveScene::Home);
        flow.multiplayer().leave_room();
        assert_eq!(flow.session().active_scene.get(), ActiveScene::Home);

        enter_dungeon(&flow);
    }

    #[test]
    fn relay_left_in_dungeon_returns_to_lobby() {
        let Fixture { flow, .. } = fixture();
        enter_dungeon(&flow);

        apply_relay_message(flow.multiplayer(), RelayMessage::Left);

        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
        assert_eq!(flow.multiplayer().current_room(), None);
        assert!(flow.multiplayer().is_connected());
    }

    #[test]
    fn reconnect_without_room_in_dungeon_returns_to_lobby() {
        let Fixture { flow, .. } = fixture();
        enter_dungeon(&flow);

        flow.multiplayer().connect(None);

        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
    }

    #[test]
    fn room_joined_without_a_room_is_ignored() {
        let Fixture { flow, .. } = fixture();
        flow.multiplayer().connect(None);
        flow.dispatch(SceneAction::MultiplayerSelect);
        assert!(!flow.dispatch(SceneAction::RoomJoined));
        assert_eq!(
            flow.session().active_scene.get(),
            ActiveScene::MultiplayerLobby
        );
    }

    #[test]
    fn illegal_actions_are_no_ops() {
        let Fixture { flow, .. } = fixture();
        let session = flow.session().clone();
        for action in [
            SceneAction::PlayerDied,
            SceneAction::ExitRun,
            SceneAction::LevelCleared,
            SceneAction::Restart,
            SceneAction::RoomJoined,
            SceneAction::LeaveRoom,
            SceneAction::ConnectionLost,
        ] {
            assert!(!flow.dispatch(action), "{action:?} should be ignored at home");
        }
        assert_eq!(session.active_scene.get(), ActiveScene::Home);
        assert_eq!(session.level.get(), 1);
        assert_eq!(flow.finished_run().get(), None);

        flow.dispatch(SceneAction::SinglePlayer);
        assert!(!flow.dispatch(SceneAction::SinglePlayer));
        assert!(!flow.dispatch(SceneAction::MultiplayerSelect));
        assert_eq!(session.active_scene.get(), ActiveScene::Game);
    }

    #[test]
    fn level_cleared_records_each_round_once() {
        let Fixture { clock, flow } = fixture();
        let session = flow.session().clone();
        flow.dispatch(SceneAction::SinglePlayer);
        let start = clock.now();
        session.record_round_start(start);
        clock.advance(Duration::from_secs(3));
        flow.dispatch(SceneAction::LevelCleared);
        session.record_round_start(clock.now());

        assert_eq!(
            session.times.get(),
            vec![
                RoundTime { round: 1, start },
                RoundTime {
                    round: 2,
                    start: start + Duration::from_secs(3),
                },
            ]
        );
    }

    #[test]
    fn game_over_can_return_home() {
        let Fixture { flow, .. } = fixture();
        flow.dispatch(SceneAction::SinglePlayer);
        flow.dispatch(SceneAction::ExitRun);
        assert!(flow.dispatch(SceneAction::ReturnHome));
        assert_eq!(flow.session().active_scene.get(), ActiveScene::Home);
    }
}
