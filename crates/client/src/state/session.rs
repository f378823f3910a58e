use std::fmt;
use std::time::{Duration, Instant};

use dungeon_engine::Observable;

pub(crate) const FULL_HEALTH: u32 = 100;
pub(crate) const STARTING_LIVES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) enum ActiveScene {
    #[default]
    Home,
    Game,
    GameOver,
    MultiplayerLobby,
    MultiplayerDungeon,
}

impl ActiveScene {
    pub(crate) const ALL: [ActiveScene; 5] = [
        ActiveScene::Home,
        ActiveScene::Game,
        ActiveScene::GameOver,
        ActiveScene::MultiplayerLobby,
        ActiveScene::MultiplayerDungeon,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ActiveScene::Home => "home",
            ActiveScene::Game => "game",
            ActiveScene::GameOver => "gameOver",
            ActiveScene::MultiplayerLobby => "multiplayerLobby",
            ActiveScene::MultiplayerDungeon => "multiplayerDungeon",
        }
    }

    pub(crate) fn is_multiplayer(self) -> bool {
        matches!(
            self,
            ActiveScene::MultiplayerLobby | ActiveScene::MultiplayerDungeon
        )
    }
}

impl fmt::Display for ActiveScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RoundTime {
    pub(crate) round: u32,
    pub(crate) start: Instant,
}

/// Run values frozen at the moment a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSnapshot {
    pub(crate) score: u32,
    pub(crate) level: u32,
    pub(crate) rounds: u32,
    pub(crate) duration: Duration,
    /// Wall-clock end of the run. Together with the fields above it
    /// identifies the run, so a repeated submission maps to the same record.
    pub(crate) ended_at_ms: u64,
}

/// Single-player progress shared by the scenes, the flow and the overlay.
/// Clones share the same fields.
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub(crate) active_scene: Observable<ActiveScene>,
    pub(crate) score: Observable<u32>,
    pub(crate) player_health: Observable<u32>,
    pub(crate) total_lives: Observable<u32>,
    pub(crate) level: Observable<u32>,
    pub(crate) times: Observable<Vec<RoundTime>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active_scene: Observable::new(ActiveScene::Home),
            score: Observable::new(0),
            player_health: Observable::new(FULL_HEALTH),
            total_lives: Observable::new(STARTING_LIVES),
            level: Observable::new(1),
            times: Observable::new(Vec::new()),
        }
    }
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fresh run values. `active_scene` is left to the caller.
    pub(crate) fn reset_for_new_run(&self) {
        self.score.set(0);
        self.level.set(1);
        self.total_lives.set(STARTING_LIVES);
        self.player_health.set(FULL_HEALTH);
        self.times.set(Vec::new());
    }

    /// Appends `{round: level, start: now}` unless the current level already
    /// has an entry. Returns whether an entry was added.
    pub(crate) fn record_round_start(&self, now: Instant) -> bool {
        let round = self.level.get();
        self.times.update(|times| {
            if !times.iter().any(|entry| entry.round == round) {
                times.push(RoundTime { round, start: now });
            }
        })
    }

    pub(crate) fn current_round(&self) -> Option<RoundTime> {
        let level = self.level.get();
        self.times
            .with(|times| times.iter().find(|entry| entry.round == level).copied())
    }

    pub(crate) fn snapshot(&self, now: Instant, ended_at_ms: u64) -> RunSnapshot {
        let (rounds, first_start) = self
            .times
            .with(|times| (times.len() as u32, times.first().map(|entry| entry.start)));
        RunSnapshot {
            score: self.score.get(),
            level: self.level.get(),
            rounds,
            duration: first_start
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default(),
            ended_at_ms,
        }
    }
}
