mod multiplayer;
mod session;

pub(crate) use multiplayer::{Connection, ConnectionEvent, MultiplayerState};
pub(crate) use session::{
    ActiveScene, RoundTime, RunSnapshot, SessionState, FULL_HEALTH, STARTING_LIVES,
};
