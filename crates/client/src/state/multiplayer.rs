use dungeon_engine::{EventHub, Observable};
use tracing::{debug, info};

/// Connection and room live in one value so a disconnect clears both in a
/// single observable write. A room can only exist while connected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Connection {
    #[default]
    Disconnected,
    Connected {
        room: Option<String>,
    },
}

impl Connection {
    pub(crate) fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected { .. })
    }

    pub(crate) fn current_room(&self) -> Option<&str> {
        match self {
            Connection::Connected { room } => room.as_deref(),
            Connection::Disconnected => None,
        }
    }

    /// A room is joined and the link is up.
    pub(crate) fn in_room(&self) -> bool {
        self.current_room().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionEvent {
    Connected,
    RoomJoined(String),
    RoomLeft,
    Disconnected,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MultiplayerState {
    pub(crate) connection: Observable<Connection>,
    pub(crate) roster: Observable<Vec<String>>,
    events: EventHub<ConnectionEvent>,
}

impl MultiplayerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> &EventHub<ConnectionEvent> {
        &self.events
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection.with(Connection::is_connected)
    }

    pub(crate) fn current_room(&self) -> Option<String> {
        self.connection
            .with(|connection| connection.current_room().map(str::to_string))
    }

    /// Marks the link as up with `room`. Replacing a joined room with `None`
    /// counts as leaving it.
    pub(crate) fn connect(&self, room: Option<String>) {
        let was_connected = self.is_connected();
        let had_room = self.connection.with(Connection::in_room);
        let changed = self.connection.set(Connection::Connected { room: room.clone() });
        if !was_connected {
            info!("multiplayer_connected");
            self.events.emit(&ConnectionEvent::Connected);
        }
        if !changed {
            return;
        }
        match room {
            Some(room) => self.events.emit(&ConnectionEvent::RoomJoined(room)),
            None if had_room => {
                self.roster.set(Vec::new());
                info!("room_left");
                self.events.emit(&ConnectionEvent::RoomLeft);
            }
            None => {}
        }
    }

    /// Ignored while disconnected.
    pub(crate) fn join_room(&self, room: String) -> bool {
        if !self.is_connected() {
            debug!(room = %room, "room_join_ignored_while_disconnected");
            return false;
        }
        if !self.connection.set(Connection::Connected {
            room: Some(room.clone()),
        }) {
            return false;
        }
        info!(room = %room, "room_joined");
        self.events.emit(&ConnectionEvent::RoomJoined(room));
        true
    }

    pub(crate) fn leave_room(&self) -> bool {
        if !self.connection.with(Connection::in_room) {
            return false;
        }
        self.connection.set(Connection::Connected { room: None });
        self.roster.set(Vec::new());
        info!("room_left");
        self.events.emit(&ConnectionEvent::RoomLeft);
        true
    }

    pub(crate) fn disconnect(&self) -> bool {
        if !self.connection.set(Connection::Disconnected) {
            return false;
        }
        self.roster.set(Vec::new());
        info!("multiplayer_disconnected");
        self.events.emit(&ConnectionEvent::Disconnected);
        true
    }

    /// Ignored unless a room is joined.
    pub(crate) fn update_roster(&self, players: Vec<String>) -> bool {
        if !self.connection.with(Connection::in_room) {
            return false;
        }
        self.roster.set(players)
    }
}
