use dungeon_engine::{Canvas, InputAction, InputSnapshot, Scene};
use tracing::{debug, info};

use super::{draw_centered, draw_screen_title, SceneAction, SceneContext, BODY, MUTED};
use crate::net::Outbound;

pub(crate) struct LobbyScene {
    context: SceneContext,
    join_requested: bool,
}

impl LobbyScene {
    pub(crate) fn new(context: SceneContext) -> Self {
        Self {
            context,
            join_requested: false,
        }
    }
}

impl Scene for LobbyScene {
    fn load(&mut self) {
        self.join_requested = false;
        debug!("lobby_scene_loaded");
    }

    fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot) {
        let flow = &self.context.flow;
        if input.pressed(InputAction::Cancel) || input.pressed(InputAction::Back) {
            flow.dispatch(SceneAction::LeaveLobby);
            return;
        }
        if input.pressed(InputAction::Join) && !self.join_requested {
            info!("room_join_requested");
            self.context.outbox.push(Outbound::Join);
            self.join_requested = true;
        }
        // Rooms joined while the lobby is open move the scene through the
        // flow's connection events. This covers a room set before it opened.
        if flow.multiplayer().current_room().is_some() {
            flow.dispatch(SceneAction::RoomJoined);
        }
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        draw_screen_title(canvas, "LOBBY");
        let base = canvas.height() as i32 / 2;
        let status = if self.join_requested {
            "waiting for a room..."
        } else {
            "J  join a room"
        };
        draw_centered(canvas, base, status, 2, BODY);
        draw_centered(canvas, base + 40, "ESC  back", 1, MUTED);
    }

    fn unload(&mut self) {}

    fn debug_title(&self) -> Option<String> {
        Some("Lobby".to_string())
    }
}
