use dungeon_engine::{Canvas, InputAction, InputSnapshot, Scene};
use tracing::info;

use super::dungeon::{draw_arena, intent_from_input};
use super::{SceneAction, SceneContext};
use crate::net::Outbound;
use crate::rules::Arena;

/// Shared room without combat. The relay owns anything authoritative.
pub(crate) struct MultiplayerDungeonScene {
    context: SceneContext,
    arena: Arena,
}

impl MultiplayerDungeonScene {
    pub(crate) fn new(context: SceneContext) -> Self {
        Self {
            context,
            arena: Arena::empty(),
        }
    }
}

impl Scene for MultiplayerDungeonScene {
    fn load(&mut self) {
        self.arena = Arena::empty();
        info!(
            room = ?self.context.flow.multiplayer().current_room(),
            "multiplayer_dungeon_loaded"
        );
    }

    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        if input.pressed(InputAction::Leave) {
            self.context.outbox.push(Outbound::Leave);
            self.context.flow.dispatch(SceneAction::LeaveRoom);
            return;
        }
        let mut intent = intent_from_input(input);
        intent.attack = false;
        self.arena.step(fixed_dt_seconds, intent);
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        draw_arena(canvas, &self.arena, self.context.style);
    }

    fn unload(&mut self) {}

    fn debug_title(&self) -> Option<String> {
        self.context
            .flow
            .multiplayer()
            .current_room()
            .map(|room| format!("Room {room}"))
    }
}
