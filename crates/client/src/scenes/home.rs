use dungeon_engine::{Canvas, InputAction, InputSnapshot, Scene};
use tracing::{debug, info};

use super::{draw_centered, draw_screen_title, SceneAction, SceneContext, BODY, MUTED};
use crate::overlay::back_button_visible;

pub(crate) struct HomeScene {
    context: SceneContext,
}

impl HomeScene {
    pub(crate) fn new(context: SceneContext) -> Self {
        Self { context }
    }
}

impl Scene for HomeScene {
    fn load(&mut self) {
        debug!("home_scene_loaded");
    }

    fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot) {
        let flow = &self.context.flow;
        if input.pressed(InputAction::Confirm) {
            flow.dispatch(SceneAction::SinglePlayer);
        } else if input.pressed(InputAction::Multiplayer) {
            flow.dispatch(SceneAction::MultiplayerSelect);
        } else if input.pressed(InputAction::Back) {
            let scene = flow.session().active_scene.get();
            let visible = flow
                .multiplayer()
                .connection
                .with(|connection| back_button_visible(scene, connection));
            if visible {
                info!("navigate_back_requested");
                self.context.signals.request_exit();
            }
        }
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        draw_screen_title(canvas, "DUNGEON CRAWLER");
        let base = canvas.height() as i32 / 2;
        draw_centered(canvas, base, "ENTER  single player", 2, BODY);
        let multiplayer = if self.context.flow.multiplayer().is_connected() {
            "M  multiplayer"
        } else {
            "M  multiplayer (offline)"
        };
        draw_centered(canvas, base + 24, multiplayer, 2, BODY);
        draw_centered(canvas, base + 64, "arrows/WASD move  ENTER attack", 1, MUTED);
    }

    fn unload(&mut self) {}

    fn debug_title(&self) -> Option<String> {
        Some("Home".to_string())
    }
}
