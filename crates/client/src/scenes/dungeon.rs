use dungeon_engine::{Canvas, InputAction, InputSnapshot, Rgba, Scene};
use tracing::{debug, info};

use super::{SceneAction, SceneContext, SceneStyle, BACKGROUND};
use crate::rules::{
    apply_hit, award_defeat, Arena, HitOutcome, Intent, RuleEvent, Vec2, ARENA_HEIGHT,
    ARENA_WIDTH, CONTACT_DAMAGE,
};

const HUD_MARGIN_PX: i32 = 56;
const FLOOR: Rgba = [44, 40, 56, 255];
const FLOOR_ALT: Rgba = [50, 46, 64, 255];
const WALL: Rgba = [92, 84, 110, 255];
const PLAYER: Rgba = [96, 196, 255, 255];
const ENEMY: Rgba = [226, 84, 84, 255];
const STAIRS_OPEN: Rgba = [236, 208, 120, 255];
const STAIRS_LOCKED: Rgba = [110, 100, 70, 255];

pub(crate) struct DungeonScene {
    context: SceneContext,
    arena: Arena,
}

impl DungeonScene {
    pub(crate) fn new(context: SceneContext) -> Self {
        Self {
            context,
            arena: Arena::for_level(1),
        }
    }

    fn handle_events(&mut self, events: Vec<RuleEvent>) {
        let flow = &self.context.flow;
        let session = flow.session();
        for event in events {
            match event {
                RuleEvent::EnemyDefeated => award_defeat(session),
                RuleEvent::PlayerHit => match apply_hit(session, CONTACT_DAMAGE) {
                    HitOutcome::Wounded => {}
                    HitOutcome::LifeLost => {
                        info!(lives = session.total_lives.get(), "life_lost");
                    }
                    HitOutcome::Died => {
                        flow.dispatch(SceneAction::PlayerDied);
                        return;
                    }
                },
                RuleEvent::ReachedStairs => {
                    if flow.dispatch(SceneAction::LevelCleared) {
                        self.arena = Arena::for_level(session.level.get());
                    }
                    return;
                }
            }
        }
    }
}

impl Scene for DungeonScene {
    fn load(&mut self) {
        let flow = &self.context.flow;
        let level = flow.session().level.get();
        self.arena = Arena::for_level(level);
        flow.session().record_round_start(flow.clock().now());
        debug!(level, "dungeon_scene_loaded");
    }

    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        if input.pressed(InputAction::Cancel) {
            self.context.flow.dispatch(SceneAction::ExitRun);
            return;
        }
        let events = self.arena.step(fixed_dt_seconds, intent_from_input(input));
        self.handle_events(events);
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        draw_arena(canvas, &self.arena, self.context.style);
    }

    fn unload(&mut self) {}

    fn debug_title(&self) -> Option<String> {
        Some(format!(
            "Level {} | enemies {}",
            self.arena.level,
            self.arena.living_enemies()
        ))
    }
}

pub(crate) fn intent_from_input(input: &InputSnapshot) -> Intent {
    let axis = |negative, positive| {
        let mut value = 0.0;
        if input.is_down(negative) {
            value -= 1.0;
        }
        if input.is_down(positive) {
            value += 1.0;
        }
        value
    };
    let mut move_x: f32 = axis(InputAction::MoveLeft, InputAction::MoveRight);
    let mut move_y: f32 = axis(InputAction::MoveUp, InputAction::MoveDown);
    let length = (move_x * move_x + move_y * move_y).sqrt();
    if length > 1.0 {
        move_x /= length;
        move_y /= length;
    }
    Intent {
        move_x,
        move_y,
        attack: input.pressed(InputAction::Confirm),
    }
}

/// Maps arena units onto the canvas below the HUD strip.
struct ArenaView {
    tile: i32,
    origin_x: i32,
    origin_y: i32,
}

impl ArenaView {
    fn fit(canvas: &Canvas<'_>) -> Self {
        let usable_height = (canvas.height() as i32 - HUD_MARGIN_PX).max(1);
        let tile = ((canvas.width() as f32 / ARENA_WIDTH)
            .min(usable_height as f32 / ARENA_HEIGHT)
            .floor() as i32)
            .max(1);
        Self {
            tile,
            origin_x: (canvas.width() as i32 - tile * ARENA_WIDTH as i32) / 2,
            origin_y: HUD_MARGIN_PX,
        }
    }

    fn to_screen(&self, position: Vec2) -> (i32, i32) {
        (
            self.origin_x + (position.x * self.tile as f32) as i32,
            self.origin_y + (position.y * self.tile as f32) as i32,
        )
    }
}

pub(crate) fn draw_arena(canvas: &mut Canvas<'_>, arena: &Arena, style: SceneStyle) {
    canvas.fill(BACKGROUND);
    let view = ArenaView::fit(canvas);
    let columns = ARENA_WIDTH as i32;
    let rows = ARENA_HEIGHT as i32;

    for row in 0..rows {
        for column in 0..columns {
            let color = if style.pixel_art && (row + column) % 2 == 1 {
                FLOOR_ALT
            } else {
                FLOOR
            };
            canvas.fill_rect(
                view.origin_x + column * view.tile,
                view.origin_y + row * view.tile,
                view.tile,
                view.tile,
                color,
            );
        }
    }
    canvas.outline_rect(
        view.origin_x - 1,
        view.origin_y - 1,
        columns * view.tile + 2,
        rows * view.tile + 2,
        WALL,
    );

    let stairs_color = if arena.stairs_open() {
        STAIRS_OPEN
    } else {
        STAIRS_LOCKED
    };
    draw_token(canvas, &view, arena.stairs, 0.8, stairs_color, style);
    for enemy in arena.enemies.iter().filter(|enemy| enemy.alive) {
        draw_token(canvas, &view, enemy.position, 0.6, ENEMY, style);
    }
    draw_token(canvas, &view, arena.player, 0.6, PLAYER, style);
}

fn draw_token(
    canvas: &mut Canvas<'_>,
    view: &ArenaView,
    center: Vec2,
    size_tiles: f32,
    color: Rgba,
    style: SceneStyle,
) {
    let size = ((view.tile as f32 * size_tiles) as i32).max(2);
    let (center_x, center_y) = view.to_screen(center);
    let x = center_x - size / 2;
    let y = center_y - size / 2;
    canvas.fill_rect(x, y, size, size, color);
    if style.pixel_art {
        let shade = [color[0] / 2, color[1] / 2, color[2] / 2, 255];
        canvas.outline_rect(x, y, size, size, shade);
    }
}
