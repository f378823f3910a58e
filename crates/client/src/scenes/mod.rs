mod dungeon;
pub(crate) mod flow;
mod game_over;
mod home;
mod lobby;
mod multiplayer_dungeon;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use dungeon_engine::{text_width, Canvas, EngineError, Rgba, Scene};

use crate::net::Outbox;
use crate::state::ActiveScene;
use crate::submission::ResultSubmitter;

pub(crate) use flow::{SceneAction, SceneFlow};

const BACKGROUND: Rgba = [18, 16, 24, 255];
const TITLE: Rgba = [236, 208, 120, 255];
const BODY: Rgba = [210, 210, 220, 255];
const MUTED: Rgba = [120, 118, 140, 255];

/// Construction parameters a scene is built with.
#[derive(Clone)]
pub(crate) enum SceneParams {
    None,
    Submission(Rc<dyn ResultSubmitter>),
}

impl fmt::Debug for SceneParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneParams::None => f.write_str("None"),
            SceneParams::Submission(_) => f.write_str("Submission(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SceneDescriptor {
    pub(crate) key: ActiveScene,
    pub(crate) params: SceneParams,
}

/// The full roster handed to the engine on construction.
pub(crate) fn roster(submitter: Rc<dyn ResultSubmitter>) -> Vec<SceneDescriptor> {
    ActiveScene::ALL
        .into_iter()
        .map(|key| SceneDescriptor {
            key,
            params: match key {
                ActiveScene::GameOver => SceneParams::Submission(Rc::clone(&submitter)),
                _ => SceneParams::None,
            },
        })
        .collect()
}

/// Requests scenes raise toward the screen that hosts them.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScreenSignals {
    exit_requested: Rc<Cell<bool>>,
}

impl ScreenSignals {
    pub(crate) fn request_exit(&self) {
        self.exit_requested.set(true);
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit_requested.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SceneStyle {
    pub(crate) pixel_art: bool,
}

/// Everything a scene may touch. Scenes change scene only through `flow`.
#[derive(Clone)]
pub(crate) struct SceneContext {
    pub(crate) flow: Rc<SceneFlow>,
    pub(crate) outbox: Outbox,
    pub(crate) signals: ScreenSignals,
    pub(crate) style: SceneStyle,
}

pub(crate) fn build_scene(
    descriptor: SceneDescriptor,
    context: &SceneContext,
) -> Result<Box<dyn Scene>, EngineError> {
    let context = context.clone();
    let scene: Box<dyn Scene> = match (descriptor.key, descriptor.params) {
        (ActiveScene::Home, SceneParams::None) => Box::new(home::HomeScene::new(context)),
        (ActiveScene::Game, SceneParams::None) => Box::new(dungeon::DungeonScene::new(context)),
        (ActiveScene::GameOver, SceneParams::Submission(submitter)) => {
            Box::new(game_over::GameOverScene::new(context, submitter))
        }
        (ActiveScene::MultiplayerLobby, SceneParams::None) => {
            Box::new(lobby::LobbyScene::new(context))
        }
        (ActiveScene::MultiplayerDungeon, SceneParams::None) => {
            Box::new(multiplayer_dungeon::MultiplayerDungeonScene::new(context))
        }
        (key, params) => {
            return Err(EngineError::Construct(format!(
                "scene {key} cannot be built with {params:?}"
            )))
        }
    };
    Ok(scene)
}

pub(crate) fn build_roster(
    descriptors: Vec<SceneDescriptor>,
    context: &SceneContext,
) -> Result<Vec<(ActiveScene, Box<dyn Scene>)>, EngineError> {
    descriptors
        .into_iter()
        .map(|descriptor| {
            let key = descriptor.key;
            build_scene(descriptor, context).map(|scene| (key, scene))
        })
        .collect()
}

fn draw_screen_title(canvas: &mut Canvas<'_>, title: &str) {
    canvas.fill(BACKGROUND);
    draw_centered(canvas, canvas.height() as i32 / 5, title, 4, TITLE);
}

fn draw_centered(canvas: &mut Canvas<'_>, y: i32, text: &str, scale: i32, color: Rgba) {
    let x = (canvas.width() as i32 - text_width(text, scale)) / 2;
    canvas.text(x, y, text, scale, color);
}
