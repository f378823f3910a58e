use std::rc::Rc;

use dungeon_engine::{Canvas, InputAction, InputSnapshot, Scene};
use tracing::{info, warn};

use super::{draw_centered, draw_screen_title, SceneAction, SceneContext, BODY, MUTED};
use crate::submission::{ResultSubmitter, SubmissionStatus};

pub(crate) struct GameOverScene {
    context: SceneContext,
    submitter: Rc<dyn ResultSubmitter>,
}

impl GameOverScene {
    pub(crate) fn new(context: SceneContext, submitter: Rc<dyn ResultSubmitter>) -> Self {
        Self { context, submitter }
    }
}

impl Scene for GameOverScene {
    /// Submits the run frozen by the flow when it ended. Later changes to
    /// the session do not reach the record.
    fn load(&mut self) {
        match self.context.flow.finished_run().get() {
            Some(run) => {
                info!(score = run.score, level = run.level, "game_over_submitting_run");
                self.submitter.submit(&run);
            }
            None => warn!("game_over_without_finished_run"),
        }
    }

    fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot) {
        let flow = &self.context.flow;
        if input.pressed(InputAction::Confirm) {
            flow.dispatch(SceneAction::Restart);
        } else if input.pressed(InputAction::Retry) {
            if !self.submitter.retry() {
                info!("submission_retry_not_available");
            }
        } else if input.pressed(InputAction::Cancel) || input.pressed(InputAction::Back) {
            flow.dispatch(SceneAction::ReturnHome);
        }
    }

    fn render(&mut self, canvas: &mut Canvas<'_>) {
        draw_screen_title(canvas, "GAME OVER");
        let base = canvas.height() as i32 / 2 - 40;
        if let Some(run) = self.context.flow.finished_run().get() {
            draw_centered(canvas, base, &format!("score {}", run.score), 3, BODY);
            draw_centered(
                canvas,
                base + 32,
                &format!(
                    "level {}  rounds {}  {:.2}s",
                    run.level,
                    run.rounds,
                    run.duration.as_secs_f64()
                ),
                2,
                BODY,
            );
        }
        let mut hint = "ENTER play again  ESC home".to_string();
        if matches!(self.submitter.status().get(), SubmissionStatus::Failed(_)) {
            hint.push_str("  R retry save");
        }
        draw_centered(canvas, base + 80, &hint, 1, MUTED);
    }

    fn unload(&mut self) {}

    fn debug_title(&self) -> Option<String> {
        Some("Game Over".to_string())
    }
}
