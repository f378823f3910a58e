mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;

pub use input::{ActionStates, InputAction, InputSnapshot};
pub use loop_runner::{run_app, AppError, ClientApp, LoopConfig};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    glyph_advance, line_advance, text_width, Canvas, Renderer, Rgba, Viewport,
};
pub use scene::{Scene, SceneMachine};
