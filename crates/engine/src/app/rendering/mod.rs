mod canvas;
mod font;
mod renderer;

pub use canvas::{glyph_advance, line_advance, text_width, Canvas, Rgba};
pub use renderer::{Renderer, Viewport};
