use super::font::{glyph_rows, GLYPH_HEIGHT, GLYPH_WIDTH};

pub type Rgba = [u8; 4];

/// A borrowed RGBA8 frame with clipped drawing primitives. Every write
/// outside the frame is dropped, so callers never bounds-check.
pub struct Canvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    /// Returns `None` when `frame` is too small for `width * height` pixels.
    pub fn new(frame: &'a mut [u8], width: u32, height: u32) -> Option<Self> {
        let required = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if frame.len() < required {
            return None;
        }
        Some(Self {
            frame,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: Rgba) {
        for pixel in self.frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let pixel = &mut self.frame[offset..offset + 4];
        if color[3] == u8::MAX {
            pixel.copy_from_slice(&color);
        } else {
            blend_into(pixel, color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut color = [0; 4];
        color.copy_from_slice(&self.frame[offset..offset + 4]);
        Some(color)
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, rect_width: i32, rect_height: i32, color: Rgba) {
        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = x.saturating_add(rect_width).min(self.width as i32);
        let end_y = y.saturating_add(rect_height).min(self.height as i32);
        for py in start_y..end_y {
            for px in start_x..end_x {
                self.put_pixel(px, py, color);
            }
        }
    }

    pub fn outline_rect(&mut self, x: i32, y: i32, rect_width: i32, rect_height: i32, color: Rgba) {
        if rect_width <= 1 || rect_height <= 1 {
            return;
        }
        self.fill_rect(x, y, rect_width, 1, color);
        self.fill_rect(x, y + rect_height - 1, rect_width, 1, color);
        self.fill_rect(x, y, 1, rect_height, color);
        self.fill_rect(x + rect_width - 1, y, 1, rect_height, color);
    }

    /// Draws `text` with its top-left corner at (x, y), each font pixel
    /// scaled to `scale` screen pixels. Returns the drawn width.
    pub fn text(&mut self, x: i32, y: i32, text: &str, scale: i32, color: Rgba) -> i32 {
        let scale = scale.max(1);
        let mut cursor_x = x;
        for ch in text.chars() {
            self.glyph(cursor_x, y, glyph_rows(ch), scale, color);
            cursor_x += glyph_advance(scale);
        }
        cursor_x - x
    }

    fn glyph(&mut self, x: i32, y: i32, rows: [u8; GLYPH_HEIGHT as usize], scale: i32, color: Rgba) {
        for (row_index, row_bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if row_bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                self.fill_rect(
                    x + col * scale,
                    y + row_index as i32 * scale,
                    scale,
                    scale,
                    color,
                );
            }
        }
    }
}

pub fn glyph_advance(scale: i32) -> i32 {
    (GLYPH_WIDTH + 1) * scale.max(1)
}

pub fn line_advance(scale: i32) -> i32 {
    (GLYPH_HEIGHT + 2) * scale.max(1)
}

pub fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * glyph_advance(scale)
}

fn blend_into(pixel: &mut [u8], color: Rgba) {
    let alpha = color[3] as u32;
    let inverse = 255 - alpha;
    for channel in 0..3 {
        let mixed = (color[channel] as u32 * alpha + pixel[channel] as u32 * inverse) / 255;
        pixel[channel] = mixed as u8;
    }
    pixel[3] = u8::MAX;
}
