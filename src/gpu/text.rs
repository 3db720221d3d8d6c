use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache};

use crate::ui::TextMeasurer;

pub const FONT_SIZE: f32 = 14.0;
pub const LINE_HEIGHT: f32 = 18.0;

/// Straight-alpha RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; (width * height * 4) as usize],
        }
    }

    /// Composite one pixel over what is there. Out of bounds is ignored.
    pub fn blend(&mut self, x: i32, y: i32, src: [u8; 4]) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height || src[3] == 0 {
            return;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        let dst = &mut self.rgba[i..i + 4];
        let sa = src[3] as f32 / 255.0;
        let da = dst[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return;
        }
        for c in 0..3 {
            let s = src[c] as f32 / 255.0;
            let d = dst[c] as f32 / 255.0;
            let v = (s * sa + d * da * (1.0 - sa)) / out_a;
            dst[c] = (v * 255.0).round() as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }
}

pub fn to_rgba8(c: [f32; 4]) -> [u8; 4] {
    c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Shapes and rasterizes single strings on the CPU.
pub struct TextRasterizer {
    fonts: FontSystem,
    swash: SwashCache,
    metrics: Metrics,
}

impl TextRasterizer {
    /// System fonts plus any found in `font_dir`.
    pub fn new(font_dir: Option<&Path>) -> Self {
        let mut fonts = FontSystem::new();
        if let Some(dir) = font_dir.filter(|d| d.is_dir()) {
            fonts.db_mut().load_fonts_dir(dir);
            log::debug!("loaded fonts from {}", dir.display());
        }
        Self {
            fonts,
            swash: SwashCache::new(),
            metrics: Metrics::new(FONT_SIZE, LINE_HEIGHT),
        }
    }

    fn shape(&mut self, text: &str) -> Buffer {
        let mut buffer = Buffer::new(&mut self.fonts, self.metrics);
        buffer.set_size(&mut self.fonts, None, None);
        let attrs = Attrs::new().family(Family::SansSerif);
        buffer.set_text(&mut self.fonts, text, &attrs, Shaping::Advanced, None);
        buffer.shape_until_scroll(&mut self.fonts, false);
        buffer
    }

    fn extent(&self, buffer: &Buffer) -> (f32, f32) {
        let mut width = 0.0f32;
        let mut lines = 0;
        for run in buffer.layout_runs() {
            width = width.max(run.line_w);
            lines += 1;
        }
        (width.ceil(), lines.max(1) as f32 * self.metrics.line_height)
    }

    pub fn measure(&mut self, text: &str) -> (f32, f32) {
        let buffer = self.shape(text);
        self.extent(&buffer)
    }

    /// Draw `text` into a fresh bitmap. An outline adds one pixel on every
    /// side. `None` for text with no visible extent.
    pub fn rasterize(
        &mut self,
        text: &str,
        color: [u8; 4],
        outline: Option<[u8; 4]>,
    ) -> Option<Bitmap> {
        let mut buffer = self.shape(text);
        let (w, h) = self.extent(&buffer);
        if w <= 0.0 {
            return None;
        }
        let pad = i32::from(outline.is_some());
        let mut bitmap = Bitmap::new(w as u32 + 2 * pad as u32, h as u32 + 2 * pad as u32);

        let mut pass = |bitmap: &mut Bitmap, dx: i32, dy: i32, rgba: [u8; 4]| {
            let color = Color::rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
            buffer.draw(&mut self.fonts, &mut self.swash, color, |x, y, w, h, c| {
                for py in y..y + h as i32 {
                    for px in x..x + w as i32 {
                        bitmap.blend(px + dx, py + dy, [c.r(), c.g(), c.b(), c.a()]);
                    }
                }
            });
        };
        if let Some(outline) = outline {
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)] {
                pass(&mut bitmap, pad + dx, pad + dy, outline);
            }
        }
        pass(&mut bitmap, pad, pad, color);
        Some(bitmap)
    }
}

/// One rasterizer used both by layout (measuring) and by the GPU backend.
#[derive(Clone)]
pub struct SharedText(Rc<RefCell<TextRasterizer>>);

impl SharedText {
    pub fn new(rasterizer: TextRasterizer) -> Self {
        Self(Rc::new(RefCell::new(rasterizer)))
    }

    pub fn rasterize(
        &self,
        text: &str,
        color: [u8; 4],
        outline: Option<[u8; 4]>,
    ) -> Option<Bitmap> {
        self.0.borrow_mut().rasterize(text, color, outline)
    }
}

impl TextMeasurer for SharedText {
    fn measure(&mut self, text: &str) -> (f64, f64) {
        let (w, h) = self.0.borrow_mut().measure(text);
        (w as f64, h as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_source_replaces_pixel() {
        let mut b = Bitmap::new(2, 1);
        b.blend(1, 0, [10, 20, 30, 255]);
        assert_eq!(&b.rgba[4..8], &[10, 20, 30, 255]);
        assert_eq!(&b.rgba[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn translucent_over_transparent_keeps_color() {
        let mut b = Bitmap::new(1, 1);
        b.blend(0, 0, [200, 100, 50, 128]);
        assert_eq!(b.rgba, vec![200, 100, 50, 128]);
    }

    #[test]
    fn fill_over_outline_mixes() {
        let mut b = Bitmap::new(1, 1);
        b.blend(0, 0, [0, 0, 0, 255]);
        b.blend(0, 0, [255, 255, 255, 128]);
        assert_eq!(b.rgba[3], 255);
        assert!(b.rgba[0] > 120 && b.rgba[0] < 135);
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut b = Bitmap::new(1, 1);
        b.blend(-1, 0, [255; 4]);
        b.blend(0, 1, [255; 4]);
        assert_eq!(b.rgba, vec![0; 4]);
    }

    #[test]
    fn float_colors_round_to_bytes() {
        assert_eq!(to_rgba8([1.0, 0.5, 0.0, 2.0]), [255, 128, 0, 255]);
    }
}
