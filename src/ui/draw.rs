/// Screen-space rectangle in window pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true if the point (px, py) is inside this rectangle.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }

    /// Overlap of two rectangles; zero-sized when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        Rect {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Filled and/or outlined box. `ellipse` inscribes the shape in the box.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelCommand {
    pub rect: Rect,
    pub bg_color: [f32; 4],
    pub border_color: [f32; 4],
    pub border_width: f32,
    pub ellipse: bool,
}

/// A single line of text, top-left anchored.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCommand {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: [f32; 4],
    pub outline_color: Option<[f32; 4]>,
}

/// A cached image stretched over `rect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCommand {
    pub image_id: u32,
    pub rect: Rect,
    pub grayscale: bool,
    /// Color modulation with alpha already applied.
    pub tint: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Panel(PanelCommand),
    Text(TextCommand),
    Image(ImageCommand),
}

/// A command plus the clip of its nearest container.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub command: DrawCommand,
    pub clip: Rect,
}

/// Painter-ordered draw commands collected from the element tree.
/// Decouples element logic from GPU renderers.
#[derive(Debug, Default)]
pub struct DrawList {
    pub items: Vec<DrawItem>,
}

impl DrawList {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push(&mut self, command: DrawCommand, clip: Rect) {
        if clip.is_empty() {
            return;
        }
        self.items.push(DrawItem { command, clip });
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextCommand> {
        self.items.iter().filter_map(|i| match &i.command {
            DrawCommand::Text(t) => Some(t),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageCommand> {
        self.items.iter().filter_map(|i| match &i.command {
            DrawCommand::Image(t) => Some(t),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersect(&b).is_empty());
        let c = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&c), Rect::new(5.0, 5.0, 5.0, 5.0));
    }

    #[test]
    fn clipped_out_commands_are_dropped() {
        let mut list = DrawList::new();
        let cmd = DrawCommand::Text(TextCommand {
            text: "x".into(),
            x: 0.0,
            y: 0.0,
            color: [1.0; 4],
            outline_color: None,
        });
        list.push(cmd.clone(), Rect::default());
        assert!(list.items.is_empty());
        list.push(cmd, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(list.texts().count(), 1);
    }
}
