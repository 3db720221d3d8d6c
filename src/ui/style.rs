//! Style model and the text grammar it is parsed from.
//!
//! A style block is a sequence of lines of the form `Property value…`.
//! `;` starts a comment that runs to the end of the line. Parsing is total:
//! malformed numbers become zero, unknown properties are skipped and
//! malformed colors leave the previous value in place.

use std::fmt::Write as _;

use bitflags::bitflags;

/// A scalar that is either absolute or a percentage of the parent dimension.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Number {
    pub value: f64,
    pub percentage: bool,
}

impl Number {
    pub const ZERO: Self = Self {
        value: 0.0,
        percentage: false,
    };

    pub const fn px(value: f64) -> Self {
        Self {
            value,
            percentage: false,
        }
    }

    pub const fn percent(value: f64) -> Self {
        Self {
            value,
            percentage: true,
        }
    }

    pub fn percent_of(&self, n: f64) -> f64 {
        n * self.value / 100.0
    }

    /// Resolve against the parent dimension. Percentages resolve to zero
    /// when there is no parent.
    pub fn resolve(&self, parent: Option<f64>) -> f64 {
        if !self.percentage {
            return self.value;
        }
        match parent {
            Some(p) if p.is_finite() => {
                let v = self.percent_of(p);
                if v.is_finite() { v } else { 0.0 }
            }
            _ => 0.0,
        }
    }

    fn parse(token: &str) -> Self {
        let token = token.trim();
        let (digits, percentage) = match token.strip_suffix('%') {
            Some(rest) => (rest, true),
            None => (token, false),
        };
        let value = digits.trim().parse::<f64>().unwrap_or(0.0);
        let value = if value.is_finite() { value } else { 0.0 };
        Self { value, percentage }
    }

    fn format(&self) -> String {
        if self.percentage {
            format!("{}%", self.value)
        } else {
            format!("{}", self.value)
        }
    }
}

/// 8-bit non-premultiplied RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Linear 0..1 channels for the GPU.
    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Scale every channel toward black by `factor` (0..1), keeping alpha.
    pub fn darken(self, factor: f64) -> Self {
        let f = (1.0 - factor).clamp(0.0, 1.0);
        Self {
            r: (self.r as f64 * f) as u8,
            g: (self.g as f64 * f) as u8,
            b: (self.b as f64 * f) as u8,
            a: self.a,
        }
    }

    /// Multiply alpha by `alpha` (0..1).
    pub fn with_alpha(self, alpha: f64) -> Self {
        Self {
            a: (self.a as f64 * alpha.clamp(0.0, 1.0)).round() as u8,
            ..self
        }
    }

    /// Parse 1–4 space separated channels; missing channels are zero.
    /// Returns None if any token is not an 8-bit integer.
    pub fn parse(text: &str) -> Option<Self> {
        let mut channels = [0u8; 4];
        let mut count = 0;
        for token in text.split_whitespace() {
            if count == 4 {
                return None;
            }
            channels[count] = token.parse::<u8>().ok()?;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Self::new(channels[0], channels[1], channels[2], channels[3]))
    }

    fn format(&self) -> String {
        format!("{} {} {} {}", self.r, self.g, self.b, self.a)
    }
}

bitflags! {
    /// Anchor of an element relative to its position (also used for content).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Origin: u8 {
        const CENTER_X = 1 << 0;
        const CENTER_Y = 1 << 1;
        const BOTTOM = 1 << 2;
        const RIGHT = 1 << 3;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Resize: u8 {
        const TO_CONTENT = 1 << 0;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Display: u8 {
        const COLUMNS = 1 << 0;
        const ROWS = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Direction: u8 {
        const REGULAR = 1 << 0;
        const REVERSE = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Wrap: u8 {
        const NO_WRAP = 1 << 0;
        const WRAP = 1 << 1;
        const HARD = 1 << 2;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Overflow: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
    }
}

const ORIGIN_NAMES: &[(&str, Origin)] = &[
    ("CenterX", Origin::CENTER_X),
    ("CenterY", Origin::CENTER_Y),
    ("Bottom", Origin::BOTTOM),
    ("Right", Origin::RIGHT),
];
const RESIZE_NAMES: &[(&str, Resize)] = &[("ToContent", Resize::TO_CONTENT)];
const DISPLAY_NAMES: &[(&str, Display)] =
    &[("Columns", Display::COLUMNS), ("Rows", Display::ROWS)];
const DIRECTION_NAMES: &[(&str, Direction)] = &[
    ("Regular", Direction::REGULAR),
    ("Reverse", Direction::REVERSE),
];
const WRAP_NAMES: &[(&str, Wrap)] = &[
    ("NoWrap", Wrap::NO_WRAP),
    ("Wrap", Wrap::WRAP),
    ("Hard", Wrap::HARD),
];
const OVERFLOW_NAMES: &[(&str, Overflow)] = &[("X", Overflow::X), ("Y", Overflow::Y)];

fn parse_flags<F: bitflags::Flags + Copy>(text: &str, names: &[(&str, F)]) -> F {
    let mut out = F::empty();
    for token in text.split_whitespace() {
        if let Some((_, flag)) = names.iter().find(|(n, _)| *n == token) {
            out.insert(*flag);
        }
    }
    out
}

fn format_flags<F: bitflags::Flags + Copy>(flags: F, names: &[(&str, F)]) -> String {
    names
        .iter()
        .filter(|(_, f)| flags.contains(*f))
        .map(|(n, _)| *n)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Four per-side Numbers, in left/right/top/bottom order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sides {
    pub left: Number,
    pub right: Number,
    pub top: Number,
    pub bottom: Number,
}

impl Sides {
    /// Apply 1/2/3/4-value shorthand: all; LR,TB; L,T,R; L,T,R,B.
    fn apply_shorthand(&mut self, text: &str) {
        let values: Vec<Number> = text.split_whitespace().map(Number::parse).collect();
        match values.as_slice() {
            [all] => {
                self.left = *all;
                self.right = *all;
                self.top = *all;
                self.bottom = *all;
            }
            [lr, tb] => {
                self.left = *lr;
                self.right = *lr;
                self.top = *tb;
                self.bottom = *tb;
            }
            [l, t, r] => {
                self.left = *l;
                self.top = *t;
                self.right = *r;
            }
            [l, t, r, b, ..] => {
                self.left = *l;
                self.top = *t;
                self.right = *r;
                self.bottom = *b;
            }
            [] => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub x: Number,
    pub y: Number,
    pub w: Number,
    pub h: Number,
    pub min_w: Number,
    pub min_h: Number,
    pub max_w: Number,
    pub max_h: Number,
    pub padding: Sides,
    pub margin: Sides,
    pub scroll_left: Number,
    pub scroll_top: Number,
    pub z_index: Number,
    pub scale_x: Number,
    pub scale_y: Number,
    pub alpha: Number,

    pub origin: Origin,
    pub content_origin: Origin,
    pub resize: Resize,
    pub display: Display,
    pub direction: Direction,
    pub wrap: Wrap,
    pub overflow: Overflow,

    pub foreground_color: Rgba,
    pub background_color: Rgba,
    pub outline_color: Rgba,
    pub scrollbar_gripper_color: Rgba,
    pub color_mod: Rgba,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            x: Number::ZERO,
            y: Number::ZERO,
            w: Number::ZERO,
            h: Number::ZERO,
            min_w: Number::ZERO,
            min_h: Number::ZERO,
            max_w: Number::ZERO,
            max_h: Number::ZERO,
            padding: Sides::default(),
            margin: Sides::default(),
            scroll_left: Number::ZERO,
            scroll_top: Number::ZERO,
            z_index: Number::ZERO,
            scale_x: Number::px(1.0),
            scale_y: Number::px(1.0),
            alpha: Number::px(1.0),
            origin: Origin::empty(),
            content_origin: Origin::empty(),
            resize: Resize::empty(),
            display: Display::empty(),
            direction: Direction::empty(),
            wrap: Wrap::empty(),
            overflow: Overflow::empty(),
            foreground_color: Rgba::WHITE,
            background_color: Rgba::TRANSPARENT,
            outline_color: Rgba::TRANSPARENT,
            scrollbar_gripper_color: Rgba::new(128, 128, 128, 255),
            color_mod: Rgba::WHITE,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Property(String),
    Value(String),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LexState {
    Initial,
    Comment,
    Variable,
    Value,
}

/// Tokenize a style block into alternating Property/Value tokens.
///
/// Every Property is followed by exactly one Value (possibly empty).
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut state = LexState::Initial;
    let mut buf = String::new();

    for ch in input.chars() {
        match state {
            LexState::Initial => {
                if ch == ';' {
                    state = LexState::Comment;
                } else if !ch.is_whitespace() {
                    buf.push(ch);
                    state = LexState::Variable;
                }
            }
            LexState::Comment => {
                if ch == '\n' {
                    state = LexState::Initial;
                }
            }
            LexState::Variable => {
                if ch == ';' || ch == '\n' {
                    tokens.push(Token::Property(std::mem::take(&mut buf)));
                    tokens.push(Token::Value(String::new()));
                    state = if ch == ';' {
                        LexState::Comment
                    } else {
                        LexState::Initial
                    };
                } else if ch.is_whitespace() {
                    tokens.push(Token::Property(std::mem::take(&mut buf)));
                    state = LexState::Value;
                } else {
                    buf.push(ch);
                }
            }
            LexState::Value => {
                if ch == ';' || ch == '\n' {
                    tokens.push(Token::Value(std::mem::take(&mut buf).trim().to_string()));
                    state = if ch == ';' {
                        LexState::Comment
                    } else {
                        LexState::Initial
                    };
                } else {
                    buf.push(ch);
                }
            }
        }
    }

    match state {
        LexState::Variable => {
            tokens.push(Token::Property(buf));
            tokens.push(Token::Value(String::new()));
        }
        LexState::Value => tokens.push(Token::Value(buf.trim().to_string())),
        LexState::Initial | LexState::Comment => {}
    }
    tokens.push(Token::Eof);
    tokens
}

// ---------------------------------------------------------------------------
// Parser / formatter
// ---------------------------------------------------------------------------

impl Style {
    /// Parse `text` on top of the current values.
    pub fn parse(&mut self, text: &str) {
        let tokens = tokenize(text);
        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            let Token::Property(name) = token else {
                if token == Token::Eof {
                    break;
                }
                continue;
            };
            let value = match iter.next() {
                Some(Token::Value(v)) => v,
                _ => String::new(),
            };
            self.apply_property(&name, &value);
        }
    }

    /// Build a style from the default values plus `text`.
    pub fn from_text(text: &str) -> Self {
        let mut style = Self::default();
        style.parse(text);
        style
    }

    fn apply_property(&mut self, name: &str, value: &str) {
        match name {
            "X" => self.x = Number::parse(value),
            "Y" => self.y = Number::parse(value),
            "W" => self.w = Number::parse(value),
            "H" => self.h = Number::parse(value),
            "MinW" => self.min_w = Number::parse(value),
            "MinH" => self.min_h = Number::parse(value),
            "MaxW" => self.max_w = Number::parse(value),
            "MaxH" => self.max_h = Number::parse(value),
            "Padding" => self.padding.apply_shorthand(value),
            "PaddingLeft" => self.padding.left = Number::parse(value),
            "PaddingRight" => self.padding.right = Number::parse(value),
            "PaddingTop" => self.padding.top = Number::parse(value),
            "PaddingBottom" => self.padding.bottom = Number::parse(value),
            "Margin" => self.margin.apply_shorthand(value),
            "MarginLeft" => self.margin.left = Number::parse(value),
            "MarginRight" => self.margin.right = Number::parse(value),
            "MarginTop" => self.margin.top = Number::parse(value),
            "MarginBottom" => self.margin.bottom = Number::parse(value),
            "ScrollLeft" => self.scroll_left = Number::parse(value),
            "ScrollTop" => self.scroll_top = Number::parse(value),
            "ZIndex" => self.z_index = Number::parse(value),
            "ScaleX" => self.scale_x = Number::parse(value),
            "ScaleY" => self.scale_y = Number::parse(value),
            "Alpha" => self.alpha = Number::parse(value),
            "Origin" => self.origin = parse_flags(value, ORIGIN_NAMES),
            "ContentOrigin" => self.content_origin = parse_flags(value, ORIGIN_NAMES),
            "Resize" => self.resize = parse_flags(value, RESIZE_NAMES),
            "Display" => self.display = parse_flags(value, DISPLAY_NAMES),
            "Direction" => self.direction = parse_flags(value, DIRECTION_NAMES),
            "Wrap" => self.wrap = parse_flags(value, WRAP_NAMES),
            "Overflow" => self.overflow = parse_flags(value, OVERFLOW_NAMES),
            "ForegroundColor" => set_color(&mut self.foreground_color, value),
            "BackgroundColor" => set_color(&mut self.background_color, value),
            "OutlineColor" => set_color(&mut self.outline_color, value),
            "ScrollbarGripperColor" => set_color(&mut self.scrollbar_gripper_color, value),
            "ColorMod" => set_color(&mut self.color_mod, value),
            _ => log::debug!("ignoring unknown style property {name:?}"),
        }
    }

    /// Serialize every field in the grammar accepted by [`Style::parse`].
    pub fn format(&self) -> String {
        let mut out = String::new();
        let numbers: [(&str, &Number); 22] = [
            ("X", &self.x),
            ("Y", &self.y),
            ("W", &self.w),
            ("H", &self.h),
            ("MinW", &self.min_w),
            ("MinH", &self.min_h),
            ("MaxW", &self.max_w),
            ("MaxH", &self.max_h),
            ("PaddingLeft", &self.padding.left),
            ("PaddingRight", &self.padding.right),
            ("PaddingTop", &self.padding.top),
            ("PaddingBottom", &self.padding.bottom),
            ("MarginLeft", &self.margin.left),
            ("MarginRight", &self.margin.right),
            ("MarginTop", &self.margin.top),
            ("MarginBottom", &self.margin.bottom),
            ("ScrollLeft", &self.scroll_left),
            ("ScrollTop", &self.scroll_top),
            ("ZIndex", &self.z_index),
            ("ScaleX", &self.scale_x),
            ("ScaleY", &self.scale_y),
            ("Alpha", &self.alpha),
        ];
        for (name, n) in numbers {
            let _ = writeln!(out, "{name} {}", n.format());
        }
        let flags = [
            ("Origin", format_flags(self.origin, ORIGIN_NAMES)),
            ("ContentOrigin", format_flags(self.content_origin, ORIGIN_NAMES)),
            ("Resize", format_flags(self.resize, RESIZE_NAMES)),
            ("Display", format_flags(self.display, DISPLAY_NAMES)),
            ("Direction", format_flags(self.direction, DIRECTION_NAMES)),
            ("Wrap", format_flags(self.wrap, WRAP_NAMES)),
            ("Overflow", format_flags(self.overflow, OVERFLOW_NAMES)),
        ];
        for (name, v) in flags {
            let _ = writeln!(out, "{name} {v}");
        }
        let colors = [
            ("ForegroundColor", self.foreground_color),
            ("BackgroundColor", self.background_color),
            ("OutlineColor", self.outline_color),
            ("ScrollbarGripperColor", self.scrollbar_gripper_color),
            ("ColorMod", self.color_mod),
        ];
        for (name, c) in colors {
            let _ = writeln!(out, "{name} {}", c.format());
        }
        out
    }
}

fn set_color(target: &mut Rgba, value: &str) {
    if let Some(c) = Rgba::parse(value) {
        *target = c;
    }
}
