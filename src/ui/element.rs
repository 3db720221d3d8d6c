use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::keys::Modifiers;
use super::style::Style;
use super::{ElementId, ElementTree};
use crate::error::ClientError;

/// Mouse button identifier (decoupled from winit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Middle, MouseButton::Right];

    pub fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Events delivered to element handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    MouseIn { x: f64, y: f64 },
    MouseOut { x: f64, y: f64 },
    MouseMove { x: f64, y: f64 },
    MouseButtonDown { button: MouseButton, x: f64, y: f64 },
    MouseButtonUp { button: MouseButton, x: f64, y: f64 },
    /// Press and release both landed on this element.
    Pressed { button: MouseButton, x: f64, y: f64 },
    /// The button stayed down past the hold delay.
    Hold { button: MouseButton, x: f64, y: f64 },
    Unhold { button: MouseButton, x: f64, y: f64 },
    KeyDown { code: u32, modifiers: Modifiers, repeat: bool },
    KeyUp { code: u32, modifiers: Modifiers },
    TextInput(String),
    TextEdit { text: String, start: i32, length: i32 },
    Focus,
    Blur,
    WindowResized { w: f64, h: f64 },
    Created,
    Adopted,
    /// The element's value changed through user input.
    Change(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MouseIn,
    MouseOut,
    MouseMove,
    MouseButtonDown,
    MouseButtonUp,
    Pressed,
    Hold,
    Unhold,
    KeyDown,
    KeyUp,
    TextInput,
    TextEdit,
    Focus,
    Blur,
    WindowResized,
    Created,
    Adopted,
    Change,
}

impl UiEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UiEvent::MouseIn { .. } => EventKind::MouseIn,
            UiEvent::MouseOut { .. } => EventKind::MouseOut,
            UiEvent::MouseMove { .. } => EventKind::MouseMove,
            UiEvent::MouseButtonDown { .. } => EventKind::MouseButtonDown,
            UiEvent::MouseButtonUp { .. } => EventKind::MouseButtonUp,
            UiEvent::Pressed { .. } => EventKind::Pressed,
            UiEvent::Hold { .. } => EventKind::Hold,
            UiEvent::Unhold { .. } => EventKind::Unhold,
            UiEvent::KeyDown { .. } => EventKind::KeyDown,
            UiEvent::KeyUp { .. } => EventKind::KeyUp,
            UiEvent::TextInput(_) => EventKind::TextInput,
            UiEvent::TextEdit { .. } => EventKind::TextEdit,
            UiEvent::Focus => EventKind::Focus,
            UiEvent::Blur => EventKind::Blur,
            UiEvent::WindowResized { .. } => EventKind::WindowResized,
            UiEvent::Created => EventKind::Created,
            UiEvent::Adopted => EventKind::Adopted,
            UiEvent::Change(_) => EventKind::Change,
        }
    }
}

/// What a handler gets to touch: the tree it lives in and its own id.
pub struct EventContext<'a> {
    pub tree: &'a mut ElementTree,
    pub id: ElementId,
}

/// Returning false stops propagation to lower siblings.
pub type Handler = Box<dyn FnMut(&mut EventContext<'_>, &UiEvent) -> bool + Send>;

/// Optional callback set of an element.
#[derive(Default)]
pub struct Events {
    handlers: HashMap<EventKind, Handler>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        kind: EventKind,
        handler: impl FnMut(&mut EventContext<'_>, &UiEvent) -> bool + Send + 'static,
    ) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn set(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn take(&mut self, kind: EventKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    /// Put a handler back unless a new one was installed meanwhile.
    pub(crate) fn restore(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_insert(handler);
    }

    pub(crate) fn merge(&mut self, other: Events) {
        self.handlers.extend(other.handlers);
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rectangle,
    Ellipse,
}

/// Variant data of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Re-anchors its children and clips them to its box.
    Container,
    /// The root; sized to the OS window.
    Window,
    Text,
    Input {
        composition: Vec<char>,
        cursor: usize,
        password: bool,
    },
    Button,
    Image {
        image_id: u32,
        grayscale: bool,
        hide_image: bool,
    },
    Primitive {
        shape: Shape,
    },
    Map,
}

impl ElementKind {
    pub fn input() -> Self {
        ElementKind::Input {
            composition: Vec::new(),
            cursor: 0,
            password: false,
        }
    }

    pub fn image(image_id: u32) -> Self {
        ElementKind::Image {
            image_id,
            grayscale: false,
            hide_image: false,
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Container => ElementType::Container,
            ElementKind::Window => ElementType::Window,
            ElementKind::Text => ElementType::Text,
            ElementKind::Input { .. } => ElementType::Input,
            ElementKind::Button => ElementType::Button,
            ElementKind::Image { .. } => ElementType::Image,
            ElementKind::Primitive { .. } => ElementType::Primitive,
            ElementKind::Map => ElementType::Map,
        }
    }

    /// Whether children are re-anchored and clipped to this element.
    pub fn is_container(&self) -> bool {
        matches!(self, ElementKind::Container | ElementKind::Window)
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ElementKind::Text | ElementKind::Input { .. } | ElementKind::Button
        )
    }
}

/// Payload-free element type, as named in layout files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Container,
    Window,
    Text,
    Input,
    Button,
    Image,
    Primitive,
    Map,
}

impl ElementType {
    pub fn default_kind(self) -> ElementKind {
        match self {
            ElementType::Container => ElementKind::Container,
            ElementType::Window => ElementKind::Window,
            ElementType::Text => ElementKind::Text,
            ElementType::Input => ElementKind::input(),
            ElementType::Button => ElementKind::Button,
            ElementType::Image => ElementKind::image(0),
            ElementType::Primitive => ElementKind::Primitive {
                shape: Shape::Rectangle,
            },
            ElementType::Map => ElementKind::Map,
        }
    }
}

impl FromStr for ElementType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Container" => ElementType::Container,
            "Window" => ElementType::Window,
            "Text" => ElementType::Text,
            "Input" => ElementType::Input,
            "Button" => ElementType::Button,
            "Image" => ElementType::Image,
            "Primitive" => ElementType::Primitive,
            "Map" => ElementType::Map,
            other => {
                return Err(ClientError::Layout(format!("unknown element type {other:?}")));
            }
        })
    }
}

/// Cached layout. `ax`/`ay` are relative to the nearest container surface;
/// `sx`/`sy` are window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    pub ax: f64,
    pub ay: f64,
    pub sx: f64,
    pub sy: f64,
    pub w: f64,
    pub h: f64,
    pub pl: f64,
    pub pr: f64,
    pub pt: f64,
    pub pb: f64,
    pub ml: f64,
    pub mr: f64,
    pub mt: f64,
    pub mb: f64,
    pub sl: f64,
    pub st: f64,
}

impl Layout {
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.sx && px < self.sx + self.w && py >= self.sy && py < self.sy + self.h
    }
}

/// A node of the element tree.
#[derive(Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub class: String,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub style: Style,
    pub last_style: Option<Style>,
    pub events: Events,
    pub layout: Layout,
    /// Y position assigned by a column-flow parent.
    pub(crate) flow_y: Option<f64>,
    pub dirty: bool,
    pub restyle: bool,
    pub oob: bool,
    pub hidden: bool,
    pub focusable: bool,
    pub focused: bool,
    pub holdable: bool,
    pub held: bool,
    pub value: String,
}

impl Element {
    pub(crate) fn new(kind: ElementKind) -> Self {
        let focusable = matches!(kind, ElementKind::Input { .. });
        let holdable = matches!(kind, ElementKind::Button);
        Self {
            kind,
            class: String::new(),
            parent: None,
            children: Vec::new(),
            style: Style::default(),
            last_style: None,
            events: Events::default(),
            layout: Layout::default(),
            flow_y: None,
            dirty: true,
            restyle: true,
            oob: false,
            hidden: false,
            focusable,
            focused: false,
            holdable,
            held: false,
            value: String::new(),
        }
    }

    /// The string drawn for textual elements. Empty renders as one space.
    pub fn display_text(&self) -> String {
        let text = match &self.kind {
            ElementKind::Input {
                composition,
                password: true,
                ..
            } => "*".repeat(composition.len()),
            ElementKind::Input { composition, .. } => composition.iter().collect(),
            _ => self.value.clone(),
        };
        if text.is_empty() { " ".to_string() } else { text }
    }
}

/// Factory input for a new element and its subtree.
#[derive(Debug)]
pub struct ElementSpec {
    pub kind: ElementKind,
    pub class: String,
    pub style: String,
    pub value: String,
    pub focusable: Option<bool>,
    pub holdable: Option<bool>,
    pub hidden: bool,
    pub events: Events,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            class: String::new(),
            style: String::new(),
            value: String::new(),
            focusable: None,
            holdable: None,
            hidden: false,
            events: Events::default(),
            children: Vec::new(),
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.focusable = Some(focusable);
        self
    }

    pub fn holdable(mut self, holdable: bool) -> Self {
        self.holdable = Some(holdable);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn events(mut self, events: Events) -> Self {
        self.events.merge(events);
        self
    }

    pub fn on(
        mut self,
        kind: EventKind,
        handler: impl FnMut(&mut EventContext<'_>, &UiEvent) -> bool + Send + 'static,
    ) -> Self {
        self.events.set(kind, Box::new(handler));
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first search for the first spec with `class`.
    pub fn find_mut(&mut self, class: &str) -> Option<&mut ElementSpec> {
        if self.class == class {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(class))
    }
}
