pub mod animation;
pub mod draw;
pub mod element;
pub mod instance;
pub mod keybindings;
pub mod keys;
pub mod layout;
pub mod message;
pub mod style;

use std::sync::Arc;

pub use draw::{DrawCommand, DrawList, ImageCommand, PanelCommand, Rect, TextCommand};
pub use element::{
    Element, ElementKind, ElementSpec, ElementType, EventContext, EventKind, Events, MouseButton,
    Shape, UiEvent,
};
pub use instance::Ui;
pub use message::{Batch, ElementRef, Handle, UiSender, Update};
pub use style::{Number, Rgba, Style};

use slotmap::{SlotMap, new_key_type};

use style::{Direction, Display, Origin, Resize};

new_key_type! {
    /// Handle into the element arena. Stale after the element is destroyed.
    pub struct ElementId;
}

/// Measures a single line of text in pixels.
pub trait TextMeasurer {
    fn measure(&mut self, text: &str) -> (f64, f64);
}

/// Fixed advance per character. Used headless and in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonoMeasurer {
    pub advance: f64,
    pub line_height: f64,
}

impl Default for MonoMeasurer {
    fn default() -> Self {
        Self {
            advance: 8.0,
            line_height: 16.0,
        }
    }
}

impl TextMeasurer for MonoMeasurer {
    fn measure(&mut self, text: &str) -> (f64, f64) {
        (text.chars().count() as f64 * self.advance, self.line_height)
    }
}

/// Read access to decoded images, for sizing and pixel-perfect hits.
pub trait ImageSource: Send + Sync {
    fn image_size(&self, id: u32) -> Option<(u32, u32)>;
    fn alpha_at(&self, id: u32, x: u32, y: u32) -> Option<u8>;
    /// Ask for an image that is not cached yet.
    fn request(&self, id: u32);
}

/// Hold height of a button's bottom strip, as a fraction of its height.
const BUTTON_STRIP: f64 = 0.2;
const CURSOR_WIDTH: f64 = 2.0;

/// Geometry of the parent an element is laid out against.
#[derive(Debug, Clone, Copy)]
struct ParentFrame {
    w: f64,
    h: f64,
    ax: f64,
    ay: f64,
    sx: f64,
    sy: f64,
    sl: f64,
    st: f64,
    container: bool,
    content_origin: Origin,
}

/// Arena-backed retained element tree rooted at the window element.
pub struct ElementTree {
    arena: SlotMap<ElementId, Element>,
    root: ElementId,
    focused: Option<ElementId>,
    measurer: Box<dyn TextMeasurer>,
    images: Option<Arc<dyn ImageSource>>,
    needs_render: bool,
}

impl ElementTree {
    pub fn new(width: f64, height: f64, measurer: Box<dyn TextMeasurer>) -> Self {
        let mut arena = SlotMap::with_key();
        let mut window = Element::new(ElementKind::Window);
        window.class = "Window".into();
        window.style.w = Number::px(width);
        window.style.h = Number::px(height);
        let root = arena.insert(window);
        let mut tree = Self {
            arena,
            root,
            focused: None,
            measurer,
            images: None,
            needs_render: true,
        };
        tree.layout();
        tree
    }

    pub fn set_image_source(&mut self, images: Arc<dyn ImageSource>) {
        self.images = Some(images);
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.arena.get_mut(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.arena.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.arena.iter()
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    pub fn value(&self, id: ElementId) -> Option<&str> {
        self.arena.get(id).map(|e| e.value.as_str())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Instantiate `spec` and its children. The result has no parent.
    pub fn create(&mut self, spec: ElementSpec) -> ElementId {
        let ElementSpec {
            kind,
            class,
            style,
            value,
            focusable,
            holdable,
            hidden,
            events,
            children,
        } = spec;

        let mut element = Element::new(kind);
        element.class = class;
        element.style.parse(&style);
        if let Some(f) = focusable {
            element.focusable = f;
        }
        if let Some(h) = holdable {
            element.holdable = h;
        }
        element.hidden = hidden;
        element.events = events;
        if let ElementKind::Input {
            composition,
            cursor,
            ..
        } = &mut element.kind
        {
            *composition = value.chars().collect();
            *cursor = composition.len();
        }
        element.value = value;

        let id = self.arena.insert(element);
        self.fire(id, &UiEvent::Created);
        for child in children {
            let cid = self.create(child);
            self.adopt(id, cid);
        }
        id
    }

    /// Create `spec` and adopt it under `parent`.
    pub fn spawn(&mut self, parent: ElementId, spec: ElementSpec) -> ElementId {
        let id = self.create(spec);
        self.adopt(parent, id);
        id
    }

    /// Attach an orphan. Reparenting requires a disown first.
    pub fn adopt(&mut self, parent: ElementId, child: ElementId) -> bool {
        if parent == child || !self.contains(parent) || self.is_ancestor(child, parent) {
            log::warn!("refusing to adopt {child:?} under {parent:?}");
            return false;
        }
        let Some(c) = self.arena.get_mut(child) else {
            return false;
        };
        if c.parent.is_some() || child == self.root {
            log::warn!("{child:?} already has a parent");
            return false;
        }
        c.parent = Some(parent);
        if let Some(p) = self.arena.get_mut(parent) {
            p.children.push(child);
        }
        self.restyle(child);
        self.mark_dirty(parent);
        self.fire(child, &UiEvent::Adopted);
        true
    }

    /// Detach `child` from `parent`; the child survives as an orphan.
    pub fn disown(&mut self, parent: ElementId, child: ElementId) -> bool {
        let Some(p) = self.arena.get_mut(parent) else {
            return false;
        };
        let before = p.children.len();
        p.children.retain(|c| *c != child);
        if p.children.len() == before {
            return false;
        }
        if let Some(c) = self.arena.get_mut(child) {
            c.parent = None;
        }
        self.restyle(parent);
        self.mark_dirty(parent);
        true
    }

    /// Destroy an element: children first, then unlink from the parent.
    pub fn destroy(&mut self, id: ElementId) {
        if id == self.root {
            log::warn!("refusing to destroy the window element");
            return;
        }
        let Some(element) = self.arena.get(id) else {
            return;
        };
        let children = element.children.clone();
        for child in children {
            self.destroy(child);
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        if let Some(parent) = self.arena.get(id).and_then(|e| e.parent) {
            self.disown(parent, id);
        }
        self.arena.remove(id);
        self.needs_render = true;
    }

    fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = self.arena.get(id).and_then(|e| e.parent);
        while let Some(cid) = current {
            if cid == ancestor {
                return true;
            }
            current = self.arena.get(cid).and_then(|e| e.parent);
        }
        false
    }

    /// Whether the element is reachable from the window.
    pub fn is_attached(&self, id: ElementId) -> bool {
        id == self.root || self.is_ancestor(self.root, id)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// First element with `class` under `from`, depth-first.
    pub fn find_in(&self, from: ElementId, class: &str) -> Option<ElementId> {
        let element = self.arena.get(from)?;
        if element.class == class {
            return Some(from);
        }
        element
            .children
            .iter()
            .find_map(|&c| self.find_in(c, class))
    }

    pub fn find(&self, class: &str) -> Option<ElementId> {
        self.find_in(self.root, class)
    }

    pub fn find_all_in(&self, from: ElementId, class: &str) -> Vec<ElementId> {
        let mut out = Vec::new();
        self.collect_class(from, class, &mut out);
        out
    }

    fn collect_class(&self, id: ElementId, class: &str, out: &mut Vec<ElementId>) {
        if let Some(element) = self.arena.get(id) {
            if element.class == class {
                out.push(id);
            }
            for &child in &element.children {
                self.collect_class(child, class, out);
            }
        }
    }

    /// Visible children in paint order (stable by z-index).
    pub fn children_by_z(&self, id: ElementId) -> Vec<ElementId> {
        let Some(element) = self.arena.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<(ElementId, f64)> = element
            .children
            .iter()
            .filter_map(|&c| {
                let e = self.arena.get(c)?;
                (!e.hidden && !e.oob).then_some((c, e.style.z_index.value))
            })
            .collect();
        children.sort_by(|a, b| a.1.total_cmp(&b.1));
        children.into_iter().map(|(c, _)| c).collect()
    }

    // ------------------------------------------------------------------
    // Dirt
    // ------------------------------------------------------------------

    /// Mark an element and its ancestors as dirty.
    pub fn mark_dirty(&mut self, id: ElementId) {
        self.needs_render = true;
        let mut current = Some(id);
        while let Some(cid) = current {
            if let Some(element) = self.arena.get_mut(cid) {
                if element.dirty {
                    break;
                }
                element.dirty = true;
                current = element.parent;
            } else {
                break;
            }
        }
    }

    /// Queue a style recalculation for the element's subtree.
    pub fn restyle(&mut self, id: ElementId) {
        if let Some(element) = self.arena.get_mut(id) {
            element.restyle = true;
        }
        self.mark_dirty(id);
    }

    /// Images arrived; elements showing them may resize.
    pub fn images_loaded(&mut self, ids: &[u32]) {
        let hits: Vec<ElementId> = self
            .arena
            .iter()
            .filter(|(_, e)| matches!(e.kind, ElementKind::Image { image_id, .. } if ids.contains(&image_id)))
            .map(|(id, _)| id)
            .collect();
        for id in hits {
            self.mark_dirty(id);
        }
    }

    /// Returns true if anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        let was = self.needs_render;
        self.needs_render = false;
        for (_, element) in self.arena.iter_mut() {
            element.dirty = false;
        }
        was
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Apply a single update message.
    pub fn apply(&mut self, id: ElementId, update: Update) {
        let Some(element) = self.arena.get_mut(id) else {
            log::debug!("update for stale element {id:?}");
            return;
        };
        let mut restyle = false;
        let mut dirty = true;
        match update {
            Update::Value(value) => {
                if let ElementKind::Input {
                    composition,
                    cursor,
                    ..
                } = &mut element.kind
                {
                    *composition = value.chars().collect();
                    *cursor = composition.len();
                }
                element.value = value;
                restyle = element.kind.is_textual();
            }
            Update::X(n) => {
                element.style.x = n;
                restyle = true;
            }
            Update::Y(n) => {
                element.style.y = n;
                restyle = true;
            }
            Update::W(n) => {
                element.style.w = n;
                restyle = true;
            }
            Update::H(n) => {
                element.style.h = n;
                restyle = true;
            }
            Update::Dimensions { x, y, w, h } => {
                element.style.x = x;
                element.style.y = y;
                element.style.w = w;
                element.style.h = h;
                restyle = true;
            }
            Update::Scroll { left, top } => {
                element.style.scroll_left = left;
                element.style.scroll_top = top;
                restyle = true;
            }
            Update::ScrollLeft(n) => {
                element.style.scroll_left = n;
                restyle = true;
            }
            Update::ScrollTop(n) => {
                element.style.scroll_top = n;
                restyle = true;
            }
            Update::ZIndex(n) => element.style.z_index = n,
            Update::OutlineColor(c) => element.style.outline_color = c,
            Update::BackgroundColor(c) => element.style.background_color = c,
            Update::ForegroundColor(c) => element.style.foreground_color = c,
            Update::ImageId(new_id) => {
                if let ElementKind::Image { image_id, .. } = &mut element.kind {
                    *image_id = new_id;
                }
                restyle = element.style.resize.contains(Resize::TO_CONTENT);
            }
            Update::HideImage(hide) => {
                if let ElementKind::Image { hide_image, .. } = &mut element.kind {
                    *hide_image = hide;
                }
            }
            Update::ParseStyle(text) => {
                element.style.parse(&text);
                restyle = true;
            }
            Update::Focus => {
                self.focus(id);
                return;
            }
            Update::Hidden(hidden) => {
                element.hidden = hidden;
                if hidden && self.focused == Some(id) {
                    self.blur();
                }
                if let Some(parent) = self.arena.get(id).and_then(|e| e.parent) {
                    self.restyle(parent);
                }
                self.mark_dirty(id);
                return;
            }
            Update::Alpha(a) => element.style.alpha = Number::px(a),
            Update::ColorMod(c) => element.style.color_mod = c,
            Update::Grayscale(g) => {
                if let ElementKind::Image { grayscale, .. } = &mut element.kind {
                    *grayscale = g;
                }
            }
            Update::Dirt(d) => {
                element.dirty = d;
                dirty = d;
            }
        }
        if restyle {
            self.restyle(id);
        } else if dirty {
            self.mark_dirty(id);
        }
    }

    pub fn set_value(&mut self, id: ElementId, value: impl Into<String>) {
        self.apply(id, Update::Value(value.into()));
    }

    pub fn set_hidden(&mut self, id: ElementId, hidden: bool) {
        self.apply(id, Update::Hidden(hidden));
    }

    /// Resize the window element.
    pub fn resize(&mut self, width: f64, height: f64) {
        let root = self.root;
        if let Some(window) = self.arena.get_mut(root) {
            window.style.w = Number::px(width);
            window.style.h = Number::px(height);
        }
        self.restyle(root);
    }

    // ------------------------------------------------------------------
    // Focus and events
    // ------------------------------------------------------------------

    pub fn focus(&mut self, id: ElementId) {
        if self.focused == Some(id) || !self.contains(id) {
            return;
        }
        self.blur();
        if let Some(element) = self.arena.get_mut(id) {
            element.focused = true;
        }
        self.focused = Some(id);
        self.mark_dirty(id);
        self.fire(id, &UiEvent::Focus);
    }

    pub fn blur(&mut self) {
        let Some(prev) = self.focused.take() else {
            return;
        };
        if let Some(element) = self.arena.get_mut(prev) {
            element.focused = false;
        }
        self.mark_dirty(prev);
        self.fire(prev, &UiEvent::Blur);
    }

    /// Move focus among focusable siblings of the focused element.
    pub fn focus_next(&mut self, reverse: bool) {
        let candidates = match self.focused.and_then(|f| self.arena.get(f)?.parent) {
            Some(parent) => self.focusable_under(parent, false),
            None => self.focusable_under(self.root, true),
        };
        if candidates.is_empty() {
            return;
        }
        let current = self
            .focused
            .and_then(|f| candidates.iter().position(|c| *c == f));
        let next = match (current, reverse) {
            (None, false) => 0,
            (None, true) => candidates.len() - 1,
            (Some(i), false) => (i + 1) % candidates.len(),
            (Some(i), true) => (i + candidates.len() - 1) % candidates.len(),
        };
        self.focus(candidates[next]);
    }

    fn focusable_under(&self, id: ElementId, deep: bool) -> Vec<ElementId> {
        let mut out = Vec::new();
        if let Some(element) = self.arena.get(id) {
            for &child in &element.children {
                let Some(c) = self.arena.get(child) else {
                    continue;
                };
                if c.hidden {
                    continue;
                }
                if c.focusable {
                    out.push(child);
                }
                if deep {
                    out.extend(self.focusable_under(child, true));
                }
            }
        }
        out
    }

    /// Deliver `event` to the element's handler. Returns the handler's
    /// verdict, or true when it has none.
    pub fn fire(&mut self, id: ElementId, event: &UiEvent) -> bool {
        let kind = event.kind();
        let Some(mut handler) = self.arena.get_mut(id).and_then(|e| e.events.take(kind)) else {
            return true;
        };
        let result = handler(&mut EventContext { tree: self, id }, event);
        if let Some(element) = self.arena.get_mut(id) {
            element.events.restore(kind, handler);
        }
        result
    }

    /// Deliver `event` to every attached element, parents first.
    pub fn broadcast(&mut self, event: &UiEvent) {
        let mut order = Vec::new();
        self.collect_preorder(self.root, &mut order);
        for id in order {
            self.fire(id, event);
        }
    }

    fn collect_preorder(&self, id: ElementId, out: &mut Vec<ElementId>) {
        out.push(id);
        if let Some(element) = self.arena.get(id) {
            for &child in &element.children {
                self.collect_preorder(child, out);
            }
        }
    }

    // ------------------------------------------------------------------
    // Text input
    // ------------------------------------------------------------------

    /// Insert text at the cursor of an Input. Returns true if changed.
    pub fn input_insert(&mut self, id: ElementId, text: &str) -> bool {
        let Some(element) = self.arena.get_mut(id) else {
            return false;
        };
        let ElementKind::Input {
            composition,
            cursor,
            ..
        } = &mut element.kind
        else {
            return false;
        };
        let chars: Vec<char> = text.chars().filter(|c| !c.is_control()).collect();
        if chars.is_empty() {
            return false;
        }
        let at = (*cursor).min(composition.len());
        composition.splice(at..at, chars.iter().copied());
        *cursor = at + chars.len();
        element.value = composition.iter().collect();
        self.restyle(id);
        true
    }

    /// Editing keys on an Input. Returns true if the value changed.
    pub fn input_key(&mut self, id: ElementId, code: u32) -> bool {
        let Some(element) = self.arena.get_mut(id) else {
            return false;
        };
        let ElementKind::Input {
            composition,
            cursor,
            ..
        } = &mut element.kind
        else {
            return false;
        };
        let mut changed = false;
        match code {
            keys::BACKSPACE if *cursor > 0 => {
                *cursor -= 1;
                composition.remove(*cursor);
                changed = true;
            }
            keys::DELETE if *cursor < composition.len() => {
                composition.remove(*cursor);
                changed = true;
            }
            keys::LEFT => *cursor = cursor.saturating_sub(1),
            keys::RIGHT => *cursor = (*cursor + 1).min(composition.len()),
            keys::HOME => *cursor = 0,
            keys::END => *cursor = composition.len(),
            _ => return false,
        }
        if changed {
            element.value = composition.iter().collect();
            self.restyle(id);
        } else {
            self.mark_dirty(id);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Recompute every attached subtree whose style changed.
    pub fn layout(&mut self) {
        let pending: Vec<ElementId> = self
            .arena
            .iter()
            .filter(|(_, e)| e.restyle)
            .map(|(id, _)| id)
            .collect();
        for id in pending {
            let Some(element) = self.arena.get(id) else {
                continue;
            };
            // Already handled as part of an ancestor's subtree.
            if !element.restyle || !self.is_attached(id) {
                continue;
            }
            let start = self.layout_anchor(id);
            self.compute(start);
        }
    }

    /// Climb to the nearest ancestor whose size or flow depends on `id`.
    fn layout_anchor(&self, id: ElementId) -> ElementId {
        let mut current = id;
        while let Some(parent) = self.arena.get(current).and_then(|e| e.parent) {
            let Some(p) = self.arena.get(parent) else {
                break;
            };
            let flows = p.style.display.contains(Display::COLUMNS)
                || (p.kind.is_container() && p.style.resize.contains(Resize::TO_CONTENT));
            if !flows {
                break;
            }
            current = parent;
        }
        current
    }

    fn parent_frame(&self, id: ElementId) -> Option<ParentFrame> {
        let parent = self.arena.get(self.arena.get(id)?.parent?)?;
        Some(ParentFrame {
            w: parent.layout.w,
            h: parent.layout.h,
            ax: parent.layout.ax,
            ay: parent.layout.ay,
            sx: parent.layout.sx,
            sy: parent.layout.sy,
            sl: parent.layout.sl,
            st: parent.layout.st,
            container: parent.kind.is_container(),
            content_origin: parent.style.content_origin,
        })
    }

    /// Intrinsic size for `Resize ToContent` leaves.
    fn content_size(&mut self, id: ElementId) -> Option<(f64, f64)> {
        let element = self.arena.get(id)?;
        if !element.style.resize.contains(Resize::TO_CONTENT) {
            return None;
        }
        match &element.kind {
            k if k.is_textual() => {
                let text = element.display_text();
                Some(self.measurer.measure(&text))
            }
            ElementKind::Image { image_id, .. } => {
                let (w, h) = self.images.as_ref()?.image_size(*image_id)?;
                let sx = element.style.scale_x.value;
                let sy = element.style.scale_y.value;
                Some((w as f64 * sx, h as f64 * sy))
            }
            _ => None,
        }
    }

    fn compute(&mut self, id: ElementId) {
        let frame = self.parent_frame(id);
        let content = self.content_size(id);
        self.place(id, frame, content);
        self.compute_children(id);

        let resize_container = self.arena.get(id).is_some_and(|e| {
            e.kind.is_container() && e.style.resize.contains(Resize::TO_CONTENT)
        });
        if resize_container {
            let extent = self.child_extent(id);
            self.place(id, frame, Some(extent));
            self.compute_children(id);
        }

        if let Some(element) = self.arena.get_mut(id) {
            element.restyle = false;
            element.last_style = Some(element.style.clone());
        }
        self.mark_dirty(id);
    }

    fn compute_children(&mut self, id: ElementId) {
        let Some(element) = self.arena.get(id) else {
            return;
        };
        let children = element.children.clone();
        let columns = element.style.display.contains(Display::COLUMNS);
        for &child in &children {
            self.compute(child);
        }
        if columns {
            for child in self.reflow(id, &children) {
                self.compute(child);
            }
        }
    }

    /// Assign column-flow positions. Returns children whose position moved.
    fn reflow(&mut self, id: ElementId, children: &[ElementId]) -> Vec<ElementId> {
        let Some(element) = self.arena.get(id) else {
            return Vec::new();
        };
        let reverse = element.style.direction.contains(Direction::REVERSE);
        let top = element.layout.pt;
        let bottom = element.layout.h - element.layout.pb;

        let visible: Vec<ElementId> = children
            .iter()
            .copied()
            .filter(|&c| self.arena.get(c).is_some_and(|e| !e.hidden))
            .collect();
        let order: Box<dyn Iterator<Item = &ElementId>> = if reverse {
            Box::new(visible.iter().rev())
        } else {
            Box::new(visible.iter())
        };

        let mut offset = 0.0;
        let mut moved = Vec::new();
        for &child in order {
            let Some(c) = self.arena.get_mut(child) else {
                continue;
            };
            let span = c.layout.mt + c.layout.h + c.layout.mb;
            let y = if reverse {
                bottom - offset - span
            } else {
                top + offset
            };
            offset += span;
            if c.flow_y != Some(y) {
                c.flow_y = Some(y);
                moved.push(child);
            }
        }
        moved
    }

    fn child_extent(&self, id: ElementId) -> (f64, f64) {
        let Some(element) = self.arena.get(id) else {
            return (0.0, 0.0);
        };
        let mut w: f64 = 0.0;
        let mut h: f64 = 0.0;
        for &child in &element.children {
            if let Some(c) = self.arena.get(child)
                && !c.hidden
            {
                w = w.max(c.layout.ax + c.layout.w + c.layout.mr);
                h = h.max(c.layout.ay + c.layout.h + c.layout.mb);
            }
        }
        (w, h)
    }

    /// Resolve style against the parent and position the box.
    fn place(&mut self, id: ElementId, frame: Option<ParentFrame>, content: Option<(f64, f64)>) {
        let Some(element) = self.arena.get_mut(id) else {
            return;
        };
        let pw = frame.map(|f| f.w);
        let ph = frame.map(|f| f.h);
        let s = &element.style;

        let x = s.x.resolve(pw);
        let y = element.flow_y.unwrap_or_else(|| s.y.resolve(ph));
        let (mut w, mut h) = match content {
            Some((cw, ch)) => (cw, ch),
            None => (s.w.resolve(pw), s.h.resolve(ph)),
        };

        let min_w = s.min_w.resolve(pw);
        let min_h = s.min_h.resolve(ph);
        let max_w = s.max_w.resolve(pw);
        let max_h = s.max_h.resolve(ph);
        w = w.max(min_w);
        h = h.max(min_h);
        if max_w > 0.0 {
            w = w.min(max_w);
        }
        if max_h > 0.0 {
            h = h.min(max_h);
        }

        let pl = s.padding.left.resolve(pw);
        let pr = s.padding.right.resolve(pw);
        let pt = s.padding.top.resolve(ph);
        let pb = s.padding.bottom.resolve(ph);
        let ml = s.margin.left.resolve(pw);
        let mr = s.margin.right.resolve(pw);
        let mt = s.margin.top.resolve(ph);
        let mb = s.margin.bottom.resolve(ph);
        let sl = s.scroll_left.resolve(pw);
        let st = s.scroll_top.resolve(ph);

        // Content sizes already include the inner box.
        if content.is_none() || !element.kind.is_container() {
            w += pl + pr;
            h += pt + pb;
        }

        let (base_x, base_y, surface_x, surface_y) = match frame {
            None => (0.0, 0.0, 0.0, 0.0),
            Some(f) if f.container => {
                let mut ox = 0.0;
                let mut oy = 0.0;
                if f.content_origin.contains(Origin::CENTER_X) {
                    ox = f.w / 2.0;
                } else if f.content_origin.contains(Origin::RIGHT) {
                    ox = f.w;
                }
                if f.content_origin.contains(Origin::CENTER_Y) {
                    oy = f.h / 2.0;
                } else if f.content_origin.contains(Origin::BOTTOM) {
                    oy = f.h;
                }
                (ox - f.sl, oy - f.st, f.sx, f.sy)
            }
            Some(f) => (f.ax - f.sl, f.ay - f.st, f.sx - f.ax, f.sy - f.ay),
        };

        let mut ax = base_x + x;
        let mut ay = base_y + y;
        if s.origin.contains(Origin::CENTER_X) {
            ax -= w / 2.0;
        } else if s.origin.contains(Origin::RIGHT) {
            ax -= w + mr;
        } else {
            ax += ml;
        }
        if s.origin.contains(Origin::CENTER_Y) {
            ay -= h / 2.0;
        } else if s.origin.contains(Origin::BOTTOM) {
            ay -= h + mb;
        } else {
            ay += mt;
        }

        let sx = surface_x + ax;
        let sy = surface_y + ay;

        element.oob = match frame {
            Some(f) if f.w > 0.0 && f.h > 0.0 => {
                sx + w < f.sx - f.w
                    || sx > f.sx + 2.0 * f.w
                    || sy + h < f.sy - f.h
                    || sy > f.sy + 2.0 * f.h
            }
            _ => false,
        };

        element.layout = element::Layout {
            x,
            y,
            ax,
            ay,
            sx,
            sy,
            w,
            h,
            pl,
            pr,
            pt,
            pb,
            ml,
            mr,
            mt,
            mb,
            sl,
            st,
        };
    }

    // ------------------------------------------------------------------
    // Hit testing
    // ------------------------------------------------------------------

    pub fn screen_rect(&self, id: ElementId) -> Option<Rect> {
        let l = &self.arena.get(id)?.layout;
        Some(Rect::new(l.sx as f32, l.sy as f32, l.w as f32, l.h as f32))
    }

    fn child_clip(&self, id: ElementId, clip: Rect) -> Rect {
        match self.arena.get(id) {
            Some(e) if e.kind.is_container() => self
                .screen_rect(id)
                .map(|r| clip.intersect(&r))
                .unwrap_or(clip),
            _ => clip,
        }
    }

    fn window_clip(&self) -> Rect {
        self.screen_rect(self.root).unwrap_or_default()
    }

    /// Whether `(x, y)` lands on the element, honouring image alpha.
    fn hits(&self, id: ElementId, x: f64, y: f64, clip: Rect) -> bool {
        let Some(element) = self.arena.get(id) else {
            return false;
        };
        if element.hidden || element.oob || !clip.contains(x as f32, y as f32) {
            return false;
        }
        if !element.layout.contains(x, y) {
            return false;
        }
        if let ElementKind::Image {
            image_id,
            hide_image: false,
            ..
        } = element.kind
            && let Some(images) = &self.images
            && let Some((iw, ih)) = images.image_size(image_id)
            && element.layout.w > 0.0
            && element.layout.h > 0.0
        {
            let u = ((x - element.layout.sx) / element.layout.w * iw as f64) as u32;
            let v = ((y - element.layout.sy) / element.layout.h * ih as f64) as u32;
            return images
                .alpha_at(image_id, u.min(iw.saturating_sub(1)), v.min(ih.saturating_sub(1)))
                .is_none_or(|a| a > 0);
        }
        true
    }

    /// Hit elements ordered topmost first.
    pub fn hit_test_all(&self, x: f64, y: f64) -> Vec<ElementId> {
        let mut painted = Vec::new();
        let clip = self.window_clip();
        if self.hits(self.root, x, y, clip) {
            painted.push(self.root);
        }
        self.collect_hits(self.root, x, y, self.child_clip(self.root, clip), &mut painted);
        painted.reverse();
        painted
    }

    fn collect_hits(&self, id: ElementId, x: f64, y: f64, clip: Rect, out: &mut Vec<ElementId>) {
        for child in self.children_by_z(id) {
            if self.hits(child, x, y, clip) {
                out.push(child);
            }
            self.collect_hits(child, x, y, self.child_clip(child, clip), out);
        }
    }

    /// Topmost element under the point, if any besides the window.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<ElementId> {
        self.hit_test_all(x, y)
            .into_iter()
            .find(|id| *id != self.root)
    }

    /// Walk attached elements topmost sibling first, calling `visit` with
    /// whether the point hits. A hit visit returning false masks the lower
    /// siblings (they are visited as misses); children are always walked.
    pub fn pointer_walk(
        &mut self,
        x: f64,
        y: f64,
        visit: &mut dyn FnMut(&mut ElementTree, ElementId, bool) -> bool,
    ) {
        let root = self.root;
        let clip = self.window_clip();
        let hit = self.hits(root, x, y, clip);
        visit(self, root, hit);
        let child_clip = self.child_clip(root, clip);
        self.pointer_walk_children(root, x, y, child_clip, visit);
    }

    fn pointer_walk_children(
        &mut self,
        id: ElementId,
        x: f64,
        y: f64,
        clip: Rect,
        visit: &mut dyn FnMut(&mut ElementTree, ElementId, bool) -> bool,
    ) {
        let mut children = self.children_by_z(id);
        children.reverse();
        let mut masked = false;
        for child in children {
            if !self.contains(child) {
                continue;
            }
            let hit = !masked && self.hits(child, x, y, clip);
            let keep_going = visit(self, child, hit);
            if hit && !keep_going {
                masked = true;
            }
            let child_clip = self.child_clip(child, clip);
            self.pointer_walk_children(child, x, y, child_clip, visit);
        }
    }

    // ------------------------------------------------------------------
    // Draw
    // ------------------------------------------------------------------

    /// Walk the tree and emit draw commands in painter order.
    pub fn draw(&mut self, list: &mut DrawList) {
        let root = self.root;
        let clip = self.window_clip();
        self.draw_node(root, clip, 1.0, list);
    }

    fn draw_node(&mut self, id: ElementId, clip: Rect, alpha: f64, list: &mut DrawList) {
        let Some(element) = self.arena.get(id) else {
            return;
        };
        if element.hidden || element.oob {
            return;
        }
        let alpha = alpha * element.style.alpha.value.clamp(0.0, 1.0);
        let rect = Rect::new(
            element.layout.sx as f32,
            element.layout.sy as f32,
            element.layout.w as f32,
            element.layout.h as f32,
        );
        let s = &element.style;
        let fg = s.foreground_color.with_alpha(alpha).to_f32();
        let bg = s.background_color.with_alpha(alpha).to_f32();
        let outline = s.outline_color.with_alpha(alpha).to_f32();
        let has_outline = s.outline_color.a > 0;
        let text_outline = has_outline.then_some(outline);
        let text_x = (element.layout.sx + element.layout.pl) as f32;
        let text_y = (element.layout.sy + element.layout.pt) as f32;

        match &element.kind {
            ElementKind::Container | ElementKind::Window => {
                if s.background_color.a > 0 || has_outline {
                    list.push(panel(rect, bg, outline, has_outline, false), clip);
                }
            }
            ElementKind::Text => {
                if s.background_color.a > 0 || has_outline {
                    list.push(panel(rect, bg, outline, false, false), clip);
                }
                list.push(
                    DrawCommand::Text(TextCommand {
                        text: element.display_text(),
                        x: text_x,
                        y: text_y,
                        color: fg,
                        outline_color: text_outline,
                    }),
                    clip,
                );
            }
            ElementKind::Input { composition, cursor, password } => {
                list.push(panel(rect, bg, outline, has_outline, false), clip);
                let text = element.display_text();
                list.push(
                    DrawCommand::Text(TextCommand {
                        text: text.clone(),
                        x: text_x,
                        y: text_y,
                        color: fg,
                        outline_color: None,
                    }),
                    clip,
                );
                if element.focused {
                    let before: String = if *password {
                        "*".repeat(*cursor)
                    } else {
                        composition.iter().take(*cursor).collect()
                    };
                    let (cx, ch) = if before.is_empty() {
                        (0.0, self.measurer.measure(" ").1)
                    } else {
                        self.measurer.measure(&before)
                    };
                    list.push(
                        panel(
                            Rect::new(
                                text_x + cx as f32,
                                text_y,
                                CURSOR_WIDTH as f32,
                                ch as f32,
                            ),
                            fg,
                            fg,
                            false,
                            false,
                        ),
                        clip,
                    );
                }
            }
            ElementKind::Button => {
                let strip_h = (element.layout.h * BUTTON_STRIP) as f32;
                let dark = s.background_color.darken(0.35).with_alpha(alpha).to_f32();
                let (base, strip, strip_y) = if element.held {
                    (dark, bg, rect.y)
                } else {
                    (bg, dark, rect.y + rect.height - strip_h)
                };
                list.push(panel(rect, base, outline, has_outline, false), clip);
                list.push(
                    panel(
                        Rect::new(rect.x, strip_y, rect.width, strip_h),
                        strip,
                        strip,
                        false,
                        false,
                    ),
                    clip,
                );
                let text = element.display_text();
                let (tw, th) = self.measurer.measure(&text);
                let nudge = if element.held { strip_h / 2.0 } else { 0.0 };
                list.push(
                    DrawCommand::Text(TextCommand {
                        text,
                        x: rect.x + (rect.width - tw as f32) / 2.0,
                        y: rect.y + (rect.height - strip_h - th as f32) / 2.0 + nudge,
                        color: fg,
                        outline_color: text_outline,
                    }),
                    clip,
                );
            }
            ElementKind::Image {
                image_id,
                grayscale,
                hide_image,
            } => {
                if !hide_image {
                    if let Some(images) = &self.images
                        && images.image_size(*image_id).is_none()
                    {
                        images.request(*image_id);
                    }
                    list.push(
                        DrawCommand::Image(ImageCommand {
                            image_id: *image_id,
                            rect,
                            grayscale: *grayscale,
                            tint: s.color_mod.with_alpha(alpha).to_f32(),
                        }),
                        clip,
                    );
                }
                if has_outline {
                    list.push(panel(rect, [0.0; 4], outline, true, false), clip);
                }
            }
            ElementKind::Primitive { shape } => {
                let ellipse = *shape == Shape::Ellipse;
                list.push(panel(rect, bg, outline, has_outline, ellipse), clip);
            }
            ElementKind::Map => {}
        }

        let child_clip = self.child_clip(id, clip);
        for child in self.children_by_z(id) {
            self.draw_node(child, child_clip, alpha, list);
        }
    }
}

fn panel(rect: Rect, bg: [f32; 4], border: [f32; 4], outlined: bool, ellipse: bool) -> DrawCommand {
    DrawCommand::Panel(PanelCommand {
        rect,
        bg_color: bg,
        border_color: border,
        border_width: if outlined { 1.0 } else { 0.0 },
        ellipse,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
