use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use super::draw::DrawList;
use super::element::{ElementSpec, MouseButton, UiEvent};
use super::keys::{self, KeyEvent, Modifiers};
use super::message::{Batch, ElementRef, Handle, QUEUE_CAPACITY, UiSender};
use super::{ElementId, ElementKind, ElementTree, ImageSource, TextMeasurer};

/// Delay before a press turns into a hold.
pub const HOLD_DELAY: Duration = Duration::from_millis(200);

/// The UI instance: owns the element tree, routes input, drains batches.
/// Lives on the UI thread only.
pub struct Ui {
    pub tree: ElementTree,
    rx: Receiver<Batch>,
    sender: UiSender,
    handles: HashMap<Handle, ElementId>,
    /// Elements currently under the pointer.
    hovered: HashSet<ElementId>,
    /// Left-button drag latch.
    held_element: Option<ElementId>,
    mousedown: [Vec<ElementId>; 3],
    to_be_held: [Vec<ElementId>; 3],
    held: [Vec<ElementId>; 3],
    hold_deadline: [Option<Instant>; 3],
    /// Last known cursor position (window coords).
    pub cursor: (f64, f64),
    draw_list: DrawList,
}

impl Ui {
    pub fn new(width: f64, height: f64, measurer: Box<dyn TextMeasurer>) -> Self {
        let (sender, rx) = UiSender::new(QUEUE_CAPACITY);
        Self {
            tree: ElementTree::new(width, height, measurer),
            rx,
            sender,
            handles: HashMap::new(),
            hovered: HashSet::new(),
            held_element: None,
            mousedown: Default::default(),
            to_be_held: Default::default(),
            held: Default::default(),
            hold_deadline: [None; 3],
            cursor: (0.0, 0.0),
            draw_list: DrawList::new(),
        }
    }

    pub fn set_image_source(&mut self, images: Arc<dyn ImageSource>) {
        self.tree.set_image_source(images);
    }

    /// Producer handle for workers.
    pub fn sender(&self) -> UiSender {
        self.sender.clone()
    }

    pub fn root(&self) -> ElementId {
        self.tree.root()
    }

    pub fn held_element(&self) -> Option<ElementId> {
        self.held_element
    }

    pub fn is_hovered(&self, id: ElementId) -> bool {
        self.hovered.contains(&id)
    }

    /// Resolve a handle or id to a live element.
    pub fn resolve(&self, target: ElementRef) -> Option<ElementId> {
        let id = match target {
            ElementRef::Id(id) => id,
            ElementRef::Handle(h) => *self.handles.get(&h)?,
        };
        self.tree.contains(id).then_some(id)
    }

    /// Create an element on the UI thread.
    pub fn spawn(&mut self, parent: ElementId, spec: ElementSpec) -> ElementId {
        self.tree.spawn(parent, spec)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Drain queued batches, promote holds, and lay out. Returns true if
    /// the tree needs to be redrawn.
    pub fn frame(&mut self, now: Instant) -> bool {
        self.drain();
        self.promote_holds(now);
        self.prune();
        self.tree.layout();
        self.tree.needs_render()
    }

    /// Apply every queued batch message in arrival order.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(batch) = self.rx.try_recv() {
            self.apply_batch(batch);
            applied += 1;
        }
        applied
    }

    fn apply_batch(&mut self, batch: Batch) {
        match batch {
            Batch::Spawn {
                handle,
                parent,
                spec,
            } => {
                let id = self.tree.create(spec);
                self.handles.insert(handle, id);
                if let Some(parent) = parent {
                    match self.resolve(parent) {
                        Some(p) => {
                            self.tree.adopt(p, id);
                        }
                        None => log::warn!("spawn under missing parent {parent:?}"),
                    }
                }
            }
            Batch::Adopt { parent, child } => {
                if let (Some(p), Some(c)) = (self.resolve(parent), self.resolve(child)) {
                    self.tree.adopt(p, c);
                }
            }
            Batch::Disown { parent, child } => {
                if let (Some(p), Some(c)) = (self.resolve(parent), self.resolve(child)) {
                    self.tree.disown(p, c);
                }
            }
            Batch::Destroy(target) => {
                if let Some(id) = self.resolve(target) {
                    self.tree.destroy(id);
                }
                if let ElementRef::Handle(h) = target {
                    self.handles.remove(&h);
                }
            }
            Batch::Update(target, update) => match self.resolve(target) {
                Some(id) => self.tree.apply(id, update),
                None => log::debug!("update for missing element {target:?}"),
            },
        }
    }

    /// Forget ids that no longer exist.
    fn prune(&mut self) {
        let tree = &self.tree;
        self.hovered.retain(|id| tree.contains(*id));
        if self.held_element.is_some_and(|id| !tree.contains(id)) {
            self.held_element = None;
        }
        for list in self
            .mousedown
            .iter_mut()
            .chain(self.to_be_held.iter_mut())
            .chain(self.held.iter_mut())
        {
            list.retain(|id| tree.contains(*id));
        }
        self.handles.retain(|_, id| tree.contains(*id));
    }

    /// Fire Hold once, on the first frame past the deadline.
    fn promote_holds(&mut self, now: Instant) {
        let (x, y) = self.cursor;
        for button in MouseButton::ALL {
            let b = button.index();
            let Some(deadline) = self.hold_deadline[b] else {
                continue;
            };
            if now < deadline {
                continue;
            }
            self.hold_deadline[b] = None;
            let promoted = std::mem::take(&mut self.to_be_held[b]);
            for id in &promoted {
                self.tree.fire(*id, &UiEvent::Hold { button, x, y });
            }
            self.held[b] = promoted;
        }
    }

    /// Lay out if needed and emit the draw list.
    pub fn render(&mut self) -> &DrawList {
        self.tree.layout();
        self.tree.take_dirty();
        self.draw_list.clear();
        self.tree.draw(&mut self.draw_list);
        &self.draw_list
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Pointer motion: MouseIn on entry, MouseMove inside, MouseOut on exit.
    pub fn handle_mouse_move(&mut self, x: f64, y: f64) {
        self.cursor = (x, y);
        let hovered = &mut self.hovered;
        self.tree.pointer_walk(x, y, &mut |tree, id, hit| {
            if hit {
                if hovered.insert(id) {
                    tree.fire(id, &UiEvent::MouseIn { x, y })
                } else {
                    tree.fire(id, &UiEvent::MouseMove { x, y })
                }
            } else {
                if hovered.remove(&id) {
                    tree.fire(id, &UiEvent::MouseOut { x, y });
                }
                true
            }
        });
    }

    /// Mouse button press or release. Returns true if a non-window element
    /// was hit.
    pub fn handle_mouse_button(
        &mut self,
        button: MouseButton,
        pressed: bool,
        x: f64,
        y: f64,
        now: Instant,
    ) -> bool {
        self.cursor = (x, y);
        let b = button.index();
        let root = self.tree.root();

        if pressed {
            let hits = self.tree.hit_test_all(x, y);
            match hits
                .iter()
                .copied()
                .find(|id| self.tree.get(*id).is_some_and(|e| e.focusable))
            {
                Some(target) => self.tree.focus(target),
                None => self.tree.blur(),
            }
            if button == MouseButton::Left
                && let Some(target) = hits
                    .iter()
                    .copied()
                    .find(|id| self.tree.get(*id).is_some_and(|e| e.holdable))
            {
                self.latch(target);
            }

            self.tree.pointer_walk(x, y, &mut |tree, id, hit| {
                !hit || tree.fire(id, &UiEvent::MouseButtonDown { button, x, y })
            });

            self.mousedown[b] = hits.clone();
            self.to_be_held[b] = hits.clone();
            self.hold_deadline[b] = Some(now + HOLD_DELAY);
            return hits.iter().any(|id| *id != root);
        }

        if button == MouseButton::Left {
            self.release_latch();
        }

        self.tree.pointer_walk(x, y, &mut |tree, id, hit| {
            !hit || tree.fire(id, &UiEvent::MouseButtonUp { button, x, y })
        });

        // Pressed goes to elements hit at both ends, highest z first.
        let hits_now = self.tree.hit_test_all(x, y);
        let mut pressed_on: Vec<ElementId> = std::mem::take(&mut self.mousedown[b])
            .into_iter()
            .filter(|id| hits_now.contains(id))
            .collect();
        pressed_on.sort_by(|a, c| {
            let za = self.z_of(*a);
            let zc = self.z_of(*c);
            zc.total_cmp(&za)
        });
        for id in &pressed_on {
            if !self.tree.fire(*id, &UiEvent::Pressed { button, x, y }) {
                break;
            }
        }

        for id in std::mem::take(&mut self.held[b]) {
            self.tree.fire(id, &UiEvent::Unhold { button, x, y });
        }
        self.to_be_held[b].clear();
        self.hold_deadline[b] = None;

        hits_now.iter().any(|id| *id != root)
    }

    fn z_of(&self, id: ElementId) -> f64 {
        self.tree.get(id).map_or(0.0, |e| e.style.z_index.value)
    }

    fn latch(&mut self, id: ElementId) {
        self.release_latch();
        if let Some(e) = self.tree.get_mut(id) {
            e.held = true;
        }
        self.tree.mark_dirty(id);
        self.held_element = Some(id);
    }

    fn release_latch(&mut self) {
        if let Some(prev) = self.held_element.take() {
            if let Some(e) = self.tree.get_mut(prev) {
                e.held = false;
            }
            self.tree.mark_dirty(prev);
        }
    }

    /// Keyboard routing. Returns true if the UI consumed the event.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.pressed {
            match key.code {
                keys::ESCAPE if self.tree.focused().is_some() => {
                    self.tree.blur();
                    return true;
                }
                keys::TAB => {
                    self.tree
                        .focus_next(key.modifiers.contains(Modifiers::SHIFT));
                    return true;
                }
                _ => {}
            }
        }

        let Some(focused) = self.tree.focused() else {
            return false;
        };
        if key.pressed {
            let is_input = self
                .tree
                .get(focused)
                .is_some_and(|e| matches!(e.kind, ElementKind::Input { .. }));
            if is_input && self.tree.input_key(focused, key.code) {
                let value = self.tree.value(focused).unwrap_or_default().to_string();
                self.tree.fire(focused, &UiEvent::Change(value));
            }
            self.tree.fire(
                focused,
                &UiEvent::KeyDown {
                    code: key.code,
                    modifiers: key.modifiers,
                    repeat: key.repeat,
                },
            );
        } else {
            self.tree.fire(
                focused,
                &UiEvent::KeyUp {
                    code: key.code,
                    modifiers: key.modifiers,
                },
            );
        }
        true
    }

    /// Committed text goes to the focused element only.
    pub fn handle_text_input(&mut self, text: &str) -> bool {
        let Some(focused) = self.tree.focused() else {
            return false;
        };
        if self.tree.input_insert(focused, text) {
            let value = self.tree.value(focused).unwrap_or_default().to_string();
            self.tree.fire(focused, &UiEvent::Change(value));
        }
        self.tree
            .fire(focused, &UiEvent::TextInput(text.to_string()));
        true
    }

    /// Uncommitted IME composition.
    pub fn handle_text_edit(&mut self, text: &str, start: i32, length: i32) -> bool {
        let Some(focused) = self.tree.focused() else {
            return false;
        };
        self.tree.fire(
            focused,
            &UiEvent::TextEdit {
                text: text.to_string(),
                start,
                length,
            },
        );
        true
    }

    pub fn handle_resize(&mut self, w: f64, h: f64) {
        self.tree.resize(w, h);
        self.tree.layout();
        self.tree.broadcast(&UiEvent::WindowResized { w, h });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::element::EventKind;
    use crate::ui::message::Update;
    use crate::ui::style::Number;
    use crate::ui::MonoMeasurer;
    use std::sync::Mutex;

    fn ui() -> Ui {
        Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()))
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        name: &'static str,
        result: bool,
    ) -> impl FnMut(&mut crate::ui::EventContext<'_>, &UiEvent) -> bool + Send + 'static {
        let log = log.clone();
        move |_, ev| {
            if let Ok(mut l) = log.lock() {
                l.push(format!("{name}:{:?}", ev.kind()));
            }
            result
        }
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    #[test]
    fn batches_apply_in_order() {
        let mut ui = ui();
        let tx = ui.sender();
        let root = ui.root();
        let h = tx.spawn(
            Some(root.into()),
            ElementSpec::new(ElementKind::Text).style("W 10\nH 10"),
        );
        tx.update(h, Update::X(Number::px(1.0)));
        tx.update(h, Update::X(Number::px(9.0)));
        tx.update(h, Update::Value("hello".into()));
        ui.frame(Instant::now());

        let id = ui.resolve(h.into()).expect("spawned");
        let e = ui.tree.get(id).expect("element");
        assert_eq!(e.layout.x, 9.0);
        assert_eq!(e.value, "hello");

        tx.destroy(h);
        ui.frame(Instant::now());
        assert!(ui.resolve(h.into()).is_none());
    }

    #[test]
    fn hover_in_move_out() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Container)
                .style("W 50\nH 50")
                .on(EventKind::MouseIn, recorder(&events, "a", true))
                .on(EventKind::MouseMove, recorder(&events, "a", true))
                .on(EventKind::MouseOut, recorder(&events, "a", true)),
        );
        ui.frame(Instant::now());
        ui.handle_mouse_move(10.0, 10.0);
        ui.handle_mouse_move(11.0, 10.0);
        ui.handle_mouse_move(100.0, 100.0);
        assert_eq!(
            entries(&events),
            vec!["a:MouseIn", "a:MouseMove", "a:MouseOut"]
        );
    }

    #[test]
    fn false_handler_masks_lower_siblings() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Container)
                .style("W 50\nH 50\nZIndex 1")
                .on(EventKind::MouseIn, recorder(&events, "low", true)),
        );
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Container)
                .style("W 50\nH 50\nZIndex 2")
                .on(EventKind::MouseIn, recorder(&events, "high", false)),
        );
        ui.frame(Instant::now());
        ui.handle_mouse_move(10.0, 10.0);
        assert_eq!(entries(&events), vec!["high:MouseIn"]);
    }

    #[test]
    fn pressed_requires_release_hit_and_respects_z() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Button)
                .style("W 50\nH 50\nZIndex 1")
                .on(EventKind::Pressed, recorder(&events, "low", true)),
        );
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Button)
                .style("W 20\nH 20\nZIndex 2")
                .on(EventKind::Pressed, recorder(&events, "high", true)),
        );
        ui.frame(Instant::now());
        let now = Instant::now();
        ui.handle_mouse_button(MouseButton::Left, true, 10.0, 10.0, now);
        ui.handle_mouse_button(MouseButton::Left, false, 10.0, 10.0, now);
        assert_eq!(entries(&events), vec!["high:Pressed", "low:Pressed"]);

        // Release outside the small button.
        ui.handle_mouse_button(MouseButton::Left, true, 10.0, 10.0, now);
        ui.handle_mouse_button(MouseButton::Left, false, 40.0, 40.0, now);
        assert_eq!(entries(&events).len(), 3);
        assert_eq!(entries(&events)[2], "low:Pressed");
    }

    #[test]
    fn pressed_stops_at_false() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Button)
                .style("W 50\nH 50\nZIndex 1")
                .on(EventKind::Pressed, recorder(&events, "low", true)),
        );
        ui.spawn(
            root,
            ElementSpec::new(ElementKind::Button)
                .style("W 50\nH 50\nZIndex 2")
                .on(EventKind::Pressed, recorder(&events, "high", false)),
        );
        ui.frame(Instant::now());
        let now = Instant::now();
        ui.handle_mouse_button(MouseButton::Left, true, 5.0, 5.0, now);
        ui.handle_mouse_button(MouseButton::Left, false, 5.0, 5.0, now);
        assert_eq!(entries(&events), vec!["high:Pressed"]);
    }

    #[test]
    fn hold_promotes_once_after_deadline() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        let button = ui.spawn(
            root,
            ElementSpec::new(ElementKind::Button)
                .style("W 50\nH 50")
                .on(EventKind::Hold, recorder(&events, "b", true))
                .on(EventKind::Unhold, recorder(&events, "b", true)),
        );
        let t0 = Instant::now();
        ui.frame(t0);
        ui.handle_mouse_button(MouseButton::Left, true, 5.0, 5.0, t0);
        assert_eq!(ui.held_element(), Some(button));
        assert!(ui.tree.get(button).is_some_and(|e| e.held));

        ui.frame(t0 + Duration::from_millis(100));
        assert!(entries(&events).is_empty());
        ui.frame(t0 + Duration::from_millis(201));
        ui.frame(t0 + Duration::from_millis(400));
        assert_eq!(entries(&events), vec!["b:Hold"]);

        ui.handle_mouse_button(MouseButton::Left, false, 5.0, 5.0, t0);
        assert_eq!(entries(&events), vec!["b:Hold", "b:Unhold"]);
        assert_eq!(ui.held_element(), None);
    }

    #[test]
    fn click_focuses_and_escape_blurs() {
        let mut ui = ui();
        let root = ui.root();
        let input = ui.spawn(
            root,
            ElementSpec::new(ElementKind::input()).style("W 100\nH 20"),
        );
        ui.frame(Instant::now());
        ui.handle_mouse_button(MouseButton::Left, true, 5.0, 5.0, Instant::now());
        assert_eq!(ui.tree.focused(), Some(input));
        assert!(ui.handle_text_input("hi"));
        assert_eq!(ui.tree.value(input), Some("hi"));
        assert!(ui.handle_key(KeyEvent::press(keys::ESCAPE)));
        assert_eq!(ui.tree.focused(), None);
        assert!(!ui.handle_key(KeyEvent::press(keys::ESCAPE)));
        assert!(!ui.handle_text_input("ignored"));
    }

    #[test]
    fn tab_cycles_between_inputs() {
        let mut ui = ui();
        let root = ui.root();
        let a = ui.spawn(root, ElementSpec::new(ElementKind::input()));
        let b = ui.spawn(root, ElementSpec::new(ElementKind::input()));
        ui.handle_key(KeyEvent::press(keys::TAB));
        assert_eq!(ui.tree.focused(), Some(a));
        ui.handle_key(KeyEvent::press(keys::TAB));
        assert_eq!(ui.tree.focused(), Some(b));
        ui.handle_key(KeyEvent::press(keys::TAB).with_modifiers(Modifiers::SHIFT));
        assert_eq!(ui.tree.focused(), Some(a));
    }

    #[test]
    fn resize_broadcasts() {
        let mut ui = ui();
        let events = log();
        let root = ui.root();
        let c = ui.spawn(
            root,
            ElementSpec::new(ElementKind::Container)
                .style("W 50%")
                .on(EventKind::WindowResized, recorder(&events, "c", true)),
        );
        ui.handle_resize(400.0, 300.0);
        assert_eq!(entries(&events), vec!["c:WindowResized"]);
        assert_eq!(ui.tree.get(c).expect("c").layout.w, 200.0);
    }
}
