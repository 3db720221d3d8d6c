//! World-to-screen glue: keeps one image element per map object (plus its
//! shadow) in sync with the world, and owns floating map messages.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::data::DataManager;
use crate::net::protocol::{AnimationsConfig, ObjectType, Point};
use crate::ui::animation::{Animator, Easing};
use crate::ui::element::{ElementKind, ElementSpec, EventKind, Events, MouseButton, Shape, UiEvent};
use crate::ui::style::{Number, Rgba};
use crate::ui::{ElementId, ElementTree, Update};
use crate::world::{Object, World};

/// Pixels added to every projected coordinate so the map never starts flush
/// against the container edge.
pub const MARGIN: f64 = 100.0;
pub const MESSAGE_Z: i64 = 999_999;
pub const FADED_ALPHA: f64 = 0.2;
const FADE_TIME: Duration = Duration::from_millis(250);
/// Map messages fade out over the end of their lifetime.
const MESSAGE_FADE: Duration = Duration::from_millis(500);
const SHADOW: Rgba = Rgba::new(0, 0, 0, 96);

/// What a click on a map object asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapInput {
    Inspect(u32),
    Interact(u32),
}

/// Screen placement of a world cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPos {
    pub px: f64,
    pub py: f64,
    pub z: i64,
}

/// The projection from `(y, x, z)` cells to container pixels.
#[derive(Debug, Clone)]
pub struct Projection {
    pub tile_width: f64,
    pub tile_height: f64,
    pub y_step: Point,
    pub adjustments: std::collections::BTreeMap<ObjectType, Point>,
    pub height: u32,
    pub width: u32,
    pub depth: u32,
    pub scale: f64,
}

impl Projection {
    pub fn new(config: &AnimationsConfig, height: u32, width: u32, depth: u32, scale: f64) -> Self {
        Self {
            tile_width: config.tile_width as f64,
            tile_height: config.tile_height as f64,
            y_step: config.y_step,
            adjustments: config.adjustments.clone(),
            height,
            width,
            depth,
            scale,
        }
    }

    /// `z·H·W + D·y − x + index`, widened so large maps cannot overflow.
    pub fn z_index(&self, y: u32, x: u32, z: u32, index: usize) -> i64 {
        let (h, w, d) = (self.height as i64, self.width as i64, self.depth as i64);
        z as i64 * h * w + d * y as i64 - x as i64 + index as i64
    }

    /// Project a cell, with the per-type adjustment and the frame offset.
    pub fn project(
        &self,
        y: u32,
        x: u32,
        z: u32,
        kind: ObjectType,
        frame: Point,
        index: usize,
    ) -> ScreenPos {
        let origin_x = y as f64 * self.y_step.x as f64 + x as f64 * self.tile_width;
        let origin_y = self.height as f64 * -(self.y_step.y as f64)
            + y as f64 * self.y_step.y as f64
            + z as f64 * self.tile_height;
        let adjust = self.adjustments.get(&kind).copied().unwrap_or_default();
        ScreenPos {
            px: (origin_x + adjust.x as f64 + frame.x as f64) * self.scale + MARGIN,
            py: (origin_y + adjust.y as f64 + frame.y as f64) * self.scale + MARGIN,
            z: self.z_index(y, x, z, index),
        }
    }

    /// Container scroll that centers an object of `h × w` cells at `pos`.
    pub fn center_on(&self, pos: ScreenPos, h: u8, w: u8, view_w: f64, view_h: f64) -> (f64, f64) {
        let (h, w) = (h as f64, w as f64);
        let left = pos.px + w * self.tile_width * self.scale / 2.0 - view_w / 2.0;
        let top = pos.py + (h * self.y_step.y as f64 + h * self.tile_height) * self.scale / 2.0
            - view_h / 2.0;
        (left, top)
    }
}

/// Advance an object's frame clock by `dt`. Zero-length frames and
/// single-frame faces never advance.
pub fn advance_frame(o: &mut Object, frame_times: &[u32], dt: Duration) {
    if frame_times.len() < 2 {
        o.frame_elapsed = Duration::ZERO;
        return;
    }
    o.frame_index %= frame_times.len();
    o.frame_elapsed += dt;
    loop {
        let time = Duration::from_millis(frame_times[o.frame_index] as u64);
        if time.is_zero() {
            o.frame_elapsed = Duration::ZERO;
            return;
        }
        if o.frame_elapsed < time {
            return;
        }
        o.frame_elapsed -= time;
        o.frame_index = (o.frame_index + 1) % frame_times.len();
        o.changed = true;
    }
}

/// Seconds a map message stays up: `max(2, len / 6)`, where `len` is the
/// UTF-8 byte length, so non-ASCII text lingers a little longer.
pub fn message_ttl(body: &str) -> Duration {
    Duration::from_secs((body.len() as u64 / 6).max(2))
}

/// Share of the hue colour mixed into a lit object.
const HUE_WEIGHT: f64 = 0.25;

/// Colour modulation for an object standing in `brightness` and `hue`
/// light. Hue is in degrees; zero leaves the colour alone.
pub fn light_tint(brightness: f64, hue: f64) -> Rgba {
    let h = hue.rem_euclid(360.0);
    let (r, g, b) = if h == 0.0 {
        (1.0, 1.0, 1.0)
    } else {
        let mix = |c: f64| 1.0 - HUE_WEIGHT + HUE_WEIGHT * c;
        let (r, g, b) = hue_rgb(h);
        (mix(r), mix(g), mix(b))
    };
    let v = brightness.clamp(0.0, 1.0);
    let channel = |c: f64| (c * v * 255.0).round() as u8;
    Rgba::new(channel(r), channel(g), channel(b), 255)
}

/// Fully saturated colour for a hue in `[0, 360)`.
fn hue_rgb(h: f64) -> (f64, f64, f64) {
    let x = 1.0 - ((h / 60.0) % 2.0 - 1.0).abs();
    match (h / 60.0) as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    }
}

/// Where a floating message hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Cell { y: u32, x: u32, z: u32 },
    Object(u32),
}

#[derive(Debug)]
struct MapMessage {
    element: ElementId,
    anchor: Anchor,
    expires: Instant,
}

/// Last geometry pushed to an object's elements, to avoid redundant updates.
#[derive(Debug, Default, Clone, PartialEq)]
struct Placed {
    image_id: u32,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    z: i64,
    hidden: bool,
}

#[derive(Debug)]
struct ObjectView {
    image: ElementId,
    shadow: Option<ElementId>,
    placed: Placed,
    shadow_placed: Placed,
    tint: Option<Rgba>,
}

/// UI-thread owner of the map container's children.
pub struct MapRenderer {
    data: Arc<DataManager>,
    scale: f64,
    container: Option<ElementId>,
    views: HashMap<u32, ObjectView>,
    messages: Vec<MapMessage>,
    fades: Animator<u32>,
    message_fades: Animator<ElementId>,
    input: Sender<MapInput>,
    last: Option<Instant>,
    scroll: (f64, f64),
    pub message_style: String,
}

impl MapRenderer {
    pub fn new(data: Arc<DataManager>, scale: f64, input: Sender<MapInput>) -> Self {
        Self {
            data,
            scale,
            container: None,
            views: HashMap::new(),
            messages: Vec::new(),
            fades: Animator::new(),
            message_fades: Animator::new(),
            input,
            last: None,
            scroll: (f64::NAN, f64::NAN),
            message_style: String::new(),
        }
    }

    /// Attach to the map container. Everything the renderer creates lives
    /// under it.
    pub fn attach(&mut self, container: ElementId) {
        self.container = Some(container);
    }

    pub fn container(&self) -> Option<ElementId> {
        self.container
    }

    pub fn element_for(&self, object_id: u32) -> Option<ElementId> {
        self.views.get(&object_id).map(|v| v.image)
    }

    pub fn shadow_for(&self, object_id: u32) -> Option<ElementId> {
        self.views.get(&object_id).and_then(|v| v.shadow)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn projection(&self, world: &World) -> Projection {
        let features = self.data.features();
        Projection::new(
            &features.animations,
            world.map.height(),
            world.map.width(),
            world.map.depth(),
            self.scale,
        )
    }

    /// Forget every element, e.g. when the map changes.
    pub fn clear(&mut self, tree: &mut ElementTree) {
        for (_, view) in self.views.drain() {
            tree.destroy(view.image);
            if let Some(s) = view.shadow {
                tree.destroy(s);
            }
        }
        for m in self.messages.drain(..) {
            tree.destroy(m.element);
        }
        self.scroll = (f64::NAN, f64::NAN);
    }

    /// Bring the map container in line with the world. Call once per frame.
    pub fn update(&mut self, tree: &mut ElementTree, world: &mut World, now: Instant) {
        let dt = self.last.map_or(Duration::ZERO, |l| now.saturating_duration_since(l));
        self.last = Some(now);
        let Some(container) = self.container.filter(|c| tree.contains(*c)) else {
            return;
        };
        let projection = self.projection(world);

        for id in world.take_deleted() {
            self.drop_view(tree, id);
        }

        let ids: Vec<u32> = world.objects().map(|o| o.id).collect();
        for id in ids {
            let Some(mut o) = world.object(id).cloned() else {
                continue;
            };
            self.sync_object(tree, container, world, &projection, &mut o, dt, now);
            let (brightness, hue) = world.map.light_at(o.y, o.x, o.z);
            self.light_object(tree, id, light_tint(brightness, hue));
            o.clear_changes();
            if let Some(slot) = world.object_mut(id) {
                *slot = o;
            }
        }

        for id in self.fades.active(now).into_iter().chain(self.finished_fades(now)) {
            if let (Some(v), Some(view)) = (self.fades.get(id, now), self.views.get(&id)) {
                tree.apply(view.image, Update::Alpha(v));
            }
        }
        self.fades.gc(now);

        self.update_messages(tree, world, &projection, now);
        self.center_view(tree, container, world, &projection);
    }

    fn light_object(&mut self, tree: &mut ElementTree, id: u32, tint: Rgba) {
        if let Some(view) = self.views.get_mut(&id)
            && view.tint != Some(tint)
        {
            tree.apply(view.image, Update::ColorMod(tint));
            view.tint = Some(tint);
        }
    }

    fn finished_fades(&self, now: Instant) -> Vec<u32> {
        self.views
            .keys()
            .copied()
            .filter(|id| self.fades.target(*id).is_some() && !self.fades.is_active(*id, now))
            .collect()
    }

    fn drop_view(&mut self, tree: &mut ElementTree, id: u32) {
        if let Some(view) = self.views.remove(&id) {
            tree.destroy(view.image);
            if let Some(s) = view.shadow {
                tree.destroy(s);
            }
        }
        self.fades.remove(id);
    }

    fn object_events(&self, id: u32) -> Events {
        let inspect = self.input.clone();
        let interact = self.input.clone();
        Events::new()
            .on(EventKind::Pressed, move |_, ev| match ev {
                UiEvent::Pressed {
                    button: MouseButton::Left,
                    ..
                } => {
                    let _ = inspect.try_send(MapInput::Inspect(id));
                    false
                }
                _ => true,
            })
            .on(EventKind::Hold, move |_, ev| match ev {
                UiEvent::Hold {
                    button: MouseButton::Left,
                    ..
                } => {
                    let _ = interact.try_send(MapInput::Interact(id));
                    false
                }
                _ => true,
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn sync_object(
        &mut self,
        tree: &mut ElementTree,
        container: ElementId,
        world: &World,
        projection: &Projection,
        o: &mut Object,
        dt: Duration,
        now: Instant,
    ) {
        let frame_times: Vec<u32> = self
            .data
            .animation(o.animation_id)
            .and_then(|a| a.face(o.face_id).map(|f| f.frames.iter().map(|fr| fr.time).collect()))
            .unwrap_or_default();
        advance_frame(o, &frame_times, dt);
        let frame = self.data.frame(o.animation_id, o.face_id, o.frame_index);

        if !self.views.contains_key(&o.id) {
            let image = tree.spawn(
                container,
                ElementSpec::new(ElementKind::image(0))
                    .class("MapObject")
                    .holdable(true)
                    .events(self.object_events(o.id)),
            );
            let shadow = o.casts_shadow().then(|| {
                tree.spawn(
                    container,
                    ElementSpec::new(ElementKind::Primitive {
                        shape: Shape::Ellipse,
                    })
                    .class("MapShadow"),
                )
            });
            if let Some(s) = shadow {
                tree.apply(s, Update::BackgroundColor(SHADOW));
            }
            tree.apply(image, Update::Grayscale(!o.visible));
            if !o.unblocked {
                tree.apply(image, Update::Alpha(FADED_ALPHA));
            }
            self.views.insert(
                o.id,
                ObjectView {
                    image,
                    shadow,
                    placed: Placed {
                        hidden: false,
                        ..Default::default()
                    },
                    shadow_placed: Placed::default(),
                    tint: None,
                },
            );
        }
        let Some(view) = self.views.get_mut(&o.id) else {
            return;
        };

        if o.visibility_changed {
            tree.apply(view.image, Update::Grayscale(!o.visible));
        }
        if o.unblocked_changed {
            let current = tree.get(view.image).map_or(1.0, |e| e.style.alpha.value);
            let target = if o.unblocked { 1.0 } else { FADED_ALPHA };
            self.fades
                .retarget(o.id, current, target, FADE_TIME, Easing::EaseOut, now);
        }

        let hidden = o.missing || o.contained;
        let image_id = frame.as_ref().map_or(0, |f| f.image_id);
        let offset = frame.as_ref().map_or(Point::default(), |f| Point::new(f.x, f.y));
        let pos = projection.project(o.y, o.x, o.z, o.kind, offset, o.index);

        let (tw, th) = (projection.tile_width * self.scale, projection.tile_height * self.scale);
        let (mut w, mut h) = match self.data.image(image_id) {
            Some(img) => (img.width as f64 * self.scale, img.height as f64 * self.scale),
            None => {
                if image_id != 0 {
                    self.data.request_image(image_id);
                }
                (tw * o.w as f64, th * o.h as f64)
            }
        };
        let mut y = pos.py;
        if o.squeezing {
            w = (w - w / 4.0).max(tw);
        }
        if o.crouching {
            let squat = (h - h / 3.0).max(th);
            y += h - squat;
            h = squat;
        }

        let placed = Placed {
            image_id,
            x: pos.px,
            y,
            w,
            h,
            z: pos.z,
            hidden,
        };
        apply_placement(tree, view.image, &view.placed, &placed);
        view.placed = placed;

        if let Some(shadow) = view.shadow {
            let (sy, sx, sz) = world.shadow_position(o);
            let spos = projection.project(sy, sx, sz, o.kind, Point::default(), o.index);
            let mut sw = tw * o.w as f64;
            let mut sh = th * o.d as f64;
            let (mut x, mut y) = (spos.px, spos.py);
            if o.kind == ObjectType::Item {
                x += sw * 0.125;
                y += sh * 0.125;
                sw *= 0.75;
                sh *= 0.75;
            }
            let placed = Placed {
                image_id: 0,
                x,
                y,
                w: sw,
                h: sh,
                z: pos.z - 1,
                hidden,
            };
            apply_placement(tree, shadow, &view.shadow_placed, &placed);
            view.shadow_placed = placed;
        }
    }

    /// Float `body` over a cell or object for [`message_ttl`].
    pub fn add_message(
        &mut self,
        tree: &mut ElementTree,
        world: &World,
        anchor: Anchor,
        body: &str,
        now: Instant,
    ) -> Option<ElementId> {
        let container = self.container.filter(|c| tree.contains(*c))?;
        let projection = self.projection(world);
        let (px, py) = anchor_point(world, &projection, anchor)?;
        let style = format!(
            "{}\nX {px}\nY {py}\nZIndex {MESSAGE_Z}\nOrigin CenterX Bottom\nResize ToContent",
            self.message_style
        );
        let element = tree.spawn(
            container,
            ElementSpec::new(ElementKind::Text)
                .class("MapMessage")
                .style(style)
                .value(body),
        );
        self.messages.push(MapMessage {
            element,
            anchor,
            expires: now + message_ttl(body),
        });
        Some(element)
    }

    fn update_messages(
        &mut self,
        tree: &mut ElementTree,
        world: &World,
        projection: &Projection,
        now: Instant,
    ) {
        let fades = &mut self.message_fades;
        self.messages.retain(|m| {
            if now >= m.expires || !tree.contains(m.element) {
                tree.destroy(m.element);
                fades.remove(m.element);
                return false;
            }
            let fade_from = m.expires.checked_sub(MESSAGE_FADE).unwrap_or(m.expires);
            if now >= fade_from {
                if fades.target(m.element).is_none() {
                    fades.start(m.element, 1.0, 0.0, m.expires - now, Easing::Linear, now);
                }
                if let Some(alpha) = fades.get(m.element, now) {
                    tree.apply(m.element, Update::Alpha(alpha));
                }
            }
            if let Anchor::Object(_) = m.anchor {
                match anchor_point(world, projection, m.anchor) {
                    Some((px, py)) => {
                        let e = tree.get(m.element);
                        let moved = e.is_none_or(|e| e.style.x.value != px || e.style.y.value != py);
                        if moved {
                            tree.apply(m.element, Update::X(Number::px(px)));
                            tree.apply(m.element, Update::Y(Number::px(py)));
                        }
                    }
                    None => tree.apply(m.element, Update::Hidden(true)),
                }
            }
            true
        });
    }

    fn center_view(
        &mut self,
        tree: &mut ElementTree,
        container: ElementId,
        world: &World,
        projection: &Projection,
    ) {
        let Some(view) = world.view().filter(|o| !o.missing) else {
            return;
        };
        let Some(c) = tree.get(container) else {
            return;
        };
        let (cw, ch) = (c.layout.w, c.layout.h);
        let pos = projection.project(view.y, view.x, view.z, view.kind, Point::default(), view.index);
        let scroll = projection.center_on(pos, view.h, view.w, cw, ch);
        if scroll != self.scroll {
            self.scroll = scroll;
            tree.apply(
                container,
                Update::Scroll {
                    left: Number::px(scroll.0),
                    top: Number::px(scroll.1),
                },
            );
        }
    }
}

fn apply_placement(tree: &mut ElementTree, id: ElementId, old: &Placed, new: &Placed) {
    if old.image_id != new.image_id {
        tree.apply(id, Update::ImageId(new.image_id));
    }
    if (old.x, old.y, old.w, old.h) != (new.x, new.y, new.w, new.h) {
        tree.apply(
            id,
            Update::Dimensions {
                x: Number::px(new.x),
                y: Number::px(new.y),
                w: Number::px(new.w),
                h: Number::px(new.h),
            },
        );
    }
    if old.z != new.z {
        tree.apply(id, Update::ZIndex(Number::px(new.z as f64)));
    }
    if old.hidden != new.hidden {
        tree.apply(id, Update::Hidden(new.hidden));
    }
}

/// Top-center of an anchor in container pixels.
fn anchor_point(world: &World, projection: &Projection, anchor: Anchor) -> Option<(f64, f64)> {
    match anchor {
        Anchor::Cell { y, x, z } => {
            let pos = projection.project(y, x, z, ObjectType::Unknown, Point::default(), 0);
            Some((pos.px + projection.tile_width * projection.scale / 2.0, pos.py))
        }
        Anchor::Object(id) => {
            let o = world.object(id).filter(|o| !o.missing)?;
            let pos = projection.project(o.y, o.x, o.z, o.kind, Point::default(), o.index);
            let w = projection.tile_width * projection.scale * o.w as f64;
            Some((pos.px + w / 2.0, pos.py))
        }
    }
}

/// One-line summary of the view object's active statuses.
pub fn render_status(world: &World) -> String {
    if world.statuses.is_empty() {
        return String::new();
    }
    world
        .statuses
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One-line listing of the player's base inventory.
pub fn render_inventory(world: &World) -> String {
    let Some(container) = world.container(0) else {
        return String::new();
    };
    let mut out = String::new();
    for (i, id) in container.object_ids.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let label = world
            .object(*id)
            .and_then(|o| o.info.first().cloned())
            .unwrap_or_else(|| format!("#{id}"));
        let _ = write!(out, "{label}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{
        Animation, AnimationFace, AnimationFrame, Features, MapInfo, ObjectPayload, TileLight,
    };
    use crate::ui::MonoMeasurer;
    use crossbeam_channel::unbounded;

    fn projection() -> Projection {
        let config = AnimationsConfig {
            tile_width: 16,
            tile_height: 16,
            y_step: Point::new(8, -4),
            adjustments: Default::default(),
        };
        Projection::new(&config, 8, 10, 6, 2.0)
    }

    #[test]
    fn projection_formula() {
        let p = projection();
        let pos = p.project(5, 5, 1, ObjectType::Pc, Point::default(), 0);
        // originX = 5*8 + 5*16 = 120; originY = 8*4 + 5*-4 + 16 = 28
        assert_eq!(pos.px, 120.0 * 2.0 + MARGIN);
        assert_eq!(pos.py, 28.0 * 2.0 + MARGIN);
        assert_eq!(pos.z, 8 * 10 + 6 * 5 - 5);
    }

    #[test]
    fn adjustments_and_frame_offsets_are_added() {
        let mut p = projection();
        p.adjustments.insert(ObjectType::Item, Point::new(1, 2));
        let base = p.project(0, 0, 0, ObjectType::Item, Point::default(), 0);
        let moved = p.project(0, 0, 0, ObjectType::Item, Point::new(3, -1), 0);
        assert_eq!(moved.px - base.px, 3.0 * 2.0);
        assert_eq!(moved.py - base.py, -2.0);
        let plain = p.project(0, 0, 0, ObjectType::Npc, Point::default(), 0);
        assert_eq!(base.px - plain.px, 2.0);
    }

    #[test]
    fn later_objects_in_a_tile_draw_above() {
        let p = projection();
        assert!(p.z_index(1, 1, 1, 1) > p.z_index(1, 1, 1, 0));
        // Deeper rows draw over anything in shallower rows.
        assert!(p.z_index(0, 9, 2, 0) > p.z_index(7, 0, 1, 5));
    }

    #[test]
    fn z_index_does_not_overflow_on_large_maps() {
        let config = AnimationsConfig::default();
        let p = Projection::new(&config, 100_000, 100_000, 1000, 1.0);
        assert_eq!(p.z_index(0, 0, 999, 0), 999 * 100_000 * 100_000);
    }

    #[test]
    fn frames_advance_and_zero_duration_is_stable() {
        let mut o = Object::new(1);
        advance_frame(&mut o, &[100, 50, 0], Duration::from_millis(120));
        assert_eq!(o.frame_index, 1);
        assert_eq!(o.frame_elapsed, Duration::from_millis(20));
        advance_frame(&mut o, &[100, 50, 0], Duration::from_millis(30));
        assert_eq!(o.frame_index, 2);
        advance_frame(&mut o, &[100, 50, 0], Duration::from_secs(10));
        assert_eq!(o.frame_index, 2);

        let mut single = Object::new(2);
        advance_frame(&mut single, &[100], Duration::from_secs(1));
        assert_eq!(single.frame_index, 0);
    }

    #[test]
    fn ttl_has_a_floor() {
        assert_eq!(message_ttl("hi"), Duration::from_secs(2));
        assert_eq!(message_ttl("hello world this is a test"), Duration::from_secs(4));
        // Twelve two-byte characters count as 24.
        assert_eq!(message_ttl(&"ü".repeat(12)), Duration::from_secs(4));
    }

    #[test]
    fn light_tints() {
        assert_eq!(light_tint(1.0, 0.0), Rgba::WHITE);
        assert_eq!(light_tint(0.0, 0.0), Rgba::new(0, 0, 0, 255));
        assert_eq!(light_tint(0.5, 360.0), Rgba::new(128, 128, 128, 255));
        // Green hue keeps green full and pulls the others down.
        let green = light_tint(1.0, 120.0);
        assert_eq!(green.g, 255);
        assert_eq!(green.r, 191);
        assert_eq!(green.b, 191);
    }

    fn scene() -> (ElementTree, ElementId, World, MapRenderer) {
        let data = Arc::new(DataManager::new());
        data.set_features(Features {
            animations: AnimationsConfig {
                tile_width: 16,
                tile_height: 16,
                y_step: Point::new(8, -4),
                adjustments: Default::default(),
            },
            ..Default::default()
        });
        data.set_animation(Animation {
            id: 1,
            name: "pc".into(),
            faces: vec![AnimationFace {
                id: 0,
                frames: vec![AnimationFrame {
                    image_id: 50,
                    time: 0,
                    x: 0,
                    y: 0,
                }],
            }],
        });
        let mut tree = ElementTree::new(640.0, 480.0, Box::new(MonoMeasurer::default()));
        let root = tree.root();
        let map = tree.spawn(
            root,
            ElementSpec::new(ElementKind::Container)
                .class("Map")
                .style("W 100%\nH 100%"),
        );
        let mut world = World::new();
        world.set_map(&MapInfo {
            map_id: 1,
            height: 8,
            width: 8,
            depth: 8,
            ..Default::default()
        });
        let (tx, _rx) = unbounded();
        let mut renderer = MapRenderer::new(data, 1.0, tx);
        renderer.attach(map);
        (tree, map, world, renderer)
    }

    fn pc(world: &mut World, id: u32) {
        world.apply_object(
            id,
            ObjectPayload::Create {
                kind: ObjectType::Pc,
                animation_id: 1,
                face_id: 0,
                h: 2,
                w: 1,
                d: 1,
                reach: 0,
            },
        );
    }

    #[test]
    fn objects_get_an_image_and_a_shadow_below_it() {
        let (mut tree, map, mut world, mut r) = scene();
        pc(&mut world, 42);
        world.set_tile(5, 5, 1, &[42], TileLight::default());
        r.update(&mut tree, &mut world, Instant::now());
        tree.layout();

        let image = r.element_for(42).expect("image");
        let shadow = r.shadow_for(42).expect("shadow");
        assert_eq!(tree.get(image).and_then(|e| e.parent), Some(map));
        let z = tree.get(image).map(|e| e.style.z_index.value).expect("z");
        let sz = tree.get(shadow).map(|e| e.style.z_index.value).expect("z");
        assert_eq!(sz, z - 1.0);
        let s = tree.get(shadow).expect("shadow element");
        assert_eq!(s.style.background_color, SHADOW);
    }

    #[test]
    fn tile_light_modulates_the_object_image() {
        let (mut tree, _, mut world, mut r) = scene();
        world.map.set_ambient(1.0, 0.0, false, 0.0);
        pc(&mut world, 7);
        world.set_tile(2, 2, 0, &[7], TileLight::default());
        let now = Instant::now();
        r.update(&mut tree, &mut world, now);
        let image = r.element_for(7).expect("image");
        let color_mod = |tree: &ElementTree| tree.get(image).map(|e| e.style.color_mod);
        assert_eq!(color_mod(&tree), Some(Rgba::WHITE));

        world.map.set_ambient(0.25, 0.0, false, 0.0);
        world.set_tile(
            2,
            2,
            0,
            &[7],
            TileLight {
                brightness: 0.25,
                hue: 0.0,
                sky: 0.0,
            },
        );
        r.update(&mut tree, &mut world, now);
        assert_eq!(color_mod(&tree), Some(Rgba::new(128, 128, 128, 255)));

        world.set_tile(
            2,
            2,
            0,
            &[7],
            TileLight {
                brightness: 0.75,
                hue: 240.0,
                sky: 0.0,
            },
        );
        r.update(&mut tree, &mut world, now);
        assert_eq!(color_mod(&tree), Some(light_tint(1.0, 240.0)));
    }

    #[test]
    fn missing_objects_are_hidden_and_deleted_ones_destroyed() {
        let (mut tree, _, mut world, mut r) = scene();
        pc(&mut world, 1);
        world.set_tile(0, 0, 0, &[1], TileLight::default());
        let now = Instant::now();
        r.update(&mut tree, &mut world, now);
        let image = r.element_for(1).expect("image");

        world.set_tile(0, 0, 0, &[], TileLight::default());
        r.update(&mut tree, &mut world, now);
        assert!(tree.get(image).is_some_and(|e| e.hidden));

        world.apply_object(1, ObjectPayload::Delete);
        r.update(&mut tree, &mut world, now);
        assert!(!tree.contains(image));
        assert!(r.element_for(1).is_none());
    }

    #[test]
    fn blocked_objects_fade() {
        let (mut tree, _, mut world, mut r) = scene();
        pc(&mut world, 1);
        world.set_tile(0, 0, 0, &[1], TileLight::default());
        let t0 = Instant::now();
        r.update(&mut tree, &mut world, t0);
        world.apply_object(1, ObjectPayload::Unblocked(false));
        r.update(&mut tree, &mut world, t0);
        r.update(&mut tree, &mut world, t0 + Duration::from_secs(1));
        let image = r.element_for(1).expect("image");
        let alpha = tree.get(image).map(|e| e.style.alpha.value).expect("alpha");
        assert!((alpha - FADED_ALPHA).abs() < 1e-9);
    }

    #[test]
    fn messages_expire() {
        let (mut tree, map, mut world, mut r) = scene();
        pc(&mut world, 42);
        world.set_tile(5, 5, 1, &[42], TileLight::default());
        let t0 = Instant::now();
        r.update(&mut tree, &mut world, t0);
        let msg = r
            .add_message(&mut tree, &world, Anchor::Object(42), "hello world this is a test", t0)
            .expect("spawned");
        assert_eq!(tree.get(msg).and_then(|e| e.parent), Some(map));
        assert_eq!(
            tree.get(msg).map(|e| e.style.z_index.value),
            Some(MESSAGE_Z as f64)
        );
        r.update(&mut tree, &mut world, t0 + Duration::from_millis(3900));
        assert!(tree.contains(msg));
        r.update(&mut tree, &mut world, t0 + Duration::from_secs(4));
        assert!(!tree.contains(msg));
        assert_eq!(r.message_count(), 0);
    }

    #[test]
    fn messages_fade_out_before_expiring() {
        let (mut tree, _, mut world, mut r) = scene();
        let t0 = Instant::now();
        let msg = r
            .add_message(&mut tree, &world, Anchor::Cell { y: 1, x: 1, z: 0 }, "hi", t0)
            .expect("spawned");
        let alpha = |tree: &ElementTree| tree.get(msg).map(|e| e.style.alpha.value);
        r.update(&mut tree, &mut world, t0 + Duration::from_millis(1000));
        assert_eq!(alpha(&tree), Some(1.0));
        r.update(&mut tree, &mut world, t0 + Duration::from_millis(1500));
        assert_eq!(alpha(&tree), Some(1.0));
        r.update(&mut tree, &mut world, t0 + Duration::from_millis(1750));
        let half = alpha(&tree).expect("alpha");
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn status_and_inventory_lines() {
        let mut world = World::new();
        assert_eq!(render_status(&world), "");
        world.set_status("poisoned", true);
        world.set_status("hungry", true);
        assert_eq!(render_status(&world), "hungry, poisoned");
        world.set_container(0, vec![3, 4]);
        world.apply_object(3, ObjectPayload::Info(vec!["sword".into()]));
        assert_eq!(render_inventory(&world), "sword, #4");
    }
}
