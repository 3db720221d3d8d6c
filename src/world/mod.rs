//! Client-side world model: the current map, its objects, and inventories.
//!
//! Everything here is fed by server commands. Nothing is simulated locally.

pub mod map;
pub mod object;

use std::collections::{BTreeSet, HashMap};

pub use map::{DynamicMap, DynamicMapTile};
pub use object::{Container, Object};

use crate::net::protocol::{MapInfo, ObjectPayload, ObjectType, TileLight};

#[derive(Debug, Default)]
pub struct World {
    pub map: DynamicMap,
    objects: HashMap<u32, Object>,
    containers: HashMap<u32, Container>,
    /// The object the camera follows.
    pub view_object: Option<u32>,
    /// Active statuses of the view object.
    pub statuses: BTreeSet<String>,
    /// Ids removed since the renderer last looked.
    deleted: Vec<u32>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: u32) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: u32) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.values_mut()
    }

    pub fn view(&self) -> Option<&Object> {
        self.object(self.view_object?)
    }

    pub fn container(&self, id: u32) -> Option<&Container> {
        self.containers.get(&id)
    }

    /// Replace the map. Objects stay known but are no longer on any tile.
    pub fn set_map(&mut self, info: &MapInfo) {
        if self.map.id == info.map_id
            && self.map.height() == info.height
            && self.map.width() == info.width
            && self.map.depth() == info.depth
        {
            self.map
                .set_ambient(info.brightness, info.hue, info.outdoor, info.outdoor_brightness);
            return;
        }
        self.map = DynamicMap::from_info(info);
        for o in self.objects.values_mut() {
            o.missing = true;
            o.changed = true;
        }
    }

    /// Replace the object stack of one tile. Objects that left become
    /// missing unless another tile holds them; objects that arrived are
    /// moved here, leaving their previous tile.
    pub fn set_tile(&mut self, y: u32, x: u32, z: u32, object_ids: &[u32], light: TileLight) {
        let Some(previous) = self.map.tile(y, x, z).map(|t| t.objects.clone()).or_else(|| {
            self.map.index(y, x, z).map(|_| Vec::new())
        }) else {
            log::warn!("tile ({y},{x},{z}) is outside the map");
            return;
        };
        self.map.set_light(y, x, z, light);

        for id in previous.iter().filter(|id| !object_ids.contains(id)) {
            if let Some(o) = self.objects.get_mut(id)
                && (o.y, o.x, o.z) == (y, x, z)
            {
                o.missing = true;
                o.changed = true;
            }
        }

        for (index, &id) in object_ids.iter().enumerate() {
            let (oy, ox, oz, was_missing) = match self.objects.get(&id) {
                Some(o) => (o.y, o.x, o.z, o.missing),
                None => (y, x, z, true),
            };
            if !was_missing && (oy, ox, oz) != (y, x, z) {
                if let Some(old) = self.map.tile_mut(oy, ox, oz) {
                    old.objects.retain(|o| *o != id);
                }
                self.reindex(oy, ox, oz);
            }
            let o = self.objects.entry(id).or_insert_with(|| Object::new(id));
            o.y = y;
            o.x = x;
            o.z = z;
            o.index = index;
            o.missing = false;
            o.changed = true;
        }

        if let Some(tile) = self.map.tile_mut(y, x, z) {
            tile.objects = object_ids.to_vec();
        }
    }

    fn reindex(&mut self, y: u32, x: u32, z: u32) {
        let Some(ids) = self.map.tile(y, x, z).map(|t| t.objects.clone()) else {
            return;
        };
        for (index, id) in ids.iter().enumerate() {
            if let Some(o) = self.objects.get_mut(id) {
                o.index = index;
                o.changed = true;
            }
        }
    }

    /// Apply an object command.
    pub fn apply_object(&mut self, id: u32, payload: ObjectPayload) {
        if matches!(payload, ObjectPayload::Delete) {
            self.remove_object(id);
            return;
        }
        let o = self.objects.entry(id).or_insert_with(|| Object::new(id));
        match payload {
            ObjectPayload::Create {
                kind,
                animation_id,
                face_id,
                h,
                w,
                d,
                reach,
            } => {
                o.kind = kind;
                o.set_animation(animation_id, face_id);
                o.h = h;
                o.w = w;
                o.d = d;
                o.reach = reach;
                o.changed = true;
            }
            ObjectPayload::Update {
                animation_id,
                face_id,
            } => o.set_animation(animation_id, face_id),
            ObjectPayload::Visibility(v) => o.set_visible(v),
            ObjectPayload::Unblocked(v) => o.set_unblocked(v),
            ObjectPayload::Squeeze(v) => o.set_squeezing(v),
            ObjectPayload::Crouch(v) => o.set_crouching(v),
            ObjectPayload::Info(info) => o.info = info,
            ObjectPayload::ViewTarget => self.view_object = Some(id),
            ObjectPayload::Delete => {}
        }
    }

    pub fn remove_object(&mut self, id: u32) {
        let Some(o) = self.objects.remove(&id) else {
            return;
        };
        if !o.missing {
            if let Some(tile) = self.map.tile_mut(o.y, o.x, o.z) {
                tile.objects.retain(|t| *t != id);
            }
            self.reindex(o.y, o.x, o.z);
        }
        for c in self.containers.values_mut() {
            c.object_ids.retain(|t| *t != id);
        }
        if self.view_object == Some(id) {
            self.view_object = None;
        }
        self.deleted.push(id);
    }

    /// Ids deleted since the last call.
    pub fn take_deleted(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.deleted)
    }

    /// Replace an inventory's contents, updating each object's `contained`.
    pub fn set_container(&mut self, id: u32, object_ids: Vec<u32>) {
        let previous = self
            .containers
            .insert(
                id,
                Container {
                    id,
                    object_ids: object_ids.clone(),
                },
            )
            .map(|c| c.object_ids)
            .unwrap_or_default();
        for dropped in previous.iter().filter(|o| !object_ids.contains(o)) {
            let elsewhere = self
                .containers
                .values()
                .any(|c| c.object_ids.contains(dropped));
            if !elsewhere && let Some(o) = self.objects.get_mut(dropped) {
                o.contained = false;
            }
        }
        for added in &object_ids {
            let o = self.objects.entry(*added).or_insert_with(|| Object::new(*added));
            o.contained = true;
        }
    }

    fn has_block(&self, y: u32, x: u32, z: u32) -> bool {
        self.map.tile(y, x, z).is_some_and(|t| {
            t.objects
                .iter()
                .any(|id| self.object(*id).is_some_and(|o| o.kind == ObjectType::Block))
        })
    }

    /// Where the object's shadow lands: drop down the height axis until
    /// something solid is underneath.
    pub fn shadow_position(&self, o: &Object) -> (u32, u32, u32) {
        let mut y = o.y;
        while y > 0 && !self.has_block(y - 1, o.x, o.z) {
            y -= 1;
        }
        (y, o.x, o.z)
    }

    pub fn set_status(&mut self, kind: &str, active: bool) {
        if active {
            self.statuses.insert(kind.to_string());
        } else {
            self.statuses.remove(kind);
        }
    }

    /// Check the lookup and tile-membership invariants. Used by tests and
    /// debug assertions.
    pub fn is_consistent(&self) -> bool {
        let mut seen: HashMap<u32, usize> = HashMap::new();
        for tile in self.map.tiles() {
            for id in &tile.objects {
                *seen.entry(*id).or_default() += 1;
            }
        }
        self.objects.iter().all(|(id, o)| {
            o.id == *id && o.missing == !seen.contains_key(id) && seen.get(id).is_none_or(|n| *n == 1)
        })
    }
}
