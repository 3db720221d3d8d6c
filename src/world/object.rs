use std::time::Duration;

use crate::net::protocol::ObjectType;

/// A thing on the map as the client last heard about it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    pub id: u32,
    pub kind: ObjectType,
    pub animation_id: u32,
    pub face_id: u32,
    pub frame_index: usize,
    pub frame_elapsed: Duration,
    pub y: u32,
    pub x: u32,
    pub z: u32,
    pub h: u8,
    pub w: u8,
    pub d: u8,
    pub reach: u8,
    /// Position within its tile's stack.
    pub index: usize,
    /// Not in any tile.
    pub missing: bool,
    pub changed: bool,
    pub visible: bool,
    pub visibility_changed: bool,
    pub unblocked: bool,
    pub unblocked_changed: bool,
    pub squeezing: bool,
    pub crouching: bool,
    pub posture_changed: bool,
    pub contained: bool,
    pub info: Vec<String>,
}

impl Object {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            h: 1,
            w: 1,
            d: 1,
            missing: true,
            visible: true,
            unblocked: true,
            ..Default::default()
        }
    }

    pub fn casts_shadow(&self) -> bool {
        matches!(self.kind, ObjectType::Pc | ObjectType::Npc | ObjectType::Item)
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.visibility_changed = true;
        }
    }

    pub fn set_unblocked(&mut self, unblocked: bool) {
        if self.unblocked != unblocked {
            self.unblocked = unblocked;
            self.unblocked_changed = true;
        }
    }

    pub fn set_squeezing(&mut self, squeezing: bool) {
        if self.squeezing != squeezing {
            self.squeezing = squeezing;
            self.posture_changed = true;
        }
    }

    pub fn set_crouching(&mut self, crouching: bool) {
        if self.crouching != crouching {
            self.crouching = crouching;
            self.posture_changed = true;
        }
    }

    /// Switch animation or face, restarting the frame clock.
    pub fn set_animation(&mut self, animation_id: u32, face_id: u32) {
        if self.animation_id != animation_id || self.face_id != face_id {
            self.animation_id = animation_id;
            self.face_id = face_id;
            self.frame_index = 0;
            self.frame_elapsed = Duration::ZERO;
            self.changed = true;
        }
    }

    /// Clear the per-frame change flags once the renderer consumed them.
    pub fn clear_changes(&mut self) {
        self.changed = false;
        self.visibility_changed = false;
        self.unblocked_changed = false;
        self.posture_changed = false;
    }
}

/// An inventory: an ordered list of object ids. Id 0 is the player's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub id: u32,
    pub object_ids: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_objects_start_missing_and_visible() {
        let o = Object::new(3);
        assert!(o.missing);
        assert!(o.visible && o.unblocked);
        assert!(!o.casts_shadow());
    }

    #[test]
    fn flags_only_change_on_transition() {
        let mut o = Object::new(1);
        o.set_visible(true);
        assert!(!o.visibility_changed);
        o.set_visible(false);
        assert!(o.visibility_changed);
        o.set_crouching(true);
        assert!(o.posture_changed);
        o.clear_changes();
        assert!(!o.visibility_changed && !o.posture_changed);
    }

    #[test]
    fn animation_switch_resets_clock() {
        let mut o = Object::new(1);
        o.frame_index = 3;
        o.frame_elapsed = Duration::from_millis(40);
        o.set_animation(0, 0);
        assert_eq!(o.frame_index, 3);
        o.set_animation(7, 0);
        assert_eq!(o.frame_index, 0);
        assert_eq!(o.frame_elapsed, Duration::ZERO);
        assert!(o.changed);
    }
}
