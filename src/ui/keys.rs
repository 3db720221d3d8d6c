//! Key codes and modifiers.
//!
//! Codes follow SDL keycode numbering so that bindings written to the config
//! file stay stable across platforms: printable keys use their lowercase
//! codepoint, everything else lives above `SCANCODE_MASK`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use winit::keyboard::KeyCode;

pub const SCANCODE_MASK: u32 = 1 << 30;

pub const BACKSPACE: u32 = 8;
pub const TAB: u32 = 9;
pub const RETURN: u32 = 13;
pub const ESCAPE: u32 = 27;
pub const SPACE: u32 = 32;
pub const SLASH: u32 = b'/' as u32;
pub const DELETE: u32 = 127;

pub const F1: u32 = 58 | SCANCODE_MASK;
pub const HOME: u32 = 74 | SCANCODE_MASK;
pub const PAGE_UP: u32 = 75 | SCANCODE_MASK;
pub const END: u32 = 77 | SCANCODE_MASK;
pub const PAGE_DOWN: u32 = 78 | SCANCODE_MASK;
pub const RIGHT: u32 = 79 | SCANCODE_MASK;
pub const LEFT: u32 = 80 | SCANCODE_MASK;
pub const DOWN: u32 = 81 | SCANCODE_MASK;
pub const UP: u32 = 82 | SCANCODE_MASK;
pub const KP_ENTER: u32 = 88 | SCANCODE_MASK;

/// Code for an ASCII letter or digit.
pub const fn ascii(c: char) -> u32 {
    c.to_ascii_lowercase() as u32
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
    pub struct Modifiers: u16 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const GUI = 1 << 3;
    }
}

impl Modifiers {
    pub fn from_winit(state: winit::keyboard::ModifiersState) -> Self {
        let mut m = Modifiers::empty();
        m.set(Modifiers::SHIFT, state.shift_key());
        m.set(Modifiers::CTRL, state.control_key());
        m.set(Modifiers::ALT, state.alt_key());
        m.set(Modifiers::GUI, state.super_key());
        m
    }
}

/// A keyboard event as seen by the UI and the bindings layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u32,
    pub modifiers: Modifiers,
    pub pressed: bool,
    pub repeat: bool,
}

impl KeyEvent {
    pub fn press(code: u32) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
            pressed: true,
            repeat: false,
        }
    }

    pub fn repeat(code: u32) -> Self {
        Self {
            repeat: true,
            ..Self::press(code)
        }
    }

    pub fn release(code: u32) -> Self {
        Self {
            pressed: false,
            ..Self::press(code)
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Translate a physical winit key into a keycode. Unmapped keys yield None.
pub fn from_winit(key: KeyCode) -> Option<u32> {
    let code = match key {
        KeyCode::KeyA => ascii('a'),
        KeyCode::KeyB => ascii('b'),
        KeyCode::KeyC => ascii('c'),
        KeyCode::KeyD => ascii('d'),
        KeyCode::KeyE => ascii('e'),
        KeyCode::KeyF => ascii('f'),
        KeyCode::KeyG => ascii('g'),
        KeyCode::KeyH => ascii('h'),
        KeyCode::KeyI => ascii('i'),
        KeyCode::KeyJ => ascii('j'),
        KeyCode::KeyK => ascii('k'),
        KeyCode::KeyL => ascii('l'),
        KeyCode::KeyM => ascii('m'),
        KeyCode::KeyN => ascii('n'),
        KeyCode::KeyO => ascii('o'),
        KeyCode::KeyP => ascii('p'),
        KeyCode::KeyQ => ascii('q'),
        KeyCode::KeyR => ascii('r'),
        KeyCode::KeyS => ascii('s'),
        KeyCode::KeyT => ascii('t'),
        KeyCode::KeyU => ascii('u'),
        KeyCode::KeyV => ascii('v'),
        KeyCode::KeyW => ascii('w'),
        KeyCode::KeyX => ascii('x'),
        KeyCode::KeyY => ascii('y'),
        KeyCode::KeyZ => ascii('z'),
        KeyCode::Digit0 => ascii('0'),
        KeyCode::Digit1 => ascii('1'),
        KeyCode::Digit2 => ascii('2'),
        KeyCode::Digit3 => ascii('3'),
        KeyCode::Digit4 => ascii('4'),
        KeyCode::Digit5 => ascii('5'),
        KeyCode::Digit6 => ascii('6'),
        KeyCode::Digit7 => ascii('7'),
        KeyCode::Digit8 => ascii('8'),
        KeyCode::Digit9 => ascii('9'),
        KeyCode::Slash => SLASH,
        KeyCode::Space => SPACE,
        KeyCode::Enter => RETURN,
        KeyCode::NumpadEnter => KP_ENTER,
        KeyCode::Escape => ESCAPE,
        KeyCode::Tab => TAB,
        KeyCode::Backspace => BACKSPACE,
        KeyCode::Delete => DELETE,
        KeyCode::Home => HOME,
        KeyCode::End => END,
        KeyCode::PageUp => PAGE_UP,
        KeyCode::PageDown => PAGE_DOWN,
        KeyCode::ArrowUp => UP,
        KeyCode::ArrowDown => DOWN,
        KeyCode::ArrowLeft => LEFT,
        KeyCode::ArrowRight => RIGHT,
        KeyCode::F1 => F1,
        _ => return None,
    };
    Some(code)
}

/// Human-readable name for a key code.
pub fn key_name(code: u32) -> String {
    match code {
        BACKSPACE => "Bksp".into(),
        TAB => "Tab".into(),
        RETURN | KP_ENTER => "Enter".into(),
        ESCAPE => "Esc".into(),
        SPACE => "Space".into(),
        DELETE => "Del".into(),
        HOME => "Home".into(),
        END => "End".into(),
        PAGE_UP => "PgUp".into(),
        PAGE_DOWN => "PgDn".into(),
        UP => "Up".into(),
        DOWN => "Down".into(),
        LEFT => "Left".into(),
        RIGHT => "Right".into(),
        c if c < 128 => char::from_u32(c)
            .map(|ch| ch.to_ascii_uppercase().to_string())
            .unwrap_or_else(|| "?".into()),
        _ => "?".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_use_lowercase_codepoints() {
        assert_eq!(from_winit(KeyCode::KeyK), Some(107));
        assert_eq!(from_winit(KeyCode::KeyH), Some(104));
        assert_eq!(ascii('K'), 107);
    }

    #[test]
    fn control_keys() {
        assert_eq!(from_winit(KeyCode::Escape), Some(27));
        assert_eq!(from_winit(KeyCode::Tab), Some(9));
        assert_eq!(from_winit(KeyCode::Enter), Some(13));
        assert_eq!(from_winit(KeyCode::F24), None);
    }

    #[test]
    fn names() {
        assert_eq!(key_name(ESCAPE), "Esc");
        assert_eq!(key_name(ascii('k')), "K");
        assert_eq!(key_name(UP), "Up");
    }
}
