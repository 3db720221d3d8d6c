//! In-game command handling.

pub mod bindings;
pub mod dispatch;
pub mod history;

pub use bindings::{GameContext, Request, game_bindings};
pub use dispatch::{Effect, dispatch};
pub use history::{InputHistory, MessageLog};
