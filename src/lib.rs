//! Chimera game client: screen flow, wire protocol, retained UI, and the
//! wgpu backend that draws it.

pub mod cli;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod game;
pub mod gpu;
pub mod net;
pub mod paths;
pub mod render;
pub mod states;
pub mod ui;
pub mod world;
