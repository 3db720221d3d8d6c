//! Persistent preferences, stored as RON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ui::keybindings::KeyGroup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            x: 0,
            y: 0,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub object_scale: f64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self { object_scale: 4.0 }
    }
}

/// How an inventory window is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub mode: i32,
    pub aggregate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub graphics: GraphicsConfig,
    pub command_prefix: String,
    /// Per-command key overrides; commands not listed keep their defaults.
    pub bindings: BTreeMap<String, Vec<KeyGroup>>,
    pub containers: BTreeMap<String, ContainerConfig>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            graphics: GraphicsConfig::default(),
            command_prefix: "/".to_string(),
            bindings: BTreeMap::new(),
            containers: BTreeMap::new(),
        }
    }
}

/// Saved login for one `host:port`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub username: String,
    pub password: String,
    pub character: String,
    pub remember_password: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub game: GameConfig,
    pub servers: BTreeMap<String, ServerConfig>,
    pub last_server: String,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Read `path`. A missing file gives defaults; so does a malformed one,
    /// with a warning.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                log::info!("no config at {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("failed to parse {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Write to a sibling temp file and rename it over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, self.to_ron()?)?;
        std::fs::rename(&tmp, path)?;
        log::debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Record a successful login. The password is kept only when the server
    /// entry asks for it.
    pub fn remember_login(&mut self, host: &str, username: &str, password: &str) {
        let server = self.servers.entry(host.to_string()).or_default();
        server.username = username.to_string();
        if server.remember_password {
            server.password = password.to_string();
        } else {
            server.password.clear();
        }
        self.last_server = host.to_string();
    }
}
