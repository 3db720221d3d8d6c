use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "chimera";

/// Where the client reads and writes files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Read-only data: fonts, layouts, UI images.
    pub share_dir: Option<PathBuf>,
}

impl Paths {
    /// Platform data roots, e.g. `~/.config/chimera` and `~/.cache/chimera`
    /// on Linux.
    pub fn discover() -> Self {
        let base = |dir: Option<PathBuf>| dir.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME);
        Self {
            config_dir: base(dirs::config_dir()),
            cache_dir: base(dirs::cache_dir()),
            share_dir: find_share_dir(),
        }
    }

    /// Everything under one directory. Used by tests.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            share_dir: None,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.ron")
    }

    pub fn share(&self, rel: &str) -> Option<PathBuf> {
        self.share_dir.as_ref().map(|d| d.join(rel))
    }
}

/// `<exe-dir>/../share/chimera/client`, then `./share/chimera/client`.
fn find_share_dir() -> Option<PathBuf> {
    let rel = Path::new("share").join(APP_NAME).join("client");
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent()?.parent().map(|p| p.join(&rel)));
    let candidates = beside_exe.into_iter().chain(std::iter::once(rel.clone()));
    for dir in candidates {
        if dir.is_dir() {
            log::debug!("share directory: {}", dir.display());
            return Some(dir);
        }
    }
    log::warn!("no share directory found, using built-in layouts");
    None
}
