//! Process-wide client: the connection, the asset cache, preferences.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cli::Cli;
use crate::config::Config;
use crate::data::DataManager;
use crate::error::{ClientError, Result};
use crate::net::{Command, Connection};
use crate::paths::Paths;

/// CLI-supplied actions that fire once per process.
#[derive(Debug, Default)]
struct Autofill {
    connect: Option<String>,
    login: Option<(String, String)>,
    character: Option<String>,
}

/// Shared by the UI thread and every state worker.
pub struct Client {
    pub data: Arc<DataManager>,
    pub paths: Paths,
    pub scale: f64,
    pub fps: u32,
    config: Mutex<Config>,
    config_path: std::path::PathBuf,
    connection: Mutex<Option<Arc<Connection>>>,
    autofill: Mutex<Autofill>,
}

impl Client {
    pub fn new(cli: &Cli, paths: Paths, config: Config) -> Self {
        let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
        let scale = cli.scale.unwrap_or(config.game.graphics.object_scale);
        Self {
            data: Arc::new(DataManager::new()),
            paths,
            scale,
            fps: cli.fps.max(1),
            config: Mutex::new(config),
            config_path,
            connection: Mutex::new(None),
            autofill: Mutex::new(Autofill {
                connect: cli.connect.clone(),
                login: cli.credentials(),
                character: cli.character.clone(),
            }),
        }
    }

    /// Lock the preferences.
    pub fn config(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn save_config(&self) {
        let config = self.config().clone();
        if let Err(e) = config.save(&self.config_path) {
            log::warn!("failed to save config to {}: {e}", self.config_path.display());
        }
    }

    /// Open a connection to `host`, replacing any existing one. Blocks for
    /// at most the connect timeout.
    pub fn connect(&self, host: &str) -> Result<Arc<Connection>> {
        self.disconnect();
        let conn = Arc::new(Connection::connect(host)?);
        *self.lock_connection() = Some(conn.clone());
        self.data.reset();
        Ok(conn)
    }

    /// Adopt an already-open connection.
    pub fn attach(&self, conn: Arc<Connection>) {
        self.disconnect();
        *self.lock_connection() = Some(conn);
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.lock_connection().clone()
    }

    pub fn host(&self) -> Option<String> {
        self.connection().map(|c| c.host().to_string())
    }

    pub fn send(&self, command: &Command) -> Result<()> {
        let conn = self
            .connection()
            .ok_or_else(|| ClientError::Connection("not connected".into()))?;
        conn.send(command)
    }

    pub fn disconnect(&self) {
        if let Some(conn) = self.lock_connection().take() {
            log::info!("disconnecting from {}", conn.host());
            conn.close();
        }
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn autofill(&self) -> MutexGuard<'_, Autofill> {
        self.autofill.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn take_autoconnect(&self) -> Option<String> {
        self.autofill().connect.take()
    }

    pub fn take_autologin(&self) -> Option<(String, String)> {
        self.autofill().login.take()
    }

    pub fn take_autocharacter(&self) -> Option<String> {
        self.autofill().character.take()
    }

    /// Store the login in the config for the current host and save.
    pub fn remember_login(&self, username: &str, password: &str) {
        let Some(host) = self.host() else {
            return;
        };
        self.config().remember_login(&host, username, password);
        self.save_config();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn client(cli: &Cli) -> Client {
        let dir = std::env::temp_dir().join(format!("chimera-client-{}", std::process::id()));
        Client::new(cli, Paths::rooted(&dir), Config::default())
    }

    #[test]
    fn autofill_fires_once() {
        let cli = Cli {
            connect: Some("h:1".into()),
            username: Some("a".into()),
            password: Some("b".into()),
            ..Default::default()
        };
        let c = client(&cli);
        assert_eq!(c.take_autoconnect().as_deref(), Some("h:1"));
        assert!(c.take_autoconnect().is_none());
        assert!(c.take_autologin().is_some());
        assert!(c.take_autologin().is_none());
        assert!(c.take_autocharacter().is_none());
    }

    #[test]
    fn scale_prefers_the_flag() {
        let c = client(&Cli::default());
        assert_eq!(c.scale, 4.0);
        let c = client(&Cli {
            scale: Some(2.0),
            ..Default::default()
        });
        assert_eq!(c.scale, 2.0);
    }

    #[test]
    fn send_without_connection_fails() {
        let c = client(&Cli::default());
        assert!(matches!(
            c.send(&Command::Rejoin),
            Err(ClientError::Connection(_))
        ));
    }

    #[test]
    fn connect_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let c = client(&Cli::default());
        let conn = c.connect(&addr).expect("connect");
        assert_eq!(c.host().as_deref(), Some(addr.as_str()));
        c.disconnect();
        assert!(c.connection().is_none());
        assert!(conn.is_closed());
    }
}
