use std::path::PathBuf;

use clap::Parser;

/// Command-line flags.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "chimera", version, about = "Chimera game client")]
pub struct Cli {
    /// Log in as this user once connected.
    #[arg(long)]
    pub username: Option<String>,

    /// Password for --username.
    #[arg(long)]
    pub password: Option<String>,

    /// Pick this character after logging in.
    #[arg(long)]
    pub character: Option<String>,

    /// Connect to HOST:PORT on startup.
    #[arg(long, value_name = "HOST:PORT")]
    pub connect: Option<String>,

    /// Object scale on the map.
    #[arg(long)]
    pub scale: Option<f64>,

    #[arg(long)]
    pub fullscreen: bool,

    /// Config file to use instead of the one in the config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Frame rate cap.
    #[arg(long, default_value_t = 60)]
    pub fps: u32,
}

impl Cli {
    /// Credentials for auto-login, when both halves are present.
    pub fn credentials(&self) -> Option<(String, String)> {
        Some((self.username.clone()?, self.password.clone()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["chimera"]);
        assert_eq!(cli.fps, 60);
        assert!(cli.scale.is_none());
        assert!(cli.credentials().is_none());
    }

    #[test]
    fn connect_and_login_flags() {
        let cli = Cli::parse_from([
            "chimera",
            "--connect",
            "127.0.0.1:1337",
            "--username",
            "alice",
            "--password",
            "hunter2",
            "--scale",
            "2.5",
        ]);
        assert_eq!(cli.connect.as_deref(), Some("127.0.0.1:1337"));
        assert_eq!(
            cli.credentials(),
            Some(("alice".to_string(), "hunter2".to_string()))
        );
        assert_eq!(cli.scale, Some(2.5));
    }

    #[test]
    fn username_alone_does_not_log_in() {
        let cli = Cli::parse_from(["chimera", "--username", "alice"]);
        assert!(cli.credentials().is_none());
    }
}
