use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::{Screen, buttons};
use super::{Session, State, StateArgs, StateContext, StateKind, Transition, Transitions, Wake, Worker};
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::net::Command;
use crate::net::protocol::PROTOCOL_VERSION;
use crate::ui::{ElementId, UiSender, Update};

/// How long the server has to answer our handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cancel;

/// Connects, trades versions, and waits for the feature table.
pub struct HandshakeState {
    screen: Option<Screen>,
    worker: Option<Worker>,
    tx: Sender<Cancel>,
    rx: Receiver<Cancel>,
}

impl HandshakeState {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            screen: None,
            worker: None,
            tx,
            rx,
        }
    }
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self::new()
    }
}

struct Job {
    client: Arc<Client>,
    host: String,
    transitions: Transitions,
    ui: UiSender,
    status: ElementId,
}

impl Job {
    fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.transitions
            .send(Transition::Pop(StateArgs::Error(message.into())));
        Ok(())
    }

    fn run(self, close: Receiver<()>, cancel: Receiver<Cancel>) -> Result<()> {
        let conn = match self.client.connect(&self.host) {
            Ok(conn) => conn,
            Err(e) => return self.fail(format!("could not connect: {e}")),
        };
        self.ui
            .update(self.status, Update::Value(format!("Handshaking with {}", self.host)));
        conn.send(&Command::client_handshake())?;

        let session = Session::new(&conn, close, cancel);
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            match session.next_until(deadline) {
                Wake::Server(Command::Handshake { version, program }) => {
                    if version != PROTOCOL_VERSION {
                        return self.fail(format!(
                            "server speaks protocol {version}, this client speaks {PROTOCOL_VERSION}"
                        ));
                    }
                    log::info!("{} is {program} v{version}", self.host);
                    break;
                }
                Wake::Server(other) => {
                    return Err(ClientError::Protocol(format!(
                        "expected Handshake, got {}",
                        other.name()
                    )));
                }
                Wake::Closed => return self.fail("server closed the connection"),
                Wake::Timeout => return self.fail("handshake timed out"),
                Wake::Input(Cancel) => {
                    self.transitions.send(Transition::Pop(StateArgs::None));
                    return Ok(());
                }
                Wake::Stop => return Ok(()),
            }
        }

        self.ui
            .update(self.status, Update::Value("Waiting for features".into()));
        loop {
            match session.next() {
                Wake::Server(Command::Features(features)) => {
                    self.client.data.set_features(features);
                    self.transitions
                        .send(Transition::Replace(StateKind::Login, StateArgs::None));
                    return Ok(());
                }
                Wake::Server(other) => log::debug!("ignoring {} before features", other.name()),
                Wake::Closed => return self.fail("server closed the connection"),
                Wake::Input(Cancel) => {
                    self.transitions.send(Transition::Pop(StateArgs::None));
                    return Ok(());
                }
                Wake::Stop | Wake::Timeout => return Ok(()),
            }
        }
    }
}

impl State for HandshakeState {
    fn kind(&self) -> StateKind {
        StateKind::Handshake
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let StateArgs::Host(host) = args else {
            return Err(ClientError::Connection("no server given".into()));
        };
        let configs = buttons(&self.tx, [("Cancel", Cancel)]);
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "handshake", configs)?;
        let status = screen.find(cx.ui, "Status")?;
        cx.ui
            .tree
            .set_value(status, format!("Connecting to {host}"));
        self.screen = Some(screen);

        let job = Job {
            client: cx.client.clone(),
            host,
            transitions: cx.transitions.clone(),
            ui: cx.ui.sender(),
            status,
        };
        let cancel = self.rx.clone();
        self.worker = Some(Worker::spawn(
            "handshake",
            cx.transitions.clone(),
            move |close| job.run(close, cancel),
        )?);
        Ok(None)
    }

    fn enter(&mut self, cx: &mut StateContext<'_>, _args: StateArgs) {
        if let Some(screen) = &self.screen {
            screen.show(cx.ui);
        }
    }

    fn leave(&mut self, cx: &mut StateContext<'_>) {
        if let Some(screen) = &self.screen {
            screen.hide(cx.ui);
        }
    }

    fn close(&mut self, cx: &mut StateContext<'_>) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        if let Some(screen) = self.screen.take() {
            screen.destroy(cx.ui);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use crate::cli::Cli;
    use crate::config::Config;
    use crate::net::codec;
    use crate::paths::Paths;
    use crate::states::StateMachine;
    use crate::ui::{MonoMeasurer, Ui};

    fn machine(tag: &str) -> (StateMachine, Ui) {
        let dir = std::env::temp_dir().join(format!("chimera-hs-{tag}-{}", std::process::id()));
        let client = Arc::new(Client::new(&Cli::default(), Paths::rooted(&dir), Config::default()));
        let ui = Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
        (StateMachine::new(client), ui)
    }

    fn pump_until(m: &mut StateMachine, ui: &mut Ui, what: impl Fn(&StateMachine) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !what(m) && Instant::now() < deadline {
            m.tick(ui, Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let host = listener.local_addr().expect("addr").to_string();
        let (mut m, mut ui) = machine("timeout");
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        m.apply(&mut ui, Transition::Push(StateKind::Handshake, StateArgs::Host(host)));
        let _peer = listener.accept().expect("accept");
        pump_until(&mut m, &mut ui, |m| m.depth() == 1);
        assert_eq!(m.kinds(), vec![StateKind::List]);
        let error = ui.tree.find("Error").expect("error");
        assert_eq!(ui.tree.value(error), Some("handshake timed out"));
    }

    #[test]
    fn version_mismatch_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let host = listener.local_addr().expect("addr").to_string();
        let (mut m, mut ui) = machine("version");
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        m.apply(&mut ui, Transition::Push(StateKind::Handshake, StateArgs::Host(host)));
        let (mut peer, _) = listener.accept().expect("accept");
        codec::write_frame(
            &mut peer,
            &Command::Handshake {
                version: PROTOCOL_VERSION + 1,
                program: "srv".into(),
            },
        )
        .expect("write");
        pump_until(&mut m, &mut ui, |m| m.depth() == 1);
        let error = ui.tree.find("Error").expect("error");
        assert!(ui.tree.value(error).unwrap_or_default().contains("protocol"));
    }

    #[test]
    fn missing_host_fails_init() {
        let (mut m, mut ui) = machine("nohost");
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        m.apply(&mut ui, Transition::Push(StateKind::Handshake, StateArgs::None));
        assert_eq!(m.kinds(), vec![StateKind::List]);
    }
}
