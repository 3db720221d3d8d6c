//! Screen lifecycle.
//!
//! Screens live on a stack. Each one builds its UI on the UI thread and may
//! run one worker thread that talks to the server. Workers never touch
//! elements: they post [`Update`](crate::ui::Update)s through a
//! [`UiSender`](crate::ui::UiSender) and ask for screen changes through
//! [`Transitions`]. Transitions are applied on the UI thread by
//! [`StateMachine::tick`].

mod character_creation;
mod character_selection;
mod game;
mod handshake;
mod list;
mod login;
mod register;
mod screen;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::client::Client;
use crate::error::Result;
use crate::net::{Command, Connection};
use crate::ui::Ui;
use crate::ui::keys::KeyEvent;

pub use character_creation::CharacterCreationState;
pub use character_selection::CharacterSelectionState;
pub use game::GameState;
pub use handshake::{HANDSHAKE_TIMEOUT, HandshakeState};
pub use list::ListState;
pub use login::LoginState;
pub use register::{RegisterForm, RegisterState};
pub use screen::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    List,
    Handshake,
    Login,
    Register,
    CharacterSelection,
    CharacterCreation,
    Game,
}

/// Arguments handed to `init` and `enter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StateArgs {
    #[default]
    None,
    Error(String),
    Info(String),
    Host(String),
}

impl StateArgs {
    /// Text worth showing to the user, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            StateArgs::Error(m) | StateArgs::Info(m) => Some(m),
            StateArgs::None | StateArgs::Host(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Close the current screen and open another in its place.
    Replace(StateKind, StateArgs),
    /// Hide the current screen and open another above it.
    Push(StateKind, StateArgs),
    /// Close the current screen and re-enter the one below.
    Pop(StateArgs),
    /// Close everything above the bottom screen and re-enter it.
    PopToTop(StateArgs),
    Quit,
}

/// Producer side of the state channel, tagged with the screen that owns it.
/// Requests from a screen that is no longer on top are dropped.
#[derive(Clone)]
pub struct Transitions {
    tx: Sender<(u64, Transition)>,
    origin: u64,
}

impl Transitions {
    pub fn send(&self, transition: Transition) {
        if self.tx.send((self.origin, transition)).is_err() {
            log::debug!("state machine gone, dropping transition");
        }
    }
}

/// What a screen may touch while the machine calls into it.
pub struct StateContext<'a> {
    pub ui: &'a mut Ui,
    pub client: &'a Arc<Client>,
    pub transitions: Transitions,
}

/// A screen.
pub trait State {
    fn kind(&self) -> StateKind;

    /// Build the screen. A returned follow-up replaces this screen at once.
    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>>;

    /// The screen above was popped; `args` are what it left behind.
    fn enter(&mut self, cx: &mut StateContext<'_>, args: StateArgs);

    /// A screen is being pushed above this one. Hide, keep state.
    fn leave(&mut self, cx: &mut StateContext<'_>);

    /// The screen is being removed for good.
    fn close(&mut self, cx: &mut StateContext<'_>);

    /// Once per frame while on top.
    fn frame(&mut self, _cx: &mut StateContext<'_>, _now: Instant) {}

    /// Keys the UI did not consume. Returns true if handled.
    fn key(&mut self, _cx: &mut StateContext<'_>, _key: KeyEvent) -> bool {
        false
    }

    /// Keys the UI consumed, e.g. while an input has focus.
    fn key_consumed(&mut self, _cx: &mut StateContext<'_>, _key: KeyEvent) {}
}

/// Build the screen for `kind`.
pub type Factory = Box<dyn Fn(StateKind) -> Box<dyn State>>;

pub fn create_state(kind: StateKind) -> Box<dyn State> {
    match kind {
        StateKind::List => Box::new(ListState::new()),
        StateKind::Handshake => Box::new(HandshakeState::new()),
        StateKind::Login => Box::new(LoginState::new()),
        StateKind::Register => Box::new(RegisterState::new()),
        StateKind::CharacterSelection => Box::new(CharacterSelectionState::new()),
        StateKind::CharacterCreation => Box::new(CharacterCreationState::new()),
        StateKind::Game => Box::new(GameState::new()),
    }
}

struct Entry {
    id: u64,
    state: Box<dyn State>,
}

/// The screen stack and its transition channel.
pub struct StateMachine {
    client: Arc<Client>,
    factory: Factory,
    stack: Vec<Entry>,
    tx: Sender<(u64, Transition)>,
    rx: Receiver<(u64, Transition)>,
    next_id: u64,
    quit: bool,
}

fn context<'a>(
    ui: &'a mut Ui,
    client: &'a Arc<Client>,
    tx: &Sender<(u64, Transition)>,
    origin: u64,
) -> StateContext<'a> {
    StateContext {
        ui,
        client,
        transitions: Transitions {
            tx: tx.clone(),
            origin,
        },
    }
}

impl StateMachine {
    pub fn new(client: Arc<Client>) -> Self {
        Self::with_factory(client, Box::new(create_state))
    }

    pub fn with_factory(client: Arc<Client>, factory: Factory) -> Self {
        let (tx, rx) = unbounded();
        Self {
            client,
            factory,
            stack: Vec::new(),
            tx,
            rx,
            next_id: 1,
            quit: false,
        }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// A sender that is never considered stale.
    pub fn transitions(&self) -> Transitions {
        Transitions {
            tx: self.tx.clone(),
            origin: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<StateKind> {
        self.stack.last().map(|e| e.state.kind())
    }

    /// Bottom to top.
    pub fn kinds(&self) -> Vec<StateKind> {
        self.stack.iter().map(|e| e.state.kind()).collect()
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Apply queued transitions, then run the top screen's frame.
    pub fn tick(&mut self, ui: &mut Ui, now: Instant) {
        while let Ok((origin, transition)) = self.rx.try_recv() {
            let top = self.stack.last().map(|e| e.id);
            if origin != 0 && Some(origin) != top {
                log::debug!("dropping {transition:?} from a screen no longer on top");
                continue;
            }
            self.apply(ui, transition);
            if self.quit {
                return;
            }
        }
        if let Some(entry) = self.stack.last_mut() {
            let mut cx = context(ui, &self.client, &self.tx, entry.id);
            entry.state.frame(&mut cx, now);
        }
    }

    pub fn key(&mut self, ui: &mut Ui, key: KeyEvent) -> bool {
        let Some(entry) = self.stack.last_mut() else {
            return false;
        };
        let mut cx = context(ui, &self.client, &self.tx, entry.id);
        entry.state.key(&mut cx, key)
    }

    pub fn key_consumed(&mut self, ui: &mut Ui, key: KeyEvent) {
        if let Some(entry) = self.stack.last_mut() {
            let mut cx = context(ui, &self.client, &self.tx, entry.id);
            entry.state.key_consumed(&mut cx, key);
        }
    }

    pub fn apply(&mut self, ui: &mut Ui, transition: Transition) {
        log::info!("state transition: {transition:?}");
        match transition {
            Transition::Replace(kind, args) => {
                self.close_top(ui);
                self.open(ui, kind, args);
            }
            Transition::Push(kind, args) => {
                if let Some(entry) = self.stack.last_mut() {
                    let mut cx = context(ui, &self.client, &self.tx, entry.id);
                    entry.state.leave(&mut cx);
                }
                self.open(ui, kind, args);
            }
            Transition::Pop(args) => {
                self.close_top(ui);
                self.enter_top(ui, args);
            }
            Transition::PopToTop(args) => {
                while self.stack.len() > 1 {
                    self.close_top(ui);
                }
                self.enter_top(ui, args);
            }
            Transition::Quit => {
                while !self.stack.is_empty() {
                    self.close_top(ui);
                }
                self.quit = true;
            }
        }
    }

    fn close_top(&mut self, ui: &mut Ui) {
        if let Some(mut entry) = self.stack.pop() {
            let mut cx = context(ui, &self.client, &self.tx, entry.id);
            entry.state.close(&mut cx);
        }
    }

    fn enter_top(&mut self, ui: &mut Ui, args: StateArgs) {
        match self.stack.last_mut() {
            Some(entry) => {
                let mut cx = context(ui, &self.client, &self.tx, entry.id);
                entry.state.enter(&mut cx, args);
            }
            None => self.quit = true,
        }
    }

    /// Push a fresh screen and run its `init`, following any chain of
    /// immediate replacements.
    fn open(&mut self, ui: &mut Ui, kind: StateKind, args: StateArgs) {
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(Entry {
            id,
            state: (self.factory)(kind),
        });
        let Some(entry) = self.stack.last_mut() else {
            return;
        };
        let mut cx = context(ui, &self.client, &self.tx, id);
        let started = entry.state.init(&mut cx, args);
        match started {
            Ok(None) => {}
            Ok(Some((next, next_args))) => self.apply(ui, Transition::Replace(next, next_args)),
            Err(e) => {
                log::warn!("{kind:?} failed to start: {e}");
                self.close_top(ui);
                self.enter_top(ui, StateArgs::Error(e.to_string()));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// A screen's background thread. Dropping it (or [`Worker::stop`]) signals
/// the close channel and joins.
pub struct Worker {
    close: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Run `body` on a named thread. An error or panic unwinds the stack to
    /// the bottom screen with the message.
    pub fn spawn<F>(name: &str, transitions: Transitions, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) -> Result<()> + Send + 'static,
    {
        let (close_tx, close_rx) = bounded::<()>(1);
        let thread_name = format!("state-{name}");
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || match panic::catch_unwind(AssertUnwindSafe(|| body(close_rx))) {
                Ok(Ok(())) => log::debug!("{thread_name} finished"),
                Ok(Err(e)) => {
                    log::warn!("{thread_name}: {e}");
                    transitions.send(Transition::PopToTop(StateArgs::Error(e.to_string())));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("{thread_name} panicked: {message}");
                    transitions.send(Transition::PopToTop(StateArgs::Error(message)));
                }
            })?;
        Ok(Self {
            close: Some(close_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.close.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("worker thread could not be joined");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What woke a worker.
#[derive(Debug)]
pub enum Wake<I> {
    Server(Command),
    /// The server went away.
    Closed,
    /// The screen is closing.
    Stop,
    Input(I),
    Timeout,
}

/// The four sources every network worker waits on.
pub struct Session<I> {
    commands: Receiver<Command>,
    closed: Receiver<()>,
    close: Receiver<()>,
    input: Receiver<I>,
}

impl<I> Session<I> {
    pub fn new(conn: &Connection, close: Receiver<()>, input: Receiver<I>) -> Self {
        Self {
            commands: conn.commands(),
            closed: conn.closed(),
            close,
            input,
        }
    }

    pub fn next(&self) -> Wake<I> {
        select! {
            recv(self.commands) -> msg => msg.map_or(Wake::Closed, Wake::Server),
            recv(self.closed) -> _ => Wake::Closed,
            recv(self.close) -> _ => Wake::Stop,
            recv(self.input) -> msg => msg.map_or(Wake::Stop, Wake::Input),
        }
    }

    /// Like [`Session::next`], giving up at `deadline`.
    pub fn next_until(&self, deadline: Instant) -> Wake<I> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        select! {
            recv(self.commands) -> msg => msg.map_or(Wake::Closed, Wake::Server),
            recv(self.closed) -> _ => Wake::Closed,
            recv(self.close) -> _ => Wake::Stop,
            recv(self.input) -> msg => msg.map_or(Wake::Stop, Wake::Input),
            default(timeout) => Wake::Timeout,
        }
    }
}

/// The worker-side view of a screen: the connection, the transition
/// sender, and a sink for UI updates.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Arc<Client>,
    pub conn: Arc<Connection>,
    pub transitions: Transitions,
    pub ui: crate::ui::UiSender,
}

impl WorkerContext {
    /// Everything a network worker needs, or a connection error when the
    /// client is offline.
    pub fn new(cx: &StateContext<'_>) -> Result<Self> {
        let conn = cx
            .client
            .connection()
            .ok_or_else(|| crate::error::ClientError::Connection("not connected".into()))?;
        Ok(Self {
            client: cx.client.clone(),
            conn,
            transitions: cx.transitions.clone(),
            ui: cx.ui.sender(),
        })
    }

    pub fn send(&self, command: &Command) -> Result<()> {
        self.conn.send(command)
    }

    /// The server dropped us: back to the server list.
    pub fn disconnected(&self) {
        log::info!("connection to {} lost", self.conn.host());
        self.transitions.send(Transition::PopToTop(StateArgs::None));
    }
}
