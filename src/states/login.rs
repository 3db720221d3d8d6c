use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::{Screen, buttons, on_enter};
use super::{
    Session, State, StateArgs, StateContext, StateKind, Transition, Wake, Worker, WorkerContext,
};
use crate::error::Result;
use crate::net::Command;
use crate::net::protocol::{BasicKind, LoginKind};
use crate::ui::layout::ElementConfig;
use crate::ui::{ElementId, Ui, Update};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Submit,
    Register,
    Back,
}

/// Credentials handed from the UI thread to the worker.
#[derive(Debug, Clone)]
struct Credentials {
    user: String,
    pass: String,
}

struct Ids {
    username: ElementId,
    password: ElementId,
    message: ElementId,
}

pub struct LoginState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    worker: Option<Worker>,
    tx: Sender<Input>,
    rx: Receiver<Input>,
    work_tx: Sender<Credentials>,
    work_rx: Receiver<Credentials>,
}

impl LoginState {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let (work_tx, work_rx) = unbounded();
        Self {
            screen: None,
            ids: None,
            worker: None,
            tx,
            rx,
            work_tx,
            work_rx,
        }
    }

    fn start(&mut self, cx: &StateContext<'_>) -> Result<()> {
        let Some(ids) = &self.ids else {
            return Ok(());
        };
        let wcx = WorkerContext::new(cx)?;
        let input = self.work_rx.clone();
        let message = ids.message;
        self.worker = Some(Worker::spawn("login", cx.transitions.clone(), move |close| {
            run(wcx, message, close, input)
        })?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn show_message(&self, ui: &mut Ui, args: &StateArgs) {
        if let Some(ids) = &self.ids {
            ui.tree
                .set_value(ids.message, args.message().unwrap_or_default());
        }
    }
}

impl Default for LoginState {
    fn default() -> Self {
        Self::new()
    }
}

fn run(
    wcx: WorkerContext,
    message: ElementId,
    close: Receiver<()>,
    input: Receiver<Credentials>,
) -> Result<()> {
    let session = Session::new(&wcx.conn, close, input);
    let mut pending: Option<Credentials> = None;
    loop {
        match session.next() {
            Wake::Input(creds) => {
                wcx.ui
                    .update(message, Update::Value("Logging in".into()));
                wcx.send(&Command::Login {
                    kind: LoginKind::Login,
                    user: creds.user.clone(),
                    pass: creds.pass.clone(),
                    email: None,
                })?;
                pending = Some(creds);
            }
            Wake::Server(Command::Basic {
                kind: BasicKind::Ok,
                message: text,
            }) => {
                let Some(creds) = pending.take() else {
                    log::debug!("unsolicited OK: {text}");
                    continue;
                };
                log::info!("logged in as {}", creds.user);
                wcx.client.remember_login(&creds.user, &creds.pass);
                wcx.ui.update(message, Update::Value(String::new()));
                wcx.transitions
                    .send(Transition::Push(StateKind::CharacterSelection, StateArgs::None));
            }
            Wake::Server(Command::Basic { message: text, .. }) => {
                pending = None;
                wcx.ui.update(message, Update::Value(text));
            }
            Wake::Server(other) => log::debug!("login ignoring {}", other.name()),
            Wake::Closed => {
                wcx.disconnected();
                return Ok(());
            }
            Wake::Stop | Wake::Timeout => return Ok(()),
        }
    }
}

impl State for LoginState {
    fn kind(&self) -> StateKind {
        StateKind::Login
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let mut configs = buttons(
            &self.tx,
            [
                ("Submit", Input::Submit),
                ("Register", Input::Register),
                ("Back", Input::Back),
            ],
        );
        configs.insert(
            "Password".into(),
            ElementConfig::events(on_enter(&self.tx, Input::Submit)),
        );
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "login", configs)?;
        let ids = Ids {
            username: screen.find(cx.ui, "Username")?,
            password: screen.find(cx.ui, "Password")?,
            message: screen.find(cx.ui, "Message")?,
        };

        let saved = cx
            .client
            .host()
            .and_then(|host| cx.client.config().servers.get(&host).cloned());
        if let Some(saved) = saved {
            cx.ui.tree.set_value(ids.username, saved.username);
            cx.ui.tree.set_value(ids.password, saved.password);
        }
        if let Some((user, pass)) = cx.client.take_autologin() {
            cx.ui.tree.set_value(ids.username, user);
            cx.ui.tree.set_value(ids.password, pass);
            let _ = self.tx.send(Input::Submit);
        }

        self.screen = Some(screen);
        self.ids = Some(ids);
        self.show_message(cx.ui, &args);
        self.start(cx)?;
        Ok(None)
    }

    fn enter(&mut self, cx: &mut StateContext<'_>, args: StateArgs) {
        if let Some(screen) = &self.screen {
            screen.show(cx.ui);
        }
        self.show_message(cx.ui, &args);
        if let Err(e) = self.start(cx) {
            cx.transitions
                .send(Transition::PopToTop(StateArgs::Error(e.to_string())));
        }
    }

    fn leave(&mut self, cx: &mut StateContext<'_>) {
        self.stop();
        if let Some(screen) = &self.screen {
            screen.hide(cx.ui);
        }
    }

    fn close(&mut self, cx: &mut StateContext<'_>) {
        self.stop();
        if let Some(screen) = self.screen.take() {
            screen.destroy(cx.ui);
        }
        self.ids = None;
    }

    fn frame(&mut self, cx: &mut StateContext<'_>, _now: Instant) {
        let Some(ids) = &self.ids else {
            return;
        };
        while let Ok(input) = self.rx.try_recv() {
            match input {
                Input::Submit => {
                    let user = cx.ui.tree.value(ids.username).unwrap_or_default().trim().to_string();
                    let pass = cx.ui.tree.value(ids.password).unwrap_or_default().to_string();
                    if user.is_empty() {
                        cx.ui.tree.set_value(ids.message, "enter a username");
                        continue;
                    }
                    let _ = self.work_tx.send(Credentials { user, pass });
                }
                Input::Register => cx
                    .transitions
                    .send(Transition::Push(StateKind::Register, StateArgs::None)),
                Input::Back => cx.transitions.send(Transition::Pop(StateArgs::None)),
            }
        }
    }
}
