use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::{Screen, buttons, on_enter};
use super::{
    Session, State, StateArgs, StateContext, StateKind, Transition, Wake, Worker, WorkerContext,
};
use crate::error::{ClientError, Result};
use crate::net::Command;
use crate::net::protocol::{BasicKind, LoginKind};
use crate::ui::layout::ElementConfig;
use crate::ui::{ElementId, Update};

pub const MIN_PASSWORD_LEN: usize = 4;

/// The register screen's fields as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub confirm: String,
    pub email: String,
}

impl RegisterForm {
    /// Every problem with the form, one per field at most.
    pub fn validate(&self) -> Vec<ClientError> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: &str| {
            errors.push(ClientError::Validation {
                field: field.to_string(),
                message: message.to_string(),
            })
        };
        if self.username.trim().is_empty() {
            fail("username", "username is required");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            fail("password", "password must be at least 4 characters");
        }
        if self.confirm != self.password {
            fail("confirm", "passwords do not match");
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            fail("email", "email address needs an @");
        }
        errors
    }

    fn into_command(self) -> Command {
        Command::Login {
            kind: LoginKind::Register,
            user: self.username.trim().to_string(),
            pass: self.password,
            email: (!self.email.is_empty()).then_some(self.email),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Submit,
    Back,
}

struct Ids {
    username: ElementId,
    password: ElementId,
    confirm: ElementId,
    email: ElementId,
    message: ElementId,
    errors: [(&'static str, ElementId); 4],
}

impl Ids {
    fn form(&self, ui: &crate::ui::Ui) -> RegisterForm {
        let read = |id| ui.tree.value(id).unwrap_or_default().to_string();
        RegisterForm {
            username: read(self.username),
            password: read(self.password),
            confirm: read(self.confirm),
            email: read(self.email).trim().to_string(),
        }
    }
}

pub struct RegisterState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    worker: Option<Worker>,
    tx: Sender<Input>,
    rx: Receiver<Input>,
    work_tx: Sender<Command>,
    work_rx: Receiver<Command>,
}

impl RegisterState {
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

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Default for RegisterState {
    fn default() -> Self {
        Self::new()
    }
}

fn run(
    wcx: WorkerContext,
    message: ElementId,
    close: Receiver<()>,
    input: Receiver<Command>,
) -> Result<()> {
    let session = Session::new(&wcx.conn, close, input);
    loop {
        match session.next() {
            Wake::Input(command) => {
                wcx.ui.update(message, Update::Value("Registering".into()));
                wcx.send(&command)?;
            }
            Wake::Server(Command::Basic {
                kind: BasicKind::Ok,
                message: text,
            }) => {
                let text = if text.is_empty() {
                    "Account created, you can log in now".to_string()
                } else {
                    text
                };
                wcx.transitions.send(Transition::Pop(StateArgs::Info(text)));
            }
            Wake::Server(Command::Basic { message: text, .. }) => {
                wcx.ui.update(message, Update::Value(text));
            }
            Wake::Server(other) => log::debug!("register ignoring {}", other.name()),
            Wake::Closed => {
                wcx.disconnected();
                return Ok(());
            }
            Wake::Stop | Wake::Timeout => return Ok(()),
        }
    }
}

impl State for RegisterState {
    fn kind(&self) -> StateKind {
        StateKind::Register
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        _args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let mut configs = buttons(&self.tx, [("Submit", Input::Submit), ("Back", Input::Back)]);
        for field in ["Confirm", "Email"] {
            configs.insert(
                field.into(),
                ElementConfig::events(on_enter(&self.tx, Input::Submit)),
            );
        }
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "register", configs)?;
        let ids = Ids {
            username: screen.find(cx.ui, "Username")?,
            password: screen.find(cx.ui, "Password")?,
            confirm: screen.find(cx.ui, "Confirm")?,
            email: screen.find(cx.ui, "Email")?,
            message: screen.find(cx.ui, "Message")?,
            errors: [
                ("username", screen.find(cx.ui, "UsernameError")?),
                ("password", screen.find(cx.ui, "PasswordError")?),
                ("confirm", screen.find(cx.ui, "ConfirmError")?),
                ("email", screen.find(cx.ui, "EmailError")?),
            ],
        };

        let wcx = WorkerContext::new(cx)?;
        let input = self.work_rx.clone();
        let message = ids.message;
        self.screen = Some(screen);
        self.ids = Some(ids);
        self.worker = Some(Worker::spawn("register", cx.transitions.clone(), move |close| {
            run(wcx, message, close, input)
        })?);
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
                Input::Back => cx.transitions.send(Transition::Pop(StateArgs::None)),
                Input::Submit => {
                    let form = ids.form(cx.ui);
                    let errors = form.validate();
                    for (field, id) in ids.errors {
                        let text = errors
                            .iter()
                            .find_map(|e| match e {
                                ClientError::Validation { field: f, message } if f == field => {
                                    Some(message.as_str())
                                }
                                _ => None,
                            })
                            .unwrap_or_default();
                        cx.ui.tree.set_value(id, text);
                    }
                    if errors.is_empty() {
                        let _ = self.work_tx.send(form.into_command());
                    } else {
                        log::debug!("register form has {} problems", errors.len());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, password: &str, confirm: &str, email: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            password: password.into(),
            confirm: confirm.into(),
            email: email.into(),
        }
    }

    fn fields(errors: &[ClientError]) -> Vec<&str> {
        errors
            .iter()
            .filter_map(|e| match e {
                ClientError::Validation { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn valid_form_passes() {
        assert!(form("alice", "hunter2", "hunter2", "").validate().is_empty());
        assert!(form("alice", "pass", "pass", "a@b").validate().is_empty());
    }

    #[test]
    fn every_bad_field_is_reported() {
        let errors = form("  ", "abc", "abd", "nope").validate();
        assert_eq!(fields(&errors), vec!["username", "password", "confirm", "email"]);
    }

    #[test]
    fn register_command_omits_empty_email() {
        match form(" bob ", "pass", "pass", "").into_command() {
            Command::Login {
                kind: LoginKind::Register,
                user,
                email,
                ..
            } => {
                assert_eq!(user, "bob");
                assert_eq!(email, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
