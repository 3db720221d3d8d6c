use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::{Screen, buttons, entry, on_press};
use super::{
    Session, State, StateArgs, StateContext, StateKind, Transition, Wake, Worker, WorkerContext,
};
use crate::error::Result;
use crate::net::Command;
use crate::net::protocol::{BasicKind, CharacterKind};
use crate::ui::{ElementId, Ui, Update};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Choose(String),
    Create,
    Back,
}

/// Worker to UI thread.
#[derive(Debug)]
enum Listed {
    Characters(Vec<String>),
}

struct Ids {
    characters: ElementId,
    message: ElementId,
}

pub struct CharacterSelectionState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    entries: Vec<ElementId>,
    worker: Option<Worker>,
    auto: Option<String>,
    tx: Sender<Input>,
    rx: Receiver<Input>,
    work_tx: Sender<String>,
    work_rx: Receiver<String>,
    listed_tx: Sender<Listed>,
    listed_rx: Receiver<Listed>,
}

impl CharacterSelectionState {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let (work_tx, work_rx) = unbounded();
        let (listed_tx, listed_rx) = unbounded();
        Self {
            screen: None,
            ids: None,
            entries: Vec::new(),
            worker: None,
            auto: None,
            tx,
            rx,
            work_tx,
            work_rx,
            listed_tx,
            listed_rx,
        }
    }

    fn start(&mut self, cx: &StateContext<'_>) -> Result<()> {
        let Some(ids) = &self.ids else {
            return Ok(());
        };
        let wcx = WorkerContext::new(cx)?;
        let input = self.work_rx.clone();
        let listed = self.listed_tx.clone();
        let message = ids.message;
        self.worker = Some(Worker::spawn(
            "character-selection",
            cx.transitions.clone(),
            move |close| run(wcx, message, close, input, listed),
        )?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn show(&mut self, ui: &mut Ui, names: Vec<String>) {
        let (Some(screen), Some(ids)) = (&self.screen, &self.ids) else {
            return;
        };
        for id in self.entries.drain(..) {
            ui.tree.destroy(id);
        }
        let style = screen.style_for("CharacterEntry");
        for name in &names {
            let events = on_press(&self.tx, Input::Choose(name.clone()));
            let spec = entry("CharacterEntry", &style, name, events);
            self.entries.push(ui.spawn(ids.characters, spec));
        }
        if let Some(auto) = self.auto.take() {
            if names.contains(&auto) {
                log::info!("choosing {auto} from the command line");
                let _ = self.work_tx.send(auto);
            } else {
                log::warn!("no character named {auto}");
            }
        }
    }
}

impl Default for CharacterSelectionState {
    fn default() -> Self {
        Self::new()
    }
}

fn run(
    wcx: WorkerContext,
    message: ElementId,
    close: Receiver<()>,
    input: Receiver<String>,
    listed: Sender<Listed>,
) -> Result<()> {
    wcx.send(&Command::characters(CharacterKind::QueryCharacters, Vec::new()))?;
    let session = Session::new(&wcx.conn, close, input);
    let mut chosen: Option<String> = None;
    loop {
        match session.next() {
            Wake::Input(name) => {
                wcx.send(&Command::characters(
                    CharacterKind::ChooseCharacter,
                    vec![name.clone()],
                ))?;
                chosen = Some(name);
            }
            Wake::Server(Command::Character { characters, .. }) => {
                let _ = listed.send(Listed::Characters(characters));
            }
            Wake::Server(Command::Basic {
                kind: BasicKind::Ok,
                ..
            }) => {
                let Some(name) = chosen.take() else {
                    continue;
                };
                log::info!("playing as {name}");
                if let Some(host) = wcx.client.host() {
                    if let Some(server) = wcx.client.config().servers.get_mut(&host) {
                        server.character = name;
                    }
                    wcx.client.save_config();
                }
                wcx.transitions
                    .send(Transition::Push(StateKind::Game, StateArgs::None));
            }
            Wake::Server(Command::Basic { message: text, .. }) => {
                chosen = None;
                wcx.ui.update(message, Update::Value(text));
            }
            Wake::Server(other) => log::debug!("character selection ignoring {}", other.name()),
            Wake::Closed => {
                wcx.disconnected();
                return Ok(());
            }
            Wake::Stop | Wake::Timeout => return Ok(()),
        }
    }
}

impl State for CharacterSelectionState {
    fn kind(&self) -> StateKind {
        StateKind::CharacterSelection
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        _args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let configs = buttons(&self.tx, [("Create", Input::Create), ("Back", Input::Back)]);
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "character_selection", configs)?;
        self.ids = Some(Ids {
            characters: screen.find(cx.ui, "Characters")?,
            message: screen.find(cx.ui, "Message")?,
        });
        self.screen = Some(screen);
        self.auto = cx.client.take_autocharacter();
        self.start(cx)?;
        Ok(None)
    }

    fn enter(&mut self, cx: &mut StateContext<'_>, args: StateArgs) {
        if let Some(screen) = &self.screen {
            screen.show(cx.ui);
        }
        if let Some(ids) = &self.ids {
            cx.ui
                .tree
                .set_value(ids.message, args.message().unwrap_or_default());
        }
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
        self.entries.clear();
        self.ids = None;
    }

    fn frame(&mut self, cx: &mut StateContext<'_>, _now: Instant) {
        while let Ok(Listed::Characters(names)) = self.listed_rx.try_recv() {
            self.show(cx.ui, names);
        }
        while let Ok(input) = self.rx.try_recv() {
            match input {
                Input::Choose(name) => {
                    let _ = self.work_tx.send(name);
                }
                Input::Create => cx
                    .transitions
                    .send(Transition::Push(StateKind::CharacterCreation, StateArgs::None)),
                Input::Back => {
                    cx.client.disconnect();
                    cx.transitions.send(Transition::PopToTop(StateArgs::None));
                }
            }
        }
    }
}
