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
    Genus(String),
    Species(String),
    Create,
    Back,
}

#[derive(Debug)]
enum Work {
    Species(String),
    Create {
        name: String,
        genus: String,
        species: String,
    },
}

#[derive(Debug)]
enum Listed {
    Genera(Vec<String>),
    Species { genus: String, species: Vec<String> },
}

struct Ids {
    name: ElementId,
    genera: ElementId,
    species: ElementId,
    selection: ElementId,
    message: ElementId,
}

pub struct CharacterCreationState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    worker: Option<Worker>,
    genus_entries: Vec<ElementId>,
    species_entries: Vec<ElementId>,
    genus: Option<String>,
    species: Option<String>,
    tx: Sender<Input>,
    rx: Receiver<Input>,
    work_tx: Sender<Work>,
    work_rx: Receiver<Work>,
    listed_tx: Sender<Listed>,
    listed_rx: Receiver<Listed>,
}

impl CharacterCreationState {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let (work_tx, work_rx) = unbounded();
        let (listed_tx, listed_rx) = unbounded();
        Self {
            screen: None,
            ids: None,
            worker: None,
            genus_entries: Vec::new(),
            species_entries: Vec::new(),
            genus: None,
            species: None,
            tx,
            rx,
            work_tx,
            work_rx,
            listed_tx,
            listed_rx,
        }
    }

    fn list(&mut self, ui: &mut Ui, listed: Listed) {
        let (Some(screen), Some(ids)) = (&self.screen, &self.ids) else {
            return;
        };
        let (parent, entries, class, names, make): (_, _, _, _, fn(String) -> Input) = match listed
        {
            Listed::Genera(genera) => (
                ids.genera,
                &mut self.genus_entries,
                "GenusEntry",
                genera,
                Input::Genus,
            ),
            Listed::Species { genus, species } => {
                if self.genus.as_deref() != Some(genus.as_str()) {
                    log::debug!("dropping species list for {genus}");
                    return;
                }
                (
                    ids.species,
                    &mut self.species_entries,
                    "SpeciesEntry",
                    species,
                    Input::Species,
                )
            }
        };
        for id in entries.drain(..) {
            ui.tree.destroy(id);
        }
        let style = screen.style_for(class);
        for name in names {
            let events = on_press(&self.tx, make(name.clone()));
            entries.push(ui.spawn(parent, entry(class, &style, &name, events)));
        }
    }

    fn update_selection(&self, ui: &mut Ui) {
        if let Some(ids) = &self.ids {
            let text = match (&self.genus, &self.species) {
                (Some(g), Some(s)) => format!("{g} / {s}"),
                (Some(g), None) => g.clone(),
                _ => String::new(),
            };
            ui.tree.set_value(ids.selection, text);
        }
    }

    fn handle(&mut self, cx: &mut StateContext<'_>, input: Input) {
        match input {
            Input::Genus(genus) => {
                for id in self.species_entries.drain(..) {
                    cx.ui.tree.destroy(id);
                }
                self.species = None;
                self.genus = Some(genus.clone());
                self.update_selection(cx.ui);
                let _ = self.work_tx.send(Work::Species(genus));
            }
            Input::Species(species) => {
                self.species = Some(species);
                self.update_selection(cx.ui);
            }
            Input::Create => {
                let Some(ids) = &self.ids else {
                    return;
                };
                let name = cx.ui.tree.value(ids.name).unwrap_or_default().trim().to_string();
                let problem = if name.is_empty() {
                    Some("enter a name")
                } else if self.genus.is_none() {
                    Some("choose a genus")
                } else if self.species.is_none() {
                    Some("choose a species")
                } else {
                    None
                };
                if let Some(problem) = problem {
                    cx.ui.tree.set_value(ids.message, problem);
                    return;
                }
                if let (Some(genus), Some(species)) = (self.genus.clone(), self.species.clone()) {
                    cx.ui.tree.set_value(ids.message, "");
                    let _ = self.work_tx.send(Work::Create {
                        name,
                        genus,
                        species,
                    });
                }
            }
            Input::Back => cx.transitions.send(Transition::Pop(StateArgs::None)),
        }
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Default for CharacterCreationState {
    fn default() -> Self {
        Self::new()
    }
}

fn run(
    wcx: WorkerContext,
    message: ElementId,
    close: Receiver<()>,
    input: Receiver<Work>,
    listed: Sender<Listed>,
) -> Result<()> {
    wcx.send(&Command::QueryGenera { genera: Vec::new() })?;
    let session = Session::new(&wcx.conn, close, input);
    let mut creating = false;
    loop {
        match session.next() {
            Wake::Input(Work::Species(genus)) => {
                wcx.send(&Command::QuerySpecies {
                    genus,
                    species: Vec::new(),
                })?;
            }
            Wake::Input(Work::Create {
                name,
                genus,
                species,
            }) => {
                wcx.ui.update(message, Update::Value("Creating".into()));
                wcx.send(&Command::Character {
                    kind: CharacterKind::CreateCharacter,
                    characters: vec![name],
                    genus: Some(genus),
                    species: Some(species),
                })?;
                creating = true;
            }
            Wake::Server(Command::QueryGenera { genera }) => {
                let _ = listed.send(Listed::Genera(genera));
            }
            Wake::Server(Command::QuerySpecies { genus, species }) => {
                let _ = listed.send(Listed::Species { genus, species });
            }
            Wake::Server(Command::Basic {
                kind: BasicKind::Ok,
                message: text,
            }) if creating => {
                let text = if text.is_empty() {
                    "Character created".to_string()
                } else {
                    text
                };
                wcx.transitions.send(Transition::Pop(StateArgs::Info(text)));
                return Ok(());
            }
            Wake::Server(Command::Basic { message: text, .. }) => {
                creating = false;
                wcx.ui.update(message, Update::Value(text));
            }
            Wake::Server(other) => log::debug!("character creation ignoring {}", other.name()),
            Wake::Closed => {
                wcx.disconnected();
                return Ok(());
            }
            Wake::Stop | Wake::Timeout => return Ok(()),
        }
    }
}

impl State for CharacterCreationState {
    fn kind(&self) -> StateKind {
        StateKind::CharacterCreation
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        _args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let configs = buttons(&self.tx, [("Create", Input::Create), ("Back", Input::Back)]);
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "character_creation", configs)?;
        let ids = Ids {
            name: screen.find(cx.ui, "Name")?,
            genera: screen.find(cx.ui, "Genera")?,
            species: screen.find(cx.ui, "Species")?,
            selection: screen.find(cx.ui, "Selection")?,
            message: screen.find(cx.ui, "Message")?,
        };
        let wcx = WorkerContext::new(cx)?;
        let input = self.work_rx.clone();
        let listed = self.listed_tx.clone();
        let message = ids.message;
        self.screen = Some(screen);
        self.ids = Some(ids);
        self.worker = Some(Worker::spawn(
            "character-creation",
            cx.transitions.clone(),
            move |close| run(wcx, message, close, input, listed),
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
        self.stop();
        if let Some(screen) = self.screen.take() {
            screen.destroy(cx.ui);
        }
        self.genus_entries.clear();
        self.species_entries.clear();
        self.ids = None;
    }

    fn frame(&mut self, cx: &mut StateContext<'_>, _now: Instant) {
        while let Ok(listed) = self.listed_rx.try_recv() {
            self.list(cx.ui, listed);
        }
        while let Ok(input) = self.rx.try_recv() {
            self.handle(cx, input);
        }
    }
}
