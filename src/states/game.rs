//! The in-game screen.
//!
//! The worker applies server commands to the shared world and forwards
//! whatever needs element work to the UI thread, which owns the map
//! renderer, the chat log, and the key bindings.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::Screen;
use super::{Session, State, StateArgs, StateContext, StateKind, Transition, Wake, Worker, WorkerContext};
use crate::error::Result;
use crate::game::history::{CHAT_CAPACITY, format_message};
use crate::game::{Effect, GameContext, InputHistory, MessageLog, Request, dispatch, game_bindings};
use crate::net::Command;
use crate::net::protocol::{ChatMessage, MessageKind};
use crate::render::{MapInput, MapRenderer, render_inventory, render_status};
use crate::ui::element::{ElementKind, ElementSpec, EventKind, Events, UiEvent};
use crate::ui::keybindings::Bindings;
use crate::ui::keys::{self, KeyEvent};
use crate::ui::layout::ElementConfig;
use crate::ui::{ElementId, Update};
use crate::world::World;

/// World and chat history, shared by the worker and the UI thread.
#[derive(Default)]
struct Shared {
    world: World,
    log: MessageLog,
}

type SharedRef = Arc<Mutex<Shared>>;

fn lock(shared: &SharedRef) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

struct Ids {
    map: ElementId,
    status: ElementId,
    inventory: ElementId,
    chat_log: ElementId,
    chat_input: ElementId,
}

pub struct GameState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    shared: SharedRef,
    renderer: Option<MapRenderer>,
    bindings: Bindings<GameContext>,
    context: GameContext,
    chat: VecDeque<ElementId>,
    chat_style: String,
    worker: Option<Worker>,
    lines_tx: Sender<String>,
    lines_rx: Receiver<String>,
    effects_tx: Sender<Effect>,
    effects_rx: Receiver<Effect>,
    map_rx: Option<Receiver<MapInput>>,
}

/// Handlers for the chat input: Return submits and blurs, Up and Down walk
/// the submitted lines.
pub fn chat_input_events(lines: Sender<String>) -> Events {
    let mut history = InputHistory::default();
    Events::new().on(EventKind::KeyDown, move |cx, ev| {
        let UiEvent::KeyDown { code, .. } = ev else {
            return true;
        };
        match *code {
            keys::RETURN | keys::KP_ENTER => {
                let line = cx.tree.value(cx.id).unwrap_or_default().to_string();
                cx.tree.set_value(cx.id, "");
                cx.tree.blur();
                if !line.trim().is_empty() {
                    history.push(&line);
                    let _ = lines.send(line);
                }
                false
            }
            keys::UP => {
                if let Some(line) = history.older() {
                    let line = line.to_string();
                    cx.tree.set_value(cx.id, line);
                }
                false
            }
            keys::DOWN => {
                if let Some(line) = history.newer() {
                    let line = line.to_string();
                    cx.tree.set_value(cx.id, line);
                }
                false
            }
            _ => true,
        }
    })
}

impl GameState {
    pub fn new() -> Self {
        let (lines_tx, lines_rx) = unbounded();
        let (effects_tx, effects_rx) = unbounded();
        Self {
            screen: None,
            ids: None,
            shared: Arc::default(),
            renderer: None,
            bindings: Bindings::new("/"),
            context: GameContext::default(),
            chat: VecDeque::new(),
            chat_style: String::new(),
            worker: None,
            lines_tx,
            lines_rx,
            effects_tx,
            effects_rx,
            map_rx: None,
        }
    }

    fn start(&mut self, cx: &StateContext<'_>) -> Result<()> {
        let Some(ids) = &self.ids else {
            return Ok(());
        };
        let wcx = WorkerContext::new(cx)?;
        let job = Job {
            shared: self.shared.clone(),
            effects: self.effects_tx.clone(),
            status: ids.status,
            inventory: ids.inventory,
        };
        let requests = cx.client.data.load_requests();
        self.worker = Some(Worker::spawn("game", cx.transitions.clone(), move |close| {
            job.run(wcx, close, requests)
        })?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn push_chat(&mut self, cx: &mut StateContext<'_>, message: &ChatMessage) {
        let Some(ids) = &self.ids else {
            return;
        };
        let spec = ElementSpec::new(ElementKind::Text)
            .class("ChatEntry")
            .style(self.chat_style.clone())
            .value(format_message(message));
        self.chat.push_back(cx.ui.spawn(ids.chat_log, spec));
        while self.chat.len() > CHAT_CAPACITY {
            if let Some(old) = self.chat.pop_front() {
                cx.ui.tree.destroy(old);
            }
        }
    }

    fn clear_chat(&mut self, cx: &mut StateContext<'_>) {
        for id in self.chat.drain(..) {
            cx.ui.tree.destroy(id);
        }
        lock(&self.shared).log.clear();
    }

    fn apply_effect(&mut self, cx: &mut StateContext<'_>, effect: Effect, now: Instant) {
        match effect {
            Effect::Chat(message) => self.push_chat(cx, &message),
            Effect::MapMessage { anchor, body } => {
                if let Some(renderer) = &mut self.renderer {
                    let shared = lock(&self.shared);
                    renderer.add_message(&mut cx.ui.tree, &shared.world, anchor, &body, now);
                }
            }
            Effect::MapChanged => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.clear(&mut cx.ui.tree);
                }
            }
            Effect::StatusChanged | Effect::InventoryChanged => {}
        }
    }

    /// Send what bindings queued and act on their requests.
    fn flush(&mut self, cx: &mut StateContext<'_>) {
        for command in self.context.outgoing.drain(..) {
            if let Err(e) = cx.client.send(&command) {
                log::warn!("failed to send {}: {e}", command.name());
            }
        }
        let requests: Vec<Request> = self.context.requests.drain(..).collect();
        for request in requests {
            match request {
                Request::FocusChat(text) => {
                    if let Some(ids) = &self.ids {
                        cx.ui.tree.set_value(ids.chat_input, text);
                        cx.ui.tree.apply(ids.chat_input, Update::Focus);
                    }
                }
                Request::ClearChat => self.clear_chat(cx),
                Request::Quit => {
                    log::info!("leaving the game");
                    cx.client.disconnect();
                    cx.transitions.send(Transition::PopToTop(StateArgs::None));
                }
            }
        }
    }

    fn submit(&mut self, cx: &mut StateContext<'_>, line: String) {
        match self.bindings.run_line(&mut self.context, &line) {
            Ok(true) => {}
            Ok(false) => self.context.send(Command::Message(ChatMessage {
                kind: MessageKind::Chat,
                ..ChatMessage::local(line)
            })),
            Err(e) => {
                let message = ChatMessage::local(e.to_string());
                lock(&self.shared).log.push(message.clone());
                self.push_chat(cx, &message);
            }
        }
        self.flush(cx);
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

struct Job {
    shared: SharedRef,
    effects: Sender<Effect>,
    status: ElementId,
    inventory: ElementId,
}

impl Job {
    fn run(self, wcx: WorkerContext, close: Receiver<()>, requests: Receiver<u32>) -> Result<()> {
        let session = Session::new(&wcx.conn, close, requests);
        loop {
            match session.next() {
                Wake::Server(command) => self.apply(&wcx, command),
                Wake::Input(image_id) => {
                    log::debug!("requesting image {image_id}");
                    wcx.send(&Command::Graphics {
                        id: image_id,
                        data: Vec::new(),
                    })?;
                }
                Wake::Closed => {
                    wcx.disconnected();
                    return Ok(());
                }
                Wake::Stop | Wake::Timeout => return Ok(()),
            }
        }
    }

    fn apply(&self, wcx: &WorkerContext, command: Command) {
        let mut shared = lock(&self.shared);
        let Shared { world, log } = &mut *shared;
        for effect in dispatch(command, world, &wcx.client.data, log) {
            match effect {
                Effect::StatusChanged => {
                    wcx.ui.update(self.status, Update::Value(render_status(world)));
                }
                Effect::InventoryChanged => {
                    wcx.ui
                        .update(self.inventory, Update::Value(render_inventory(world)));
                }
                other => {
                    let _ = self.effects.send(other);
                }
            }
        }
    }
}

impl State for GameState {
    fn kind(&self) -> StateKind {
        StateKind::Game
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        _args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let mut configs = std::collections::HashMap::new();
        configs.insert(
            "ChatInput".to_string(),
            ElementConfig::events(chat_input_events(self.lines_tx.clone())),
        );
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "game", configs)?;
        let ids = Ids {
            map: screen.find(cx.ui, "Map")?,
            status: screen.find(cx.ui, "Status")?,
            inventory: screen.find(cx.ui, "Inventory")?,
            chat_log: screen.find(cx.ui, "ChatLog")?,
            chat_input: screen.find(cx.ui, "ChatInput")?,
        };

        let (map_tx, map_rx) = unbounded();
        let mut renderer = MapRenderer::new(cx.client.data.clone(), cx.client.scale, map_tx);
        renderer.attach(ids.map);
        renderer.message_style = screen.style_for("MapMessage");
        self.chat_style = screen.style_for("ChatEntry");
        self.renderer = Some(renderer);
        self.map_rx = Some(map_rx);

        {
            let config = cx.client.config();
            self.bindings = game_bindings(&config.game.command_prefix);
            self.bindings.apply_overrides(&config.game.bindings);
        }

        self.screen = Some(screen);
        self.ids = Some(ids);
        self.start(cx)?;
        Ok(None)
    }

    fn enter(&mut self, cx: &mut StateContext<'_>, _args: StateArgs) {
        if let Some(screen) = &self.screen {
            screen.show(cx.ui);
        }
        if self.worker.is_none()
            && let Err(e) = self.start(cx)
        {
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
        if let Some(mut renderer) = self.renderer.take() {
            renderer.clear(&mut cx.ui.tree);
        }
        if let Some(screen) = self.screen.take() {
            screen.destroy(cx.ui);
        }
        self.chat.clear();
        self.ids = None;
        self.bindings.reset();
    }

    fn frame(&mut self, cx: &mut StateContext<'_>, now: Instant) {
        while let Ok(effect) = self.effects_rx.try_recv() {
            self.apply_effect(cx, effect, now);
        }

        if let Some(renderer) = &mut self.renderer {
            let mut shared = lock(&self.shared);
            renderer.update(&mut cx.ui.tree, &mut shared.world, now);
        }

        let picks: Vec<MapInput> = self
            .map_rx
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for pick in picks {
            let command = match pick {
                MapInput::Inspect(object_id) => Command::Inspect { object_id },
                MapInput::Interact(object_id) => Command::ExtCmd {
                    cmd: "interact".into(),
                    args: vec![object_id.to_string()],
                },
            };
            self.context.send(command);
        }

        let lines: Vec<String> = self.lines_rx.try_iter().collect();
        for line in lines {
            self.submit(cx, line);
        }
        self.flush(cx);
    }

    fn key(&mut self, cx: &mut StateContext<'_>, key: KeyEvent) -> bool {
        let fired = self.bindings.handle_key(&mut self.context, key);
        self.flush(cx);
        !fired.is_empty()
    }

    fn key_consumed(&mut self, _cx: &mut StateContext<'_>, key: KeyEvent) {
        self.bindings.observe(key);
    }
}
