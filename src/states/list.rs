use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::screen::{Screen, buttons, entry, on_enter, on_press};
use super::{State, StateArgs, StateContext, StateKind, Transition};
use crate::error::Result;
use crate::ui::layout::ElementConfig;
use crate::ui::{ElementId, Ui};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Select(String),
    Connect,
    Delete,
}

struct Ids {
    servers: ElementId,
    host: ElementId,
    error: ElementId,
}

/// Bottom of the stack: saved servers and a host:port box.
pub struct ListState {
    screen: Option<Screen>,
    ids: Option<Ids>,
    entries: Vec<ElementId>,
    selected: Option<String>,
    tx: Sender<Input>,
    rx: Receiver<Input>,
}

impl ListState {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            screen: None,
            ids: None,
            entries: Vec::new(),
            selected: None,
            tx,
            rx,
        }
    }

    fn refresh(&mut self, cx: &mut StateContext<'_>) {
        let (Some(screen), Some(ids)) = (&self.screen, &self.ids) else {
            return;
        };
        for id in self.entries.drain(..) {
            cx.ui.tree.destroy(id);
        }
        let style = screen.style_for("ServerEntry");
        let hosts: Vec<String> = cx.client.config().servers.keys().cloned().collect();
        for host in hosts {
            let events = on_press(&self.tx, Input::Select(host.clone()));
            let spec = entry("ServerEntry", &style, &host, events);
            self.entries.push(cx.ui.spawn(ids.servers, spec));
        }
    }

    fn show_error(&self, ui: &mut Ui, args: &StateArgs) {
        if let Some(ids) = &self.ids {
            let text = match args {
                StateArgs::Error(m) => m.as_str(),
                _ => "",
            };
            ui.tree.set_value(ids.error, text);
        }
    }

    fn handle(&mut self, cx: &mut StateContext<'_>, input: Input) {
        let Some(ids) = &self.ids else {
            return;
        };
        match input {
            Input::Select(host) => {
                cx.ui.tree.set_value(ids.host, host.clone());
                self.selected = Some(host);
            }
            Input::Connect => {
                let host = cx.ui.tree.value(ids.host).unwrap_or_default().trim().to_string();
                if host.is_empty() {
                    cx.ui.tree.set_value(ids.error, "enter host:port");
                    return;
                }
                cx.ui.tree.set_value(ids.error, "");
                cx.transitions
                    .send(Transition::Push(StateKind::Handshake, StateArgs::Host(host)));
            }
            Input::Delete => {
                let Some(host) = self.selected.take() else {
                    return;
                };
                let removed = cx.client.config().servers.remove(&host).is_some();
                if removed {
                    log::info!("forgetting server {host}");
                    cx.client.save_config();
                }
                cx.ui.tree.set_value(ids.host, "");
                self.refresh(cx);
            }
        }
    }
}

impl Default for ListState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for ListState {
    fn kind(&self) -> StateKind {
        StateKind::List
    }

    fn init(
        &mut self,
        cx: &mut StateContext<'_>,
        args: StateArgs,
    ) -> Result<Option<(StateKind, StateArgs)>> {
        let mut configs = buttons(
            &self.tx,
            [("Connect", Input::Connect), ("Delete", Input::Delete)],
        );
        configs.insert(
            "Host".into(),
            ElementConfig::events(on_enter(&self.tx, Input::Connect)),
        );
        let share = cx.client.paths.share_dir.clone();
        let screen = Screen::load(cx.ui, share.as_deref(), "list", configs)?;
        let ids = Ids {
            servers: screen.find(cx.ui, "Servers")?,
            host: screen.find(cx.ui, "Host")?,
            error: screen.find(cx.ui, "Error")?,
        };
        let last = cx.client.config().last_server.clone();
        if !last.is_empty() {
            cx.ui.tree.set_value(ids.host, last.clone());
            self.selected = Some(last);
        }
        self.screen = Some(screen);
        self.ids = Some(ids);
        self.refresh(cx);
        self.show_error(cx.ui, &args);

        if let Some(host) = cx.client.take_autoconnect() {
            cx.transitions
                .send(Transition::Push(StateKind::Handshake, StateArgs::Host(host)));
        }
        Ok(None)
    }

    fn enter(&mut self, cx: &mut StateContext<'_>, args: StateArgs) {
        cx.client.disconnect();
        if let Some(screen) = &self.screen {
            screen.show(cx.ui);
        }
        self.refresh(cx);
        self.show_error(cx.ui, &args);
    }

    fn leave(&mut self, cx: &mut StateContext<'_>) {
        if let Some(screen) = &self.screen {
            screen.hide(cx.ui);
        }
    }

    fn close(&mut self, cx: &mut StateContext<'_>) {
        if let Some(screen) = self.screen.take() {
            screen.destroy(cx.ui);
        }
        self.entries.clear();
        self.ids = None;
    }

    fn frame(&mut self, cx: &mut StateContext<'_>, _now: Instant) {
        while let Ok(input) = self.rx.try_recv() {
            self.handle(cx, input);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cli::Cli;
    use crate::client::Client;
    use crate::config::{Config, ServerConfig};
    use crate::paths::Paths;
    use crate::states::StateMachine;
    use crate::ui::MonoMeasurer;
    use crate::ui::element::{MouseButton, UiEvent};

    fn setup(cli: Cli, tag: &str) -> (StateMachine, Ui) {
        let mut config = Config::default();
        config
            .servers
            .insert("a.example:1".into(), ServerConfig::default());
        config
            .servers
            .insert("b.example:2".into(), ServerConfig::default());
        let dir = std::env::temp_dir().join(format!("chimera-list-{tag}-{}", std::process::id()));
        let client = Arc::new(Client::new(&cli, Paths::rooted(&dir), config));
        let ui = Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
        (StateMachine::new(client), ui)
    }

    fn click(ui: &mut Ui, class: &str) {
        let id = ui.tree.find(class).expect("element");
        ui.tree.fire(
            id,
            &UiEvent::Pressed {
                button: MouseButton::Left,
                x: 0.0,
                y: 0.0,
            },
        );
    }

    #[test]
    fn lists_saved_servers_and_shows_errors() {
        let (mut m, mut ui) = setup(Cli::default(), "errors");
        m.apply(
            &mut ui,
            Transition::Push(StateKind::List, StateArgs::Error("connection refused".into())),
        );
        let list = ui.tree.find("ServerList").expect("list");
        assert_eq!(ui.tree.find_all_in(list, "ServerEntry").len(), 2);
        let error = ui.tree.find("Error").expect("error");
        assert_eq!(ui.tree.value(error), Some("connection refused"));
    }

    #[test]
    fn autoconnect_failure_comes_back_with_an_error() {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("port")
            .port();
        let (mut m, mut ui) = setup(
            Cli {
                connect: Some(format!("127.0.0.1:{port}")),
                ..Default::default()
            },
            "autoconnect",
        );
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        let error = ui.tree.find("Error").expect("error");
        let deadline = Instant::now() + Duration::from_secs(5);
        while ui.tree.value(error).unwrap_or_default().is_empty() && Instant::now() < deadline {
            m.tick(&mut ui, Instant::now());
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(m.kinds(), vec![StateKind::List]);
        assert!(!ui.tree.value(error).unwrap_or_default().is_empty());
    }

    #[test]
    fn empty_host_is_rejected_inline() {
        let (mut m, mut ui) = setup(Cli::default(), "empty");
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        let host = ui.tree.find("Host").expect("host");
        ui.tree.set_value(host, "  ");
        click(&mut ui, "Connect");
        m.tick(&mut ui, Instant::now());
        assert_eq!(m.top(), Some(StateKind::List));
        let error = ui.tree.find("Error").expect("error");
        assert_eq!(ui.tree.value(error), Some("enter host:port"));
    }

    #[test]
    fn delete_forgets_the_selected_server() {
        let (mut m, mut ui) = setup(Cli::default(), "delete");
        m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
        let list = ui.tree.find("ServerList").expect("list");
        let first = ui.tree.find_all_in(list, "ServerEntry")[0];
        ui.tree.fire(
            first,
            &UiEvent::Pressed {
                button: MouseButton::Left,
                x: 0.0,
                y: 0.0,
            },
        );
        m.tick(&mut ui, Instant::now());
        click(&mut ui, "Delete");
        m.tick(&mut ui, Instant::now());
        assert_eq!(ui.tree.find_all_in(list, "ServerEntry").len(), 1);
        assert_eq!(m.client().config().servers.len(), 1);
    }
}
