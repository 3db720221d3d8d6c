//! End-to-end flows against a scripted loopback server. No window or GPU:
//! the UI runs headless with a monospace measurer.

use std::collections::BTreeMap;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;

use chimera::cli::Cli;
use chimera::client::Client;
use chimera::config::Config;
use chimera::data::DataManager;
use chimera::game::bindings::{GameContext, game_bindings};
use chimera::game::dispatch::{Effect, dispatch};
use chimera::game::history::{CHAT_CAPACITY, MessageLog};
use chimera::net::codec;
use chimera::net::protocol::{
    AnimationsConfig, BasicKind, CharacterKind, ChatMessage, Command, Features, LoginKind,
    MapInfo, MessageKind, ObjectPayload, ObjectType, PROTOCOL_VERSION, Point, TileLight,
};
use chimera::paths::Paths;
use chimera::render::MapRenderer;
use chimera::states::{StateArgs, StateKind, StateMachine, Transition};
use chimera::ui::keys::{self, KeyEvent, ascii};
use chimera::ui::{ElementKind, ElementSpec, ElementTree, MonoMeasurer, MouseButton, Ui, UiEvent};
use chimera::world::World;

const PATIENCE: Duration = Duration::from_secs(5);

/// The server end of one connection.
struct Peer {
    stream: TcpStream,
}

impl Peer {
    fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().expect("accept");
        stream.set_read_timeout(Some(PATIENCE)).expect("timeout");
        Self { stream }
    }

    fn send(&mut self, command: Command) {
        codec::write_frame(&mut self.stream, &command).expect("write");
    }

    /// Read until a command matches, skipping anything else.
    fn expect(&mut self, what: impl Fn(&Command) -> bool) -> Command {
        loop {
            let command = codec::read_frame(&mut self.stream).expect("read");
            if what(&command) {
                return command;
            }
        }
    }

    /// Handshake and features, as a server greets every client.
    fn greet(&mut self) -> Command {
        let hello = self.expect(|c| matches!(c, Command::Handshake { .. }));
        self.send(Command::Handshake {
            version: PROTOCOL_VERSION,
            program: "srv".into(),
        });
        self.send(Command::Features(features()));
        hello
    }
}

fn features() -> Features {
    Features {
        animations: AnimationsConfig {
            tile_width: 16,
            tile_height: 16,
            y_step: Point::new(8, -4),
            adjustments: BTreeMap::new(),
        },
        slots: Vec::new(),
        type_hints: Vec::new(),
    }
}

fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let host = listener.local_addr().expect("addr").to_string();
    (listener, host)
}

fn start(tag: &str, cli: Cli) -> (StateMachine, Ui) {
    let dir = std::env::temp_dir().join(format!("chimera-scenario-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let client = Arc::new(Client::new(&cli, Paths::rooted(&dir), Config::default()));
    let mut ui = Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
    let mut m = StateMachine::new(client);
    m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
    (m, ui)
}

fn pump_until(m: &mut StateMachine, ui: &mut Ui, what: impl Fn(&StateMachine, &Ui) -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        m.tick(ui, Instant::now());
        ui.frame(Instant::now());
        if what(m, ui) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn handshake_success_lands_on_login() {
    let (listener, host) = listen();
    let server = thread::spawn(move || {
        let mut peer = Peer::accept(&listener);
        let hello = peer.greet();
        (peer, hello)
    });

    let cli = Cli {
        connect: Some(host),
        ..Default::default()
    };
    let (mut m, mut ui) = start("handshake", cli);
    assert!(pump_until(&mut m, &mut ui, |m, _| m.top() == Some(StateKind::Login)));
    assert_eq!(m.kinds(), vec![StateKind::List, StateKind::Login]);

    let (_peer, hello) = server.join().expect("server");
    assert_eq!(hello, Command::client_handshake());
    assert_eq!(m.client().data.features(), features());
}

#[test]
fn login_character_game_and_disconnect() {
    let (listener, host) = listen();
    let (hang_up_tx, hang_up_rx) = bounded::<()>(1);
    let server = thread::spawn(move || {
        let mut peer = Peer::accept(&listener);
        peer.greet();

        let login = peer.expect(|c| matches!(c, Command::Login { .. }));
        assert_eq!(
            login,
            Command::Login {
                kind: LoginKind::Login,
                user: "alice".into(),
                pass: "hunter2".into(),
                email: None,
            }
        );
        peer.send(Command::basic(BasicKind::Ok, "hi"));

        peer.expect(|c| {
            matches!(
                c,
                Command::Character {
                    kind: CharacterKind::QueryCharacters,
                    ..
                }
            )
        });
        peer.send(Command::characters(
            CharacterKind::CreateCharacter,
            vec!["rog".into(), "wiz".into()],
        ));

        let chosen = peer.expect(|c| {
            matches!(
                c,
                Command::Character {
                    kind: CharacterKind::ChooseCharacter,
                    ..
                }
            )
        });
        assert_eq!(
            chosen,
            Command::characters(CharacterKind::ChooseCharacter, vec!["rog".into()])
        );
        peer.send(Command::basic(BasicKind::Ok, ""));

        let _ = hang_up_rx.recv_timeout(PATIENCE);
        let _ = peer.stream.shutdown(std::net::Shutdown::Both);
    });

    let cli = Cli {
        connect: Some(host.clone()),
        username: Some("alice".into()),
        password: Some("hunter2".into()),
        ..Default::default()
    };
    let (mut m, mut ui) = start("flow", cli);

    assert!(pump_until(&mut m, &mut ui, |_, ui| {
        ui.tree.find_all_in(ui.root(), "CharacterEntry").len() == 2
    }));
    assert_eq!(m.top(), Some(StateKind::CharacterSelection));
    let entries = ui.tree.find_all_in(ui.root(), "CharacterEntry");
    let names: Vec<_> = entries.iter().filter_map(|id| ui.tree.value(*id)).collect();
    assert_eq!(names, vec!["rog", "wiz"]);

    let rog = entries[0];
    ui.tree.fire(
        rog,
        &UiEvent::Pressed {
            button: MouseButton::Left,
            x: 0.0,
            y: 0.0,
        },
    );
    assert!(pump_until(&mut m, &mut ui, |m, _| m.top() == Some(StateKind::Game)));
    assert_eq!(
        m.kinds(),
        vec![
            StateKind::List,
            StateKind::Login,
            StateKind::CharacterSelection,
            StateKind::Game
        ]
    );
    {
        let config = m.client().config();
        let saved = config.servers.get(&host).expect("server remembered");
        assert_eq!(saved.username, "alice");
        assert_eq!(saved.character, "rog");
    }

    let _ = hang_up_tx.send(());
    assert!(pump_until(&mut m, &mut ui, |m, _| m.depth() == 1));
    assert_eq!(m.kinds(), vec![StateKind::List]);
    assert!(ui.tree.find("Servers").is_some());
    server.join().expect("server");
}

#[test]
fn held_movement_key_starts_and_stops_running() {
    let mut bindings = game_bindings("/");
    let mut cx = GameContext::default();
    let k = ascii('k');
    bindings.handle_key(&mut cx, KeyEvent::press(k));
    bindings.handle_key(&mut cx, KeyEvent::repeat(k));
    bindings.handle_key(&mut cx, KeyEvent::repeat(k));
    bindings.handle_key(&mut cx, KeyEvent::release(k));
    assert_eq!(
        cx.outgoing,
        vec![
            Command::Cmd {
                cmd: "north".into()
            },
            Command::RepeatCmd {
                cmd: "north".into(),
                cancel: false,
                data: Vec::new(),
            },
            Command::RepeatCmd {
                cmd: "north".into(),
                cancel: true,
                data: Vec::new(),
            },
        ]
    );
}

#[test]
fn movement_still_works_after_chat_takes_the_slash_release() {
    let mut bindings = game_bindings("/");
    let mut cx = GameContext::default();
    let fired = bindings.handle_key(&mut cx, KeyEvent::press(keys::SLASH));
    assert_eq!(fired, vec!["command"]);
    // Chat now has focus and swallows the release.
    bindings.observe(KeyEvent::release(keys::SLASH));
    let fired = bindings.handle_key(&mut cx, KeyEvent::press(ascii('k')));
    assert_eq!(fired, vec!["north"]);
    assert_eq!(
        cx.outgoing,
        vec![Command::Cmd {
            cmd: "north".into()
        }]
    );
}

#[test]
fn player_message_floats_over_the_speaker_then_expires() {
    let data = Arc::new(DataManager::new());
    data.set_features(features());
    let mut world = World::new();
    world.set_map(&MapInfo {
        map_id: 1,
        height: 8,
        width: 8,
        depth: 8,
        ..Default::default()
    });
    world.apply_object(
        42,
        ObjectPayload::Create {
            kind: ObjectType::Pc,
            animation_id: 0,
            face_id: 0,
            h: 2,
            w: 1,
            d: 1,
            reach: 0,
        },
    );
    world.set_tile(5, 5, 1, &[42], TileLight::default());

    let mut tree = ElementTree::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
    let root = tree.root();
    let map = tree.spawn(
        root,
        ElementSpec::new(ElementKind::Container)
            .class("Map")
            .style("W 100%\nH 100%"),
    );
    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut renderer = MapRenderer::new(data.clone(), 1.0, tx);
    renderer.attach(map);

    let mut log = MessageLog::new(CHAT_CAPACITY);
    let body = "hello world this is a test";
    let effects = dispatch(
        Command::Message(ChatMessage {
            kind: MessageKind::Pc,
            from: "bob".into(),
            from_object_id: Some(42),
            title: String::new(),
            body: body.into(),
        }),
        &mut world,
        &data,
        &mut log,
    );
    assert_eq!(log.len(), 1);

    let t0 = Instant::now();
    renderer.update(&mut tree, &mut world, t0);
    let mut spawned = None;
    for effect in effects {
        if let Effect::MapMessage { anchor, body } = effect {
            spawned = renderer.add_message(&mut tree, &world, anchor, &body, t0);
        }
    }
    let message = spawned.expect("floating message");
    assert_eq!(tree.get(message).and_then(|e| e.parent), Some(map));
    assert_eq!(tree.value(message), Some(body));

    renderer.update(&mut tree, &mut world, t0 + Duration::from_millis(3999));
    assert!(tree.contains(message));
    renderer.update(&mut tree, &mut world, t0 + Duration::from_secs(4));
    assert!(!tree.contains(message));
    assert!(tree.find_in(map, "MapMessage").is_none());
}
