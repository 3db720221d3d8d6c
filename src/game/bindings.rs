//! The in-game command set and its default keys.

use crate::error::{ClientError, Result};
use crate::net::protocol::{ChatMessage, Command, Direction, MessageKind};
use crate::ui::keybindings::{Bindings, KeyGroup};
use crate::ui::keys::{self, ascii};

/// Requests a binding makes of the game screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Focus the chat input, replacing its text.
    FocusChat(String),
    ClearChat,
    Quit,
}

/// What in-game commands act on. The screen flushes both queues after
/// every key or command line.
#[derive(Debug, Default)]
pub struct GameContext {
    pub outgoing: Vec<Command>,
    pub requests: Vec<Request>,
}

impl GameContext {
    pub fn send(&mut self, command: Command) {
        self.outgoing.push(command);
    }
}

/// Movement keys: vi letters plus the arrows for the four cardinals.
const MOVES: [(Direction, &[char], Option<u32>); 8] = [
    (Direction::West, &['h'], Some(keys::LEFT)),
    (Direction::South, &['j'], Some(keys::DOWN)),
    (Direction::North, &['k'], Some(keys::UP)),
    (Direction::East, &['l'], Some(keys::RIGHT)),
    (Direction::Northwest, &['y'], None),
    (Direction::Northeast, &['u'], None),
    (Direction::Southwest, &['b'], None),
    (Direction::Southeast, &['n'], None),
];

fn register_movement(b: &mut Bindings<GameContext>) {
    for (direction, letters, arrow) in MOVES {
        let name = direction.name();
        b.register(name, move |cx: &mut GameContext, _: &[String]| {
            cx.send(Command::Cmd {
                cmd: name.to_string(),
            });
            Ok(())
        });
        b.register(format!("{name} run"), move |cx: &mut GameContext, _: &[String]| {
            cx.send(Command::RepeatCmd {
                cmd: name.to_string(),
                cancel: false,
                data: Vec::new(),
            });
            Ok(())
        });
        b.register(
            format!("{name} run stop"),
            move |cx: &mut GameContext, _: &[String]| {
                cx.send(Command::RepeatCmd {
                    cmd: name.to_string(),
                    cancel: true,
                    data: Vec::new(),
                });
                Ok(())
            },
        );

        let codes = letters.iter().map(|c| ascii(*c)).chain(arrow);
        for code in codes {
            b.bind(name, KeyGroup::press(code));
            b.bind(format!("{name} run"), KeyGroup::press(code).on_repeat(1));
            b.bind(
                format!("{name} run stop"),
                KeyGroup::press(code).released().on_repeat(1),
            );
        }
    }
}

fn parse_direction(args: &[String]) -> Result<Option<Direction>> {
    match args {
        [] => Ok(None),
        [dir] => dir
            .parse()
            .map(Some)
            .map_err(|_| ClientError::Binding(format!("unknown direction: {dir}"))),
        _ => Err(ClientError::Binding("usage: attack [direction]".into())),
    }
}

/// The full in-game binding table with default keys.
pub fn game_bindings(prefix: &str) -> Bindings<GameContext> {
    let mut b = Bindings::new(prefix);
    register_movement(&mut b);

    b.register("chat", |cx: &mut GameContext, _: &[String]| {
        cx.requests.push(Request::FocusChat(String::new()));
        Ok(())
    });
    b.bind("chat", KeyGroup::press(keys::RETURN));
    b.bind("chat", KeyGroup::press(keys::KP_ENTER));

    let command_prefix = prefix.to_string();
    b.register("command", move |cx: &mut GameContext, _: &[String]| {
        cx.requests.push(Request::FocusChat(command_prefix.clone()));
        Ok(())
    });
    b.bind("command", KeyGroup::press(keys::SLASH));

    b.register("quit", |cx: &mut GameContext, _: &[String]| {
        cx.requests.push(Request::Quit);
        Ok(())
    });
    b.bind("quit", KeyGroup::press(keys::ESCAPE));

    b.register("attack", |cx: &mut GameContext, args: &[String]| {
        let direction = parse_direction(args)?;
        cx.send(Command::Attack { direction });
        Ok(())
    });
    b.bind("attack", KeyGroup::press(ascii('a')));

    b.register("say", |cx: &mut GameContext, args: &[String]| {
        if args.is_empty() {
            return Err(ClientError::Binding("usage: say <message>".into()));
        }
        cx.send(Command::Message(ChatMessage {
            kind: MessageKind::Chat,
            ..ChatMessage::local(args.join(" "))
        }));
        Ok(())
    });

    b.register("clear", |cx: &mut GameContext, _: &[String]| {
        cx.requests.push(Request::ClearChat);
        Ok(())
    });

    b.register("inspect", |cx: &mut GameContext, args: &[String]| {
        let [id] = args else {
            return Err(ClientError::Binding("usage: inspect <object id>".into()));
        };
        let object_id = id
            .parse()
            .map_err(|_| ClientError::Binding(format!("bad object id: {id}")))?;
        cx.send(Command::Inspect { object_id });
        Ok(())
    });

    // Raw passthrough; `cmd [a*2, b]` lists are expanded before lookup.
    b.register("cmd", |cx: &mut GameContext, args: &[String]| {
        if args.is_empty() {
            return Err(ClientError::Binding("usage: cmd <command>".into()));
        }
        cx.send(Command::Cmd {
            cmd: args.join(" "),
        });
        Ok(())
    });

    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::keys::KeyEvent;

    #[test]
    fn movement_press_hold_release() {
        let mut b = game_bindings("/");
        let mut cx = GameContext::default();
        let k = ascii('k');
        assert_eq!(k, 107);
        assert_eq!(b.handle_key(&mut cx, KeyEvent::press(k)), vec!["north"]);
        assert_eq!(b.handle_key(&mut cx, KeyEvent::repeat(k)), vec!["north run"]);
        assert!(b.handle_key(&mut cx, KeyEvent::repeat(k)).is_empty());
        assert_eq!(
            b.handle_key(&mut cx, KeyEvent::release(k)),
            vec!["north run stop"]
        );
        assert_eq!(
            cx.outgoing,
            vec![
                Command::Cmd { cmd: "north".into() },
                Command::RepeatCmd {
                    cmd: "north".into(),
                    cancel: false,
                    data: vec![]
                },
                Command::RepeatCmd {
                    cmd: "north".into(),
                    cancel: true,
                    data: vec![]
                },
            ]
        );
    }

    #[test]
    fn tap_sends_a_single_step() {
        let mut b = game_bindings("/");
        let mut cx = GameContext::default();
        b.handle_key(&mut cx, KeyEvent::press(ascii('n')));
        b.handle_key(&mut cx, KeyEvent::release(ascii('n')));
        assert_eq!(
            cx.outgoing,
            vec![Command::Cmd {
                cmd: "southeast".into()
            }]
        );
    }

    #[test]
    fn slash_commands() {
        let mut b = game_bindings("/");
        let mut cx = GameContext::default();
        assert!(b.run_line(&mut cx, "/say hello there").expect("say"));
        assert!(b.run_line(&mut cx, "/attack ne").expect("attack"));
        assert!(b.run_line(&mut cx, "/inspect 12").expect("inspect"));
        assert!(b.run_line(&mut cx, "/cmd [west*2, north run]").expect("cmd list"));
        assert!(!b.run_line(&mut cx, "hello").expect("plain chat"));
        assert_eq!(cx.outgoing.len(), 6);
        assert!(matches!(&cx.outgoing[0], Command::Message(m) if m.body == "hello there" && m.kind == MessageKind::Chat));
        assert_eq!(
            cx.outgoing[1],
            Command::Attack {
                direction: Some(Direction::Northeast)
            }
        );
        assert_eq!(cx.outgoing[2], Command::Inspect { object_id: 12 });
        assert_eq!(cx.outgoing[3], Command::Cmd { cmd: "west".into() });
        assert_eq!(cx.outgoing[4], Command::Cmd { cmd: "west".into() });
        assert!(matches!(&cx.outgoing[5], Command::RepeatCmd { cancel: false, .. }));
    }

    #[test]
    fn bad_arguments_are_binding_errors() {
        let mut b = game_bindings("/");
        let mut cx = GameContext::default();
        assert!(matches!(
            b.run_line(&mut cx, "/attack sideways"),
            Err(ClientError::Binding(_))
        ));
        assert!(matches!(
            b.run_line(&mut cx, "/inspect"),
            Err(ClientError::Binding(_))
        ));
        assert!(matches!(
            b.run_line(&mut cx, "/dance"),
            Err(ClientError::Binding(m)) if m == "unknown command: dance"
        ));
        assert!(cx.outgoing.is_empty());
    }

    #[test]
    fn ui_keys_become_requests() {
        let mut b = game_bindings("/");
        let mut cx = GameContext::default();
        b.handle_key(&mut cx, KeyEvent::press(keys::RETURN));
        b.handle_key(&mut cx, KeyEvent::release(keys::RETURN));
        b.handle_key(&mut cx, KeyEvent::press(keys::SLASH));
        b.handle_key(&mut cx, KeyEvent::release(keys::SLASH));
        b.handle_key(&mut cx, KeyEvent::press(keys::ESCAPE));
        assert_eq!(
            cx.requests,
            vec![
                Request::FocusChat(String::new()),
                Request::FocusChat("/".into()),
                Request::Quit
            ]
        );
    }
}
