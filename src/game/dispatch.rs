//! Routing of in-game server commands into the world, the data cache, and
//! the message log. Pure with respect to the UI: everything the screen has
//! to do in response comes back as an [`Effect`].

use crate::data::DataManager;
use crate::game::history::MessageLog;
use crate::net::protocol::{BasicKind, ChatMessage, Command, MessageKind, ObjectPayload};
use crate::render::Anchor;
use crate::world::World;

/// Follow-up work for the game screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a line to the chat log.
    Chat(ChatMessage),
    /// Float a message over the map.
    MapMessage { anchor: Anchor, body: String },
    StatusChanged,
    InventoryChanged,
    MapChanged,
}

/// Apply one server command.
pub fn dispatch(
    command: Command,
    world: &mut World,
    data: &DataManager,
    log: &mut MessageLog,
) -> Vec<Effect> {
    log::debug!("dispatch {}", command.name());
    let mut effects = Vec::new();
    match command {
        Command::Graphics { id, data: bytes } => {
            if let Err(e) = data.set_graphics(id, &bytes) {
                log::warn!("graphics {id}: {e}");
            }
        }
        Command::Animation(animation) => data.set_animation(animation),
        Command::Sound { id, data: bytes } => data.set_sound(id, bytes),
        Command::Audio { id, data: bytes } => data.set_audio(id, bytes),
        Command::Features(features) => data.set_features(features),
        Command::Map(info) => {
            let replaced = world.map.id != info.map_id;
            world.set_map(&info);
            if replaced {
                effects.push(Effect::MapChanged);
            }
        }
        Command::Tile {
            y,
            x,
            z,
            object_ids,
            light,
        } => world.set_tile(y, x, z, &object_ids, light),
        Command::Object { id, payload } => {
            let info = matches!(payload, ObjectPayload::Info(_) | ObjectPayload::Delete);
            world.apply_object(id, payload);
            if info && world.container(0).is_some() {
                effects.push(Effect::InventoryChanged);
            }
        }
        Command::Inventory {
            container_id,
            object_ids,
        } => {
            world.set_container(container_id, object_ids);
            effects.push(Effect::InventoryChanged);
        }
        Command::Status { kind, active } => {
            world.set_status(&kind, active);
            effects.push(Effect::StatusChanged);
        }
        Command::Message(message) => {
            if let Some(anchor) = map_anchor(world, &message) {
                effects.push(Effect::MapMessage {
                    anchor,
                    body: message.body.clone(),
                });
            }
            log.push(message.clone());
            effects.push(Effect::Chat(message));
        }
        Command::Basic { kind, message } if !message.is_empty() => {
            let body = match kind {
                BasicKind::Ok => message,
                BasicKind::Reject | BasicKind::Nok => format!("rejected: {message}"),
            };
            let message = ChatMessage::local(body);
            log.push(message.clone());
            effects.push(Effect::Chat(message));
        }
        Command::Basic { .. } => {}
        Command::Rejoin => log::info!("rejoined game"),
        other => log::warn!("unexpected {} command in game", other.name()),
    }
    effects
}

/// Where, if anywhere, a message should float over the map. Speech hangs
/// over the speaker; map-wide messages over the player.
fn map_anchor(world: &World, message: &ChatMessage) -> Option<Anchor> {
    match message.kind {
        MessageKind::Pc | MessageKind::Npc => message
            .from_object_id
            .filter(|id| world.object(*id).is_some_and(|o| !o.missing))
            .map(Anchor::Object),
        MessageKind::Map => message
            .from_object_id
            .or(world.view_object)
            .filter(|id| world.object(*id).is_some_and(|o| !o.missing))
            .map(Anchor::Object),
        MessageKind::Server
        | MessageKind::Chat
        | MessageKind::Target
        | MessageKind::Local => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{MapInfo, ObjectType, TileLight};

    fn setup() -> (World, DataManager, MessageLog) {
        let mut world = World::new();
        world.set_map(&MapInfo {
            map_id: 1,
            height: 8,
            width: 8,
            depth: 8,
            ..Default::default()
        });
        (world, DataManager::new(), MessageLog::default())
    }

    fn place(world: &mut World, id: u32) {
        world.apply_object(
            id,
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
        world.set_tile(5, 5, 1, &[id], TileLight::default());
    }

    #[test]
    fn pc_speech_floats_over_the_speaker() {
        let (mut world, data, mut log) = setup();
        place(&mut world, 42);
        let message = ChatMessage {
            kind: MessageKind::Pc,
            from: "bob".into(),
            from_object_id: Some(42),
            title: String::new(),
            body: "hello world this is a test".into(),
        };
        let effects = dispatch(Command::Message(message.clone()), &mut world, &data, &mut log);
        assert_eq!(
            effects,
            vec![
                Effect::MapMessage {
                    anchor: Anchor::Object(42),
                    body: message.body.clone()
                },
                Effect::Chat(message),
            ]
        );
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn speech_from_an_unseen_object_only_goes_to_chat() {
        let (mut world, data, mut log) = setup();
        let message = ChatMessage {
            kind: MessageKind::Npc,
            from: "ghost".into(),
            from_object_id: Some(9),
            title: String::new(),
            body: "boo".into(),
        };
        let effects = dispatch(Command::Message(message), &mut world, &data, &mut log);
        assert!(matches!(effects.as_slice(), [Effect::Chat(_)]));
    }

    #[test]
    fn world_commands_reach_the_world() {
        let (mut world, data, mut log) = setup();
        let effects = dispatch(
            Command::Object {
                id: 3,
                payload: ObjectPayload::Visibility(false),
            },
            &mut world,
            &data,
            &mut log,
        );
        assert!(effects.is_empty());
        assert!(world.object(3).is_some_and(|o| !o.visible));

        dispatch(
            Command::Tile {
                y: 1,
                x: 2,
                z: 3,
                object_ids: vec![3],
                light: TileLight::default(),
            },
            &mut world,
            &data,
            &mut log,
        );
        assert!(world.object(3).is_some_and(|o| !o.missing && (o.y, o.x, o.z) == (1, 2, 3)));
        assert!(world.is_consistent());
    }

    #[test]
    fn map_change_is_reported_once() {
        let (mut world, data, mut log) = setup();
        let info = MapInfo {
            map_id: 2,
            height: 4,
            width: 4,
            depth: 4,
            ..Default::default()
        };
        let first = dispatch(Command::Map(info), &mut world, &data, &mut log);
        assert_eq!(first, vec![Effect::MapChanged]);
        let again = dispatch(Command::Map(info), &mut world, &data, &mut log);
        assert!(again.is_empty());
    }

    #[test]
    fn status_and_inventory_refresh() {
        let (mut world, data, mut log) = setup();
        let fx = dispatch(
            Command::Status {
                kind: "poisoned".into(),
                active: true,
            },
            &mut world,
            &data,
            &mut log,
        );
        assert_eq!(fx, vec![Effect::StatusChanged]);
        assert!(world.statuses.contains("poisoned"));

        let fx = dispatch(
            Command::Inventory {
                container_id: 0,
                object_ids: vec![7],
            },
            &mut world,
            &data,
            &mut log,
        );
        assert_eq!(fx, vec![Effect::InventoryChanged]);
        assert!(world.object(7).is_some_and(|o| o.contained));
    }

    #[test]
    fn assets_go_to_the_data_manager() {
        let (mut world, data, mut log) = setup();
        dispatch(
            Command::Sound {
                id: 4,
                data: vec![1, 2, 3],
            },
            &mut world,
            &data,
            &mut log,
        );
        assert_eq!(data.sound(4).as_deref(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn out_of_place_commands_are_ignored() {
        let (mut world, data, mut log) = setup();
        let fx = dispatch(Command::client_handshake(), &mut world, &data, &mut log);
        assert!(fx.is_empty());
        assert!(log.is_empty());
    }
}
