//! Commands exchanged with the game server.
//!
//! Every frame on the wire carries exactly one [`Command`]. The same enum is
//! used in both directions; which variants a peer sends is a matter of
//! protocol state, not of type.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Protocol revision this client speaks.
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROGRAM: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasicKind {
    Ok,
    Reject,
    Nok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginKind {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterKind {
    QueryCharacters,
    CreateCharacter,
    ChooseCharacter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Server,
    Chat,
    Npc,
    Pc,
    Target,
    Map,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Unknown,
    Block,
    Pc,
    Npc,
    Item,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 10] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Northeast,
        Direction::Northwest,
        Direction::Southeast,
        Direction::Southwest,
        Direction::Up,
        Direction::Down,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Northeast => "northeast",
            Direction::Northwest => "northwest",
            Direction::Southeast => "southeast",
            Direction::Southwest => "southwest",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        Direction::ALL
            .into_iter()
            .find(|d| d.name() == s || short_name(*d) == s)
            .ok_or_else(|| format!("unknown direction {s:?}"))
    }
}

fn short_name(d: Direction) -> &'static str {
    match d {
        Direction::North => "n",
        Direction::South => "s",
        Direction::East => "e",
        Direction::West => "w",
        Direction::Northeast => "ne",
        Direction::Northwest => "nw",
        Direction::Southeast => "se",
        Direction::Southwest => "sw",
        Direction::Up => "u",
        Direction::Down => "d",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rendering metrics the server's art is authored against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnimationsConfig {
    pub tile_width: u32,
    pub tile_height: u32,
    pub y_step: Point,
    /// Per-type pixel offsets applied after projection.
    pub adjustments: BTreeMap<ObjectType, Point>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    pub animations: AnimationsConfig,
    pub slots: Vec<String>,
    pub type_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationFrame {
    pub image_id: u32,
    /// Milliseconds; zero never advances.
    pub time: u32,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationFace {
    pub id: u32,
    pub frames: Vec<AnimationFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Animation {
    pub id: u32,
    pub name: String,
    pub faces: Vec<AnimationFace>,
}

impl Animation {
    pub fn face(&self, id: u32) -> Option<&AnimationFace> {
        self.faces
            .iter()
            .find(|f| f.id == id)
            .or_else(|| self.faces.first())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MapInfo {
    pub map_id: u32,
    pub height: u32,
    pub width: u32,
    pub depth: u32,
    pub outdoor: bool,
    pub outdoor_brightness: f64,
    pub brightness: f64,
    pub hue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileLight {
    pub brightness: f64,
    pub hue: f64,
    pub sky: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectPayload {
    Create {
        kind: ObjectType,
        animation_id: u32,
        face_id: u32,
        h: u8,
        w: u8,
        d: u8,
        reach: u8,
    },
    Delete,
    Update {
        animation_id: u32,
        face_id: u32,
    },
    Visibility(bool),
    Unblocked(bool),
    Squeeze(bool),
    Crouch(bool),
    Info(Vec<String>),
    /// This object is the one the client controls.
    ViewTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub from: String,
    pub from_object_id: Option<u32>,
    pub title: String,
    pub body: String,
}

impl ChatMessage {
    pub fn local(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Local,
            from: String::new(),
            from_object_id: None,
            title: String::new(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Handshake {
        version: u32,
        program: String,
    },
    Basic {
        kind: BasicKind,
        message: String,
    },
    Login {
        kind: LoginKind,
        user: String,
        pass: String,
        email: Option<String>,
    },
    Character {
        kind: CharacterKind,
        characters: Vec<String>,
        genus: Option<String>,
        species: Option<String>,
    },
    Rejoin,
    Features(Features),
    Graphics {
        id: u32,
        data: Vec<u8>,
    },
    Animation(Animation),
    Sound {
        id: u32,
        data: Vec<u8>,
    },
    Audio {
        id: u32,
        data: Vec<u8>,
    },
    Map(MapInfo),
    Tile {
        y: u32,
        x: u32,
        z: u32,
        object_ids: Vec<u32>,
        light: TileLight,
    },
    Object {
        id: u32,
        payload: ObjectPayload,
    },
    Status {
        kind: String,
        active: bool,
    },
    Message(ChatMessage),
    Cmd {
        cmd: String,
    },
    RepeatCmd {
        cmd: String,
        cancel: bool,
        data: Vec<String>,
    },
    ClearCmd,
    ExtCmd {
        cmd: String,
        args: Vec<String>,
    },
    Attack {
        direction: Option<Direction>,
    },
    Inspect {
        object_id: u32,
    },
    QueryGenera {
        genera: Vec<String>,
    },
    QuerySpecies {
        genus: String,
        species: Vec<String>,
    },
    Inventory {
        container_id: u32,
        object_ids: Vec<u32>,
    },
}

impl Command {
    /// The handshake this client opens with.
    pub fn client_handshake() -> Self {
        Command::Handshake {
            version: PROTOCOL_VERSION,
            program: PROGRAM.to_string(),
        }
    }

    pub fn basic(kind: BasicKind, message: impl Into<String>) -> Self {
        Command::Basic {
            kind,
            message: message.into(),
        }
    }

    pub fn characters(kind: CharacterKind, characters: Vec<String>) -> Self {
        Command::Character {
            kind,
            characters,
            genus: None,
            species: None,
        }
    }

    /// Variant name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Handshake { .. } => "Handshake",
            Command::Basic { .. } => "Basic",
            Command::Login { .. } => "Login",
            Command::Character { .. } => "Character",
            Command::Rejoin => "Rejoin",
            Command::Features(_) => "Features",
            Command::Graphics { .. } => "Graphics",
            Command::Animation(_) => "Animation",
            Command::Sound { .. } => "Sound",
            Command::Audio { .. } => "Audio",
            Command::Map(_) => "Map",
            Command::Tile { .. } => "Tile",
            Command::Object { .. } => "Object",
            Command::Status { .. } => "Status",
            Command::Message(_) => "Message",
            Command::Cmd { .. } => "Cmd",
            Command::RepeatCmd { .. } => "RepeatCmd",
            Command::ClearCmd => "ClearCmd",
            Command::ExtCmd { .. } => "ExtCmd",
            Command::Attack { .. } => "Attack",
            Command::Inspect { .. } => "Inspect",
            Command::QueryGenera { .. } => "QueryGenera",
            Command::QuerySpecies { .. } => "QuerySpecies",
            Command::Inventory { .. } => "Inventory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_parse_long_and_short() {
        assert_eq!("north".parse::<Direction>(), Ok(Direction::North));
        assert_eq!("SW".parse::<Direction>(), Ok(Direction::Southwest));
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::Northeast.to_string(), "northeast");
    }

    #[test]
    fn animation_face_falls_back_to_first() {
        let anim = Animation {
            id: 1,
            name: "walk".into(),
            faces: vec![
                AnimationFace {
                    id: 3,
                    frames: Vec::new(),
                },
                AnimationFace {
                    id: 5,
                    frames: Vec::new(),
                },
            ],
        };
        assert_eq!(anim.face(5).map(|f| f.id), Some(5));
        assert_eq!(anim.face(9).map(|f| f.id), Some(3));
    }

    #[test]
    fn names_match_variants() {
        assert_eq!(Command::client_handshake().name(), "Handshake");
        assert_eq!(Command::ClearCmd.name(), "ClearCmd");
    }
}
