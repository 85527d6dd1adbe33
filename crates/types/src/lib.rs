//! Core types module - shared vocabulary and constants
//!
//! This crate defines the fundamental types used by every layer of the duel
//! server: the zone engine, the per-player game engine, the table/dispatch
//! layer and the client adapter. Everything here is plain data.
//!
//! # Zone Dimensions
//!
//! - **Width**: 10 columns by default (indexed 0-9, left to right)
//! - **Height**: 20 rows by default (indexed 0-19, top to bottom)
//! - **Minimum**: 4x4, a zone must fit a whole piece
//! - **Spawn column**: `width / 2 - 2`
//!
//! # Fixed Match Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `KO_THRESHOLD` | 5 | KO credits that end the opponent's game |
//! | `DISPATCHER_IDLE_MS` | 2000 | Silence on every channel that force-ends a match |
//! | `ZONE_CLEAR_BONUS` | 10 | Lines sent for emptying the whole zone |
//! | `FRAME_BUFFER` | 1024 | Wire buffer: 4-byte header plus body |
//! | `TOURNAMENT_TABLE_ID_BASE` | 100000 | First id of the tournament range |
//!
//! # Examples
//!
//! ```
//! use tetris_duel_types::{Audience, Color, Operation, PieceKind, Rotation};
//!
//! assert_eq!(Operation::from_str("drop"), Some(Operation::Drop));
//! assert_eq!(Rotation::North.rotate_cw(), Rotation::East);
//! assert!(PieceKind::T.color().is_active());
//! assert!(!Color::Stone.is_active());
//! assert!(Audience::Everyone.reaches(Audience::Observers));
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default zone width in cells
pub const DEFAULT_ZONE_WIDTH: usize = 10;

/// Default zone height in cells
pub const DEFAULT_ZONE_HEIGHT: usize = 20;

/// Smallest accepted zone side (a piece spans four dots)
pub const MIN_ZONE_SIDE: usize = 4;

/// Default capacity of the next-piece preview ring
pub const DEFAULT_NEXT_PIECES: usize = 2;

/// Default drop timer interval in milliseconds
pub const DEFAULT_DROP_MS: u64 = 1000;

/// Number of KO credits against one opponent that ends that opponent's game.
pub const KO_THRESHOLD: u32 = 5;

/// Silence on every dispatcher channel for this long ends the match.
pub const DISPATCHER_IDLE_MS: u64 = 2000;

/// Lines sent when a clear leaves the zone completely empty.
pub const ZONE_CLEAR_BONUS: u32 = 10;

/// Capacity of engine outbound channels.
pub const ENGINE_CHANNEL_CAPACITY: usize = 1 << 10;

/// Fixed wire buffer size (length header included).
pub const FRAME_BUFFER: usize = 1 << 10;

/// Size of the big-endian length header that prefixes every frame.
pub const FRAME_HEADER: usize = 4;

/// Table ids at or above this value belong to tournaments.
pub const TOURNAMENT_TABLE_ID_BASE: TableId = 100_000;

/// Countdown ticks published before a match starts (3, 2, 1, then 0).
pub const COUNTDOWN_FROM: u32 = 3;

pub type TableId = u32;
pub type UserId = u32;

/// Returns true when the id lies in the reserved tournament range.
pub fn is_tournament_table(id: TableId) -> bool {
    id >= TOURNAMENT_TABLE_ID_BASE
}

/// A dot of the zone.
///
/// Only `Tint` values are active: they are placeable and count toward a full
/// row. `Stone` and `Bomb` only arrive through attacks. `Transparent` marks the
/// drop projection in a rendered copy and never enters the grid.
///
/// On the wire a color is a single integer: `0` empty, `1..=7` tints,
/// `-99` stone, `-98` bomb, `-1` transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    Empty,
    Tint(u8),
    Stone,
    Bomb,
    Transparent,
}

/// Number of distinct tints.
pub const MAX_TINT: u8 = 7;

impl Color {
    pub fn is_empty(&self) -> bool {
        matches!(self, Color::Empty)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Color::Tint(_))
    }

    /// Stone or bomb: part of attack debris
    pub fn is_debris(&self) -> bool {
        matches!(self, Color::Stone | Color::Bomb)
    }

    pub fn to_code(self) -> i8 {
        match self {
            Color::Empty => 0,
            Color::Tint(t) => t as i8,
            Color::Stone => -99,
            Color::Bomb => -98,
            Color::Transparent => -1,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Color::Empty),
            1..=7 => Some(Color::Tint(code as u8)),
            -99 => Some(Color::Stone),
            -98 => Some(Color::Bomb),
            -1 => Some(Color::Transparent),
            _ => None,
        }
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i8(self.to_code())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = i8::deserialize(deserializer)?;
        Color::from_code(code).ok_or_else(|| serde::de::Error::custom("invalid color code"))
    }
}

/// The seven tetromino piece kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Parse piece kind from string (case-insensitive)
    ///
    /// ```
    /// use tetris_duel_types::PieceKind;
    ///
    /// assert_eq!(PieceKind::from_str("i"), Some(PieceKind::I));
    /// assert_eq!(PieceKind::from_str("unknown"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i" => Some(PieceKind::I),
            "o" => Some(PieceKind::O),
            "t" => Some(PieceKind::T),
            "s" => Some(PieceKind::S),
            "z" => Some(PieceKind::Z),
            "j" => Some(PieceKind::J),
            "l" => Some(PieceKind::L),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::I => "i",
            PieceKind::O => "o",
            PieceKind::T => "t",
            PieceKind::S => "s",
            PieceKind::Z => "z",
            PieceKind::J => "j",
            PieceKind::L => "l",
        }
    }

    /// Tint used for every dot of this kind
    pub fn color(&self) -> Color {
        let tint = match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::S => 4,
            PieceKind::Z => 5,
            PieceKind::J => 6,
            PieceKind::L => 7,
        };
        Color::Tint(tint)
    }
}

/// Rotation states, spawn orientation is North.
///
/// The rotation cycle goes: North → East → South → West → North
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    North,
    East,
    South,
    West,
}

impl Rotation {
    /// Rotate clockwise (90°)
    ///
    /// ```
    /// use tetris_duel_types::Rotation;
    ///
    /// assert_eq!(Rotation::North.rotate_cw(), Rotation::East);
    /// assert_eq!(Rotation::West.rotate_cw(), Rotation::North);
    /// ```
    pub fn rotate_cw(&self) -> Self {
        match self {
            Rotation::North => Rotation::East,
            Rotation::East => Rotation::South,
            Rotation::South => Rotation::West,
            Rotation::West => Rotation::North,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rotation::North => "north",
            Rotation::East => "east",
            Rotation::South => "south",
            Rotation::West => "west",
        }
    }
}

/// Player operations accepted by the `operate` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Rotate,
    Left,
    Right,
    Down,
    Drop,
    Hold,
}

impl Operation {
    /// Parse an operation from its wire name
    ///
    /// ```
    /// use tetris_duel_types::Operation;
    ///
    /// assert_eq!(Operation::from_str("rotate"), Some(Operation::Rotate));
    /// assert_eq!(Operation::from_str("HOLD"), Some(Operation::Hold));
    /// assert_eq!(Operation::from_str("spin"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rotate" => Some(Operation::Rotate),
            "left" => Some(Operation::Left),
            "right" => Some(Operation::Right),
            "down" => Some(Operation::Down),
            "drop" => Some(Operation::Drop),
            "hold" => Some(Operation::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Rotate => "rotate",
            Operation::Left => "left",
            Operation::Right => "right",
            Operation::Down => "down",
            Operation::Drop => "drop",
            Operation::Hold => "hold",
        }
    }
}

/// One of the two seats at a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    #[serde(rename = "1p")]
    One,
    #[serde(rename = "2p")]
    Two,
}

impl Seat {
    pub fn index(&self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }

    pub fn opponent(&self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// The audience tag addressing only this seat.
    pub fn audience(&self) -> Audience {
        match self {
            Seat::One => Audience::Player1,
            Seat::Two => Audience::Player2,
        }
    }

    /// Response description for per-seat game messages.
    pub fn desc(&self) -> ResponseDesc {
        match self {
            Seat::One => ResponseDesc::Player1,
            Seat::Two => ResponseDesc::Player2,
        }
    }
}

/// Who receives a fan-out entry.
///
/// Readers are always tagged `Player1`, `Player2` or `Observers`; `Everyone`
/// only appears on entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    Player1,
    Player2,
    Observers,
    Everyone,
}

impl Audience {
    /// Whether an entry tagged `self` is delivered to a reader tagged `viewer`.
    pub fn reaches(&self, viewer: Audience) -> bool {
        match self {
            Audience::Everyone => true,
            tag => *tag == viewer,
        }
    }
}

/// Description tag of every server to client response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseDesc {
    #[serde(rename = "authSuccess")]
    AuthSuccess,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "refreshNormal")]
    RefreshNormal,
    #[serde(rename = "refreshTournament")]
    RefreshTournament,
    #[serde(rename = "sysMsg")]
    SysMsg,
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "1p")]
    Player1,
    #[serde(rename = "2p")]
    Player2,
    #[serde(rename = "timer")]
    Timer,
    #[serde(rename = "win")]
    Win,
    #[serde(rename = "lose")]
    Lose,
    #[serde(rename = "result")]
    Result,
}

/// Description tag of messages produced by one game engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameDesc {
    #[serde(rename = "zone")]
    Zone,
    #[serde(rename = "next")]
    NextPiece,
    #[serde(rename = "hold")]
    HeldPiece,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "lines")]
    Lines,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "combo")]
    Combo,
    #[serde(rename = "attack")]
    Attack,
    #[serde(rename = "ko")]
    Ko,
    #[serde(rename = "beingKo")]
    BeingKo,
    #[serde(rename = "over")]
    Over,
    #[serde(rename = "pause")]
    Pause,
}

impl GameDesc {
    /// Fan-out audience of a message from the engine sitting in `seat`.
    ///
    /// Audio cues and the raw KO count stay with the player; clear, combo and
    /// attack notices also reach observers; everything else goes to everyone.
    pub fn audiences(&self, seat: Seat) -> &'static [Audience] {
        match (self, seat) {
            (GameDesc::Audio | GameDesc::Ko, Seat::One) => &[Audience::Player1],
            (GameDesc::Audio | GameDesc::Ko, Seat::Two) => &[Audience::Player2],
            (GameDesc::Clear | GameDesc::Combo | GameDesc::Attack, Seat::One) => {
                &[Audience::Player1, Audience::Observers]
            }
            (GameDesc::Clear | GameDesc::Combo | GameDesc::Attack, Seat::Two) => {
                &[Audience::Player2, Audience::Observers]
            }
            _ => &[Audience::Everyone],
        }
    }
}
