//! Wire types exchanged with the game server.
//!
//! Snapshots and highscores arrive as JSON bodies of STOMP `MESSAGE` frames.
//! Intents leave as `SEND` frames whose destinations and payloads are produced
//! by [`Intent::destination`] and [`Intent::payload`].

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

// ── Identifiers ─────────────────────────────────────────────────────

/// Opaque token identifying a shared game instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Link other players can open to join this session.
    ///
    /// ```
    /// use snake_session_client::protocol::SessionId;
    ///
    /// let id = SessionId::new("abc");
    /// assert_eq!(id.share_url("https://snake.example"), "https://snake.example?id=abc");
    /// ```
    pub fn share_url(&self, origin: &str) -> String {
        format!("{origin}?id={}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Index the server assigned to this connection within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerIdentity(pub i32);

impl PlayerIdentity {
    /// Identity before the server has answered.
    pub const UNKNOWN: PlayerIdentity = PlayerIdentity(-1);

    pub fn is_known(self) -> bool {
        self.0 >= 0
    }
}

impl Default for PlayerIdentity {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Game state ──────────────────────────────────────────────────────

/// A cell on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

/// One snake as reported in a snapshot.
///
/// The game server reports liveness as `dead`; `alive` is accepted too and
/// wins when both are present. A snake with neither is alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSnakeRecord")]
pub struct SnakeRecord {
    pub idx: i32,
    pub name: String,
    pub length: u32,
    pub alive: bool,
    pub paused: bool,
}

#[derive(Deserialize)]
struct RawSnakeRecord {
    idx: i32,
    #[serde(default)]
    name: String,
    length: u32,
    #[serde(default)]
    alive: Option<bool>,
    #[serde(default)]
    dead: Option<bool>,
    #[serde(default)]
    paused: bool,
}

impl From<RawSnakeRecord> for SnakeRecord {
    fn from(raw: RawSnakeRecord) -> Self {
        let alive = match (raw.alive, raw.dead) {
            (Some(alive), _) => alive,
            (None, Some(dead)) => !dead,
            (None, None) => true,
        };
        Self {
            idx: raw.idx,
            name: raw.name,
            length: raw.length,
            alive,
            paused: raw.paused,
        }
    }
}

/// Complete, self-contained description of a game at one point in time.
///
/// Board dimensions are non-zero by construction: a payload with a zero
/// width or height fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
    pub width: NonZeroU32,
    pub height: NonZeroU32,
    pub food: Coordinate,
    #[serde(default)]
    pub snakes: Vec<SnakeRecord>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl GameSnapshot {
    /// The snake controlled by `identity`, if it is on the board.
    pub fn snake(&self, identity: PlayerIdentity) -> Option<&SnakeRecord> {
        self.snakes.iter().find(|snake| snake.idx == identity.0)
    }

    /// Live scoreboard for this session, one entry per snake in board order.
    pub fn scores(&self) -> Vec<HighscoreEntry> {
        self.snakes
            .iter()
            .map(|snake| HighscoreEntry {
                idx: snake.idx,
                name: snake.name.clone(),
                score: snake.length,
            })
            .collect()
    }
}

/// One row of the global highscore table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighscoreEntry {
    #[serde(default = "unknown_idx")]
    pub idx: i32,
    #[serde(rename = "playerName", alias = "name", default)]
    pub name: String,
    pub score: u32,
}

fn unknown_idx() -> i32 {
    PlayerIdentity::UNKNOWN.0
}

// ── Intents ─────────────────────────────────────────────────────────

/// A movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client-originated request to change shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Join(SessionId),
    Move(Direction),
    Pause,
    Unpause,
    Reset,
    SetName(String),
}

impl Intent {
    /// Application destination the intent is sent to.
    pub fn destination(&self) -> &'static str {
        match self {
            Intent::Join(_) => "/app/join",
            Intent::Move(_) => "/app/move",
            Intent::Pause => "/app/pause",
            Intent::Unpause => "/app/unpause",
            Intent::Reset => "/app/reset",
            Intent::SetName(_) => "/app/setName",
        }
    }

    /// Frame body for the intent.
    ///
    /// `Join` and `SetName` carry the raw string, `Move` the JSON-encoded
    /// direction (`"up"` with quotes), the rest are empty.
    pub fn payload(&self) -> String {
        match self {
            Intent::Join(id) => id.as_str().to_string(),
            Intent::Move(direction) => format!("\"{}\"", direction.as_str()),
            Intent::SetName(name) => name.clone(),
            Intent::Pause | Intent::Unpause | Intent::Reset => String::new(),
        }
    }

    /// Short name used in logs and misuse errors.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Join(_) => "join",
            Intent::Move(_) => "move",
            Intent::Pause => "pause",
            Intent::Unpause => "unpause",
            Intent::Reset => "reset",
            Intent::SetName(_) => "set_name",
        }
    }
}

// ── Topics ──────────────────────────────────────────────────────────

/// Server-to-client topics a session subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Game snapshots for one session.
    Update(SessionId),
    /// Global highscore table.
    NewHighscore,
    /// Per-connection identity assignment.
    Identity,
}

impl Topic {
    /// Wire destination of the topic.
    pub fn destination(&self) -> String {
        match self {
            Topic::Update(id) => format!("/topic/update/{id}"),
            Topic::NewHighscore => "/topic/newHighscore".to_string(),
            Topic::Identity => "/user/queue/getIdx".to_string(),
        }
    }

    /// The three topics joined for `id`, in subscription order.
    pub fn for_session(id: &SessionId) -> [Topic; 3] {
        [Topic::Update(id.clone()), Topic::NewHighscore, Topic::Identity]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}
