//! Append-only conversation log
//!
//! Turns live in an arena and are addressed by their sequential [`TurnId`].
//! The log hands out shared references only, so a turn can never be edited,
//! reordered or removed once recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Synthetic instruction turn; sent to the backend, never shown to the user
    Persona,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Persona => "persona",
        }
    }

    /// Whether the presentation layer should render turns of this role
    pub fn is_visible(&self) -> bool {
        !matches!(self, Role::Persona)
    }
}

/// Position of a turn in its conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(usize);

impl TurnId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One message exchanged in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Ordered, append-only sequence of turns
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a turn at the end of the log
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> TurnId {
        let id = TurnId(self.turns.len());
        self.turns.push(Turn::new(role, text));
        id
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id.0)
    }

    /// Full history in submission order, persona turns included
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns a user is meant to see
    pub fn visible(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|turn| turn.role.is_visible())
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True when the newest turn is a user turn with no reply yet
    pub fn awaiting_reply(&self) -> bool {
        matches!(self.last(), Some(turn) if turn.role == Role::User)
    }

    /// Text of the user turn still waiting for a reply
    pub fn pending_user_text(&self) -> Option<&str> {
        self.last()
            .filter(|turn| turn.role == Role::User)
            .map(|turn| turn.text.as_str())
    }
}
