//! Session engine
//!
//! One [`SessionState`] per interactive session, driven by a shared
//! [`SessionController`]:
//! - Document state with atomic reset
//! - Append-only conversations for the assistant and negotiation chats
//! - Prompt templates for every action

mod controller;
mod conversation;
pub mod prompts;
mod store;

pub use controller::{NegotiationSettings, SessionController};
pub use conversation::{Conversation, Role, Turn, TurnId};
pub use store::{Artifact, ChatKind, ChatSnapshot, SessionSnapshot, SessionState};
