//! Per-session state store
//!
//! Holds the current document, the derived artifacts and both conversations.
//! A new document replaces everything in one step.

use super::conversation::{Conversation, Role, Turn};
use crate::document::Document;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single LLM-generated text value cached against the current document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generated_at: Utc::now(),
        }
    }
}

/// The two chat-style threads of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Assistant,
    Negotiation,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Assistant => "assistant",
            ChatKind::Negotiation => "negotiation",
        }
    }
}

/// Session-scoped document and derived state
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    document: Option<Document>,
    summary: Option<Artifact>,
    explanation: Option<Artifact>,
    risky_clause: Option<Artifact>,
    assistant_chat: Conversation,
    negotiation_chat: Conversation,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly extracted document and drop everything derived from
    /// the previous one
    pub fn reset_for_new_document(&mut self, document: Document) {
        *self = Self {
            document: Some(document),
            ..Self::default()
        };
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Current document text, or the empty string when none is loaded
    pub fn document_text(&self) -> &str {
        self.document.as_ref().map_or("", |doc| doc.text.as_str())
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn summary(&self) -> Option<&Artifact> {
        self.summary.as_ref()
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        self.summary = Some(Artifact::new(text));
    }

    pub fn explanation(&self) -> Option<&Artifact> {
        self.explanation.as_ref()
    }

    pub fn set_explanation(&mut self, text: impl Into<String>) {
        self.explanation = Some(Artifact::new(text));
    }

    pub fn risky_clause(&self) -> Option<&Artifact> {
        self.risky_clause.as_ref()
    }

    /// Store the clause and seed the negotiation with its opening turns.
    /// Only the controller calls this, and only while no clause exists.
    pub(crate) fn begin_negotiation(&mut self, clause: String, persona: String, greeting: &str) {
        self.risky_clause = Some(Artifact::new(clause));
        self.negotiation_chat = Conversation::new();
        self.negotiation_chat.append(Role::Persona, persona);
        self.negotiation_chat.append(Role::Assistant, greeting);
    }

    pub fn chat(&self, kind: ChatKind) -> &Conversation {
        match kind {
            ChatKind::Assistant => &self.assistant_chat,
            ChatKind::Negotiation => &self.negotiation_chat,
        }
    }

    pub(crate) fn chat_mut(&mut self, kind: ChatKind) -> &mut Conversation {
        match kind {
            ChatKind::Assistant => &mut self.assistant_chat,
            ChatKind::Negotiation => &mut self.negotiation_chat,
        }
    }

    /// Serializable view for the presentation layer
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document: self.document.clone(),
            summary: self.summary.clone(),
            explanation: self.explanation.clone(),
            risky_clause: self.risky_clause.clone(),
            assistant_chat: ChatSnapshot::from(&self.assistant_chat),
            negotiation_chat: ChatSnapshot::from(&self.negotiation_chat),
        }
    }
}

/// Rendered view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub document: Option<Document>,
    pub summary: Option<Artifact>,
    pub explanation: Option<Artifact>,
    pub risky_clause: Option<Artifact>,
    pub assistant_chat: ChatSnapshot,
    pub negotiation_chat: ChatSnapshot,
}

/// Rendered view of a conversation; persona turns are left out
#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub turns: Vec<Turn>,
    pub awaiting_reply: bool,
}

impl From<&Conversation> for ChatSnapshot {
    fn from(conversation: &Conversation) -> Self {
        Self {
            turns: conversation.visible().cloned().collect(),
            awaiting_reply: conversation.awaiting_reply(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentUpload, ExtractedText};

    fn document(text: &str) -> Document {
        Document::from_extraction(
            &DocumentUpload::new(text.as_bytes().to_vec()),
            ExtractedText {
                text: text.to_string(),
                page_count: 1,
                skipped_pages: vec![],
            },
        )
    }

    fn populated() -> SessionState {
        let mut state = SessionState::new();
        state.reset_for_new_document(document("first lease"));
        state.set_summary("summary");
        state.set_explanation("explanation");
        state.begin_negotiation(
            "clause".to_string(),
            "persona".to_string(),
            "hello",
        );
        state.chat_mut(ChatKind::Assistant).append(Role::User, "question");
        state.chat_mut(ChatKind::Assistant).append(Role::Assistant, "answer");
        state
    }

    #[test]
    fn test_empty_sentinel() {
        let state = SessionState::new();
        assert_eq!(state.document_text(), "");
        assert!(!state.has_document());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = populated();
        state.reset_for_new_document(document("second lease"));

        assert_eq!(state.document_text(), "second lease");
        assert!(state.summary().is_none());
        assert!(state.explanation().is_none());
        assert!(state.risky_clause().is_none());
        assert!(state.chat(ChatKind::Assistant).is_empty());
        assert!(state.chat(ChatKind::Negotiation).is_empty());
    }

    #[test]
    fn test_artifacts_overwrite() {
        let mut state = populated();
        state.set_summary("newer summary");
        assert_eq!(state.summary().map(|a| a.text.as_str()), Some("newer summary"));
        assert_eq!(state.chat(ChatKind::Assistant).len(), 2);
    }

    #[test]
    fn test_snapshot_hides_persona() {
        let state = populated();
        let snapshot = state.snapshot();

        assert_eq!(snapshot.negotiation_chat.turns.len(), 1);
        assert_eq!(snapshot.negotiation_chat.turns[0].text, "hello");
        assert_eq!(snapshot.assistant_chat.turns.len(), 2);
        assert!(!snapshot.assistant_chat.awaiting_reply);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["document"].get("text").is_none());
        assert_eq!(json["risky_clause"]["text"], "clause");
    }
}
