//! Conversation controller
//!
//! Turns user actions into prompts, calls the generative backend and writes
//! the results back into a [`SessionState`]. The controller holds no session
//! data itself; callers pass in the state of the session they are serving.
//!
//! Writes happen only after a successful backend reply, with one exception:
//! a chat message's user turn is appended before the call, so a failed call
//! leaves the conversation awaiting a reply that [`SessionController::retry`]
//! can complete.

use super::conversation::Role;
use super::prompts;
use super::store::{ChatKind, SessionState};
use crate::document::{Document, DocumentUpload, TextExtractor};
use crate::errors::{AppError, Result};
use crate::llm::GenerativeBackend;
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Negotiation simulator settings
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    /// Role the backend plays, e.g. "landlord"
    pub counterparty: String,
    /// First line the counterpart says after the persona is set up
    pub greeting: String,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            counterparty: "landlord".to_string(),
            greeting: prompts::OPENING_GREETING.to_string(),
        }
    }
}

/// Orchestrates every session action
pub struct SessionController {
    backend: Arc<dyn GenerativeBackend>,
    extractor: Arc<dyn TextExtractor>,
    negotiation: NegotiationSettings,
}

impl SessionController {
    pub fn new(backend: Arc<dyn GenerativeBackend>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            backend,
            extractor,
            negotiation: NegotiationSettings::default(),
        }
    }

    pub fn with_negotiation(mut self, negotiation: NegotiationSettings) -> Self {
        self.negotiation = negotiation;
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Extract an upload and make it the session's document.
    ///
    /// On failure the previous document and everything derived from it stay
    /// in place.
    #[instrument(skip_all, fields(bytes = upload.bytes.len(), extractor = self.extractor.name()))]
    pub async fn process_document(
        &self,
        state: &mut SessionState,
        upload: DocumentUpload,
    ) -> Result<Document> {
        let extractor = Arc::clone(&self.extractor);
        let bytes = upload.bytes.clone();

        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await?;

        let extracted = match extracted {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, "Document extraction failed");
                metrics::record_document(false, 0);
                return Err(e);
            }
        };

        if !extracted.skipped_pages.is_empty() {
            debug!(skipped = ?extracted.skipped_pages, "Some pages yielded no text");
        }

        let document = Document::from_extraction(&upload, extracted);
        metrics::record_document(true, document.page_count);

        info!(
            digest = %document.digest,
            pages = document.page_count,
            chars = document.char_count,
            "Document processed"
        );

        state.reset_for_new_document(document.clone());
        Ok(document)
    }

    /// Explain a pasted snippet in plain language; overwrites the explanation
    #[instrument(skip_all)]
    pub async fn explain(&self, state: &mut SessionState, snippet: &str) -> Result<String> {
        let snippet = require_text(snippet, "snippet")?;
        require_document(state)?;

        let reply = self.generate("explain", &prompts::explain(snippet)).await?;
        state.set_explanation(reply.clone());
        Ok(reply)
    }

    /// Summarize the whole document; overwrites the summary
    #[instrument(skip_all)]
    pub async fn summarize(&self, state: &mut SessionState) -> Result<String> {
        let document = require_document(state)?;

        let reply = self
            .generate("summary", &prompts::summarize(&document.text))
            .await?;
        state.set_summary(reply.clone());
        Ok(reply)
    }

    /// Answer a question about the document in the assistant chat
    #[instrument(skip_all)]
    pub async fn ask_assistant(&self, state: &mut SessionState, question: &str) -> Result<String> {
        let question = require_text(question, "question")?;
        require_document(state)?;
        require_answered(state, ChatKind::Assistant)?;

        state.chat_mut(ChatKind::Assistant).append(Role::User, question);
        self.complete_assistant(state).await
    }

    /// Pick a clause to negotiate over and open the negotiation chat.
    ///
    /// Runs once per document: when a clause is already known it is returned
    /// as is and the chat is left untouched.
    #[instrument(skip_all)]
    pub async fn find_risky_clause(&self, state: &mut SessionState) -> Result<String> {
        let document = require_document(state)?;

        if let Some(clause) = state.risky_clause() {
            debug!("Risky clause already identified");
            return Ok(clause.text.clone());
        }

        let clause = self
            .generate("risky_clause", &prompts::find_risky_clause(&document.text))
            .await?;

        let persona = prompts::negotiation_persona(&self.negotiation.counterparty, &clause);
        state.begin_negotiation(clause.clone(), persona, &self.negotiation.greeting);

        info!(clause_len = clause.len(), "Negotiation opened");
        Ok(clause)
    }

    /// Send a user reply to the negotiation counterpart
    #[instrument(skip_all)]
    pub async fn negotiate(&self, state: &mut SessionState, utterance: &str) -> Result<String> {
        let utterance = require_text(utterance, "message")?;
        require_document(state)?;
        require_negotiation(state)?;
        require_answered(state, ChatKind::Negotiation)?;

        state
            .chat_mut(ChatKind::Negotiation)
            .append(Role::User, utterance);
        self.complete_negotiation(state).await
    }

    /// Re-issue the backend call for a chat left awaiting a reply
    #[instrument(skip_all, fields(chat = kind.as_str()))]
    pub async fn retry(&self, state: &mut SessionState, kind: ChatKind) -> Result<String> {
        require_document(state)?;

        if !state.chat(kind).awaiting_reply() {
            return Err(AppError::Precondition {
                message: format!("the {} chat is not waiting for a reply", kind.as_str()),
            });
        }

        match kind {
            ChatKind::Assistant => self.complete_assistant(state).await,
            ChatKind::Negotiation => {
                require_negotiation(state)?;
                self.complete_negotiation(state).await
            }
        }
    }

    async fn complete_assistant(&self, state: &mut SessionState) -> Result<String> {
        let question = state
            .chat(ChatKind::Assistant)
            .pending_user_text()
            .ok_or_else(|| AppError::Internal {
                message: "assistant chat has no pending question".to_string(),
            })?;

        let prompt = prompts::assistant_question(state.document_text(), question);
        let reply = self.generate("assistant", &prompt).await?;

        state
            .chat_mut(ChatKind::Assistant)
            .append(Role::Assistant, reply.clone());
        Ok(reply)
    }

    async fn complete_negotiation(&self, state: &mut SessionState) -> Result<String> {
        let start = Instant::now();
        let history = state.chat(ChatKind::Negotiation).turns();
        let result = self.backend.chat(history).await;
        let reply = self.observe("negotiation", start, result)?;

        state
            .chat_mut(ChatKind::Negotiation)
            .append(Role::Assistant, reply.clone());
        Ok(reply)
    }

    async fn generate(&self, action: &'static str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.backend.generate(prompt).await;
        self.observe(action, start, result)
    }

    /// Record the call and reject blank replies
    fn observe(&self, action: &'static str, start: Instant, result: Result<String>) -> Result<String> {
        let result = result.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(AppError::EmptyResponse)
            } else {
                Ok(reply)
            }
        });

        let elapsed = start.elapsed();
        metrics::record_backend_call(
            action,
            self.backend.model_name(),
            elapsed.as_secs_f64(),
            result.is_ok(),
        );

        match &result {
            Ok(reply) => debug!(
                action,
                reply_len = reply.len(),
                latency_ms = elapsed.as_millis() as u64,
                "Backend call succeeded"
            ),
            Err(e) => warn!(action, error = %e, "Backend call failed"),
        }

        result
    }
}

fn require_text<'a>(input: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyInput {
            field: field.to_string(),
        });
    }
    Ok(trimmed)
}

fn require_document(state: &SessionState) -> Result<Document> {
    state.document().cloned().ok_or(AppError::NoDocument)
}

/// A chat still owed a reply only accepts a retry; a second user turn in a
/// row would break role alternation for every later call
fn require_answered(state: &SessionState, kind: ChatKind) -> Result<()> {
    if state.chat(kind).awaiting_reply() {
        return Err(AppError::Precondition {
            message: format!(
                "the {} chat is still waiting for a reply; retry it first",
                kind.as_str()
            ),
        });
    }
    Ok(())
}

fn require_negotiation(state: &SessionState) -> Result<()> {
    if state.risky_clause().is_none() {
        return Err(AppError::Precondition {
            message: "find a risky clause before negotiating".to_string(),
        });
    }
    Ok(())
}
