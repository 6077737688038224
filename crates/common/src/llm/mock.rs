//! Mock backend for development and testing

use super::GenerativeBackend;
use crate::errors::{AppError, Result};
use crate::session::Turn;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// A request the mock received
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Generate(String),
    Chat(Vec<Turn>),
}

enum MockReply {
    Text(String),
    Fail(String),
}

/// Backend that replays scripted replies and records every call.
/// With nothing scripted it answers with a canned line.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<BackendCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn push_reply(&self, text: impl Into<String>) {
        lock(&self.replies).push_back(MockReply::Text(text.into()));
    }

    /// Queue a failing call
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.replies).push_back(MockReply::Fail(message.into()));
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn respond(&self, call: BackendCall) -> Result<String> {
        let fallback = match &call {
            BackendCall::Generate(prompt) => format!(
                "Mock response to a {} character prompt. [LLM API key not configured]",
                prompt.chars().count()
            ),
            BackendCall::Chat(turns) => format!(
                "Mock reply after {} turns. [LLM API key not configured]",
                turns.len()
            ),
        };
        lock(&self.calls).push(call);

        match lock(&self.replies).pop_front() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(AppError::Backend { message }),
            None => Ok(fallback),
        }
    }
}

#[async_trait]
impl GenerativeBackend for MockBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.respond(BackendCall::Generate(prompt.to_string()))
    }

    async fn chat(&self, turns: &[Turn]) -> Result<String> {
        self.respond(BackendCall::Chat(turns.to_vec()))
    }

    fn model_name(&self) -> &str {
        "mock-generative"
    }
}
