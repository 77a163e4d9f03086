// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Chat message representation
//
// The browser sends the running quiz conversation as a list of
// `{role, content}` pairs; the same shape is forwarded upstream.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the quiz conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A conversation is on its first turn until the model has answered once.
pub fn is_first_turn(messages: &[ChatMessage]) -> bool {
    !messages.iter().any(|m| m.role == Role::Assistant)
}
