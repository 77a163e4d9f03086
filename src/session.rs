// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Quiz session state.
//
// Tracks one quiz conversation across turns. The only content kept is the
// model's private `analysis` from the last metadata block, which is fed
// back into the next turn's system prompt and never shown to the user.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::stream::{MetadataSink, QuizMetadata};

// ---------------------------------------------------------------------------
// Session state types
// ---------------------------------------------------------------------------

/// State tracked for a single quiz session across turns.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    pub session_id: String,
    /// Owner. A session is never read on behalf of another user.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Completed model turns.
    pub turn_count: u64,
    /// Server-side analysis from the most recent metadata block.
    pub analysis: String,
}

impl QuizSession {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at: now,
            last_seen: now,
            turn_count: 0,
            analysis: String::new(),
        }
    }

    /// Fold a finished turn's metadata into the session. An empty analysis
    /// keeps the previous one.
    pub fn complete_turn(&mut self, metadata: &QuizMetadata) {
        if !metadata.analysis.trim().is_empty() {
            self.analysis = metadata.analysis.clone();
        }
        self.turn_count += 1;
        self.last_seen = Utc::now();
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_seen)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// SessionStore trait
// ---------------------------------------------------------------------------

/// Trait for quiz session persistence.
///
/// Implementations must be thread-safe (Send + Sync). Handlers and splitter
/// tasks hold `Arc<dyn SessionStore>`.
pub trait SessionStore: Send + Sync {
    /// Retrieve a session by ID. Returns None if not found or expired.
    fn get(&self, session_id: &str) -> Option<QuizSession>;

    /// Store or replace a session.
    fn update(&self, session: QuizSession);

    /// Remove sessions idle for longer than `max_age`.
    fn cleanup(&self, max_age: Duration);
}

/// The caller's session, if it exists and belongs to them.
pub fn owned_session(
    store: &dyn SessionStore,
    session_id: &str,
    user_id: &str,
) -> Option<QuizSession> {
    let session = store.get(session_id)?;
    if session.user_id != user_id {
        tracing::warn!(session_id, user_id, "session belongs to another user; ignoring");
        return None;
    }
    Some(session)
}

// ---------------------------------------------------------------------------
// InMemorySessionStore
// ---------------------------------------------------------------------------

/// In-memory session store backed by `DashMap` for concurrent access.
pub struct InMemorySessionStore {
    sessions: DashMap<String, QuizSession>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> Option<QuizSession> {
        let entry = self.sessions.get(session_id)?;
        if entry.value().age(Utc::now()) > self.ttl {
            drop(entry); // release the read lock before removing
            self.sessions.remove(session_id);
            return None;
        }
        Some(entry.value().clone())
    }

    fn update(&self, session: QuizSession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.age(now) <= max_age);
    }
}

// ---------------------------------------------------------------------------
// Metadata sink
// ---------------------------------------------------------------------------

/// Writes a finished stream's metadata into the caller's session.
pub struct SessionMetadataSink {
    store: Arc<dyn SessionStore>,
    session_id: String,
    user_id: String,
}

impl SessionMetadataSink {
    pub fn new(
        store: Arc<dyn SessionStore>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl MetadataSink for SessionMetadataSink {
    fn on_metadata(&self, metadata: &QuizMetadata) {
        let mut session = match self.store.get(&self.session_id) {
            Some(existing) if existing.user_id != self.user_id => {
                tracing::warn!(
                    session_id = %self.session_id,
                    user_id = %self.user_id,
                    "not updating session owned by another user"
                );
                return;
            }
            Some(existing) => existing,
            None => QuizSession::new(&self.session_id, &self.user_id),
        };
        session.complete_turn(metadata);
        tracing::debug!(
            session_id = %session.session_id,
            turn_count = session.turn_count,
            has_analysis = !session.analysis.is_empty(),
            "session updated"
        );
        self.store.update(session);
    }
}
