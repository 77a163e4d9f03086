// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Usage log
//
// One entry per successful upstream call. Recording is best-effort: it runs
// as a spawned task and a failure is logged, never propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// What the caller was doing when the upstream call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    QuizChat,
    QuizStart,
    QuizSummary,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::QuizChat => "quiz_chat",
            ActionType::QuizStart => "quiz_start",
            ActionType::QuizSummary => "quiz_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quiz_chat" => Some(ActionType::QuizChat),
            "quiz_start" => Some(ActionType::QuizStart),
            "quiz_summary" => Some(ActionType::QuizSummary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEntry {
    pub user_id: String,
    /// `"{key_source}:{model}"`, e.g. `"byok:openai/gpt-4o"`.
    pub model_used: String,
    pub action_type: ActionType,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage store unavailable: {0}")]
    Store(String),
}

#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, entry: UsageEntry) -> Result<(), UsageError>;
}

/// Emits usage entries as structured log events.
pub struct TracingUsageRecorder;

#[async_trait]
impl UsageRecorder for TracingUsageRecorder {
    async fn record(&self, entry: UsageEntry) -> Result<(), UsageError> {
        tracing::info!(
            user_id = %entry.user_id,
            model_used = %entry.model_used,
            action_type = entry.action_type.as_str(),
            "usage recorded"
        );
        Ok(())
    }
}

/// Keeps entries in memory. Used by tests and single-instance deployments.
#[derive(Default)]
pub struct InMemoryUsageLog {
    entries: Mutex<Vec<UsageEntry>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<UsageEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UsageRecorder for InMemoryUsageLog {
    async fn record(&self, entry: UsageEntry) -> Result<(), UsageError> {
        self.entries
            .lock()
            .map_err(|_| UsageError::Store("usage log lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Record a usage entry in the background. Never fails the caller.
pub fn record_in_background(recorder: Arc<dyn UsageRecorder>, entry: UsageEntry) {
    tokio::spawn(async move {
        let user_id = entry.user_id.clone();
        if let Err(e) = recorder.record(entry).await {
            tracing::warn!(%user_id, error = %e, "failed to record usage");
        }
    });
}
