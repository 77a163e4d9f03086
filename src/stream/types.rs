// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Core types for the quiz SSE stream: upstream frames, their
// classification, and the trailing metadata block.

use serde::Serialize;

/// Delimiter the model is instructed to emit between the visible answer
/// and the trailing metadata JSON.
pub const METADATA_MARKER: &str = "<<METADATA_JSON>>";

/// Terminating frame of the normalized stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// SSE frame representation
// ---------------------------------------------------------------------------

/// A parsed `data:` line from the upstream response stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SseChunk {
    /// The raw data payload (everything after `data:`).
    pub data: String,
}

/// What a single upstream frame carries.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// A text delta from `choices[0].delta.content`.
    Content(String),
    /// Role-only deltas, finish reasons, usage blocks.
    Control,
    /// `data: [DONE]`.
    Done,
    /// Payload that is not valid JSON. Skipped.
    Malformed,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// The full metadata block the model appends after the marker.
///
/// `analysis` is server-side context for continuing the session and is
/// never sent to the browser; see `PublicMetadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizMetadata {
    pub analysis: String,
    pub weaknesses: String,
    pub conclusion: String,
}

impl QuizMetadata {
    pub fn is_empty(&self) -> bool {
        self.analysis.is_empty() && self.weaknesses.is_empty() && self.conclusion.is_empty()
    }

    pub fn public(&self) -> PublicMetadata {
        PublicMetadata {
            weaknesses: self.weaknesses.clone(),
            conclusion: self.conclusion.clone(),
        }
    }
}

/// The browser-facing subset of `QuizMetadata`. Has no `analysis` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublicMetadata {
    pub weaknesses: String,
    pub conclusion: String,
}

/// `{"type":"metadata","data":{...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: PublicMetadata,
}

impl MetadataEvent {
    pub fn new(data: PublicMetadata) -> Self {
        Self {
            kind: "metadata",
            data,
        }
    }
}

/// Receives the full metadata (including `analysis`) once a stream has been
/// finalized. Called from the splitter task; must not block.
pub trait MetadataSink: Send + Sync {
    fn on_metadata(&self, metadata: &QuizMetadata);
}
