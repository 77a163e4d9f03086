// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Quiz response streaming
//
// Responsibilities:
// - Parse the upstream OpenAI-style SSE stream
// - Forward visible answer text immediately, holding back anything that
//   could be the start of the metadata marker
// - Collect the JSON block after the marker and parse it leniently
// - Emit exactly one metadata event (without `analysis`) and `[DONE]`,
//   even when the upstream read fails mid-stream

mod classifier;
mod metadata;
mod splitter;
mod state;
mod types;

pub use classifier::{classify_frame, parse_sse_line};
pub use metadata::parse_metadata;
pub use splitter::{content_frame, metadata_frame, StreamSplitter};
pub use state::{FinalFlush, SplitState};
pub use types::{
    FrameKind, MetadataEvent, MetadataSink, PublicMetadata, QuizMetadata, SseChunk, DONE_FRAME,
    METADATA_MARKER,
};
