// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Upstream frame classification
//
// The upstream speaks the OpenAI-compatible streaming format:
// - `data: {"choices":[{"delta":{"content":"Hello"}}]}` -> Content
// - `data: {"choices":[{"delta":{"role":"assistant"}}]}` -> Control
// - `data: {"choices":[{"finish_reason":"stop"}]}` -> Control
// - `data: [DONE]` -> Done
// - `: OPENROUTER PROCESSING` (comment) -> not a frame

use super::types::{FrameKind, SseChunk};

/// Parse one SSE line into a chunk. Returns `None` for blank lines,
/// comments, and non-`data:` fields.
pub fn parse_sse_line(line: &str) -> Option<SseChunk> {
    let trimmed = line.trim();

    // Empty line is an event separator in SSE, not a chunk
    if trimmed.is_empty() {
        return None;
    }

    // Comment lines start with ':' (keep-alives)
    if trimmed.starts_with(':') {
        return None;
    }

    trimmed
        .strip_prefix("data:")
        .map(|data| SseChunk {
            data: data.trim_start().to_string(),
        })
}

/// Classify a `data:` payload.
pub fn classify_frame(chunk: &SseChunk) -> FrameKind {
    let data = chunk.data.trim();

    if data == "[DONE]" {
        return FrameKind::Done;
    }

    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return FrameKind::Malformed,
    };

    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| FrameKind::Content(c.to_string()))
        .unwrap_or(FrameKind::Control)
}
