// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Split state
//
// Incremental separation of visible chat text from the trailing metadata
// block. Pure and synchronous so it can be driven by scripted chunk
// sequences in tests; the async splitter wraps it.
//
// Invariants:
// - last_sent <= delimiter_idx.unwrap_or(full_text.len())
// - delimiter_idx and marker_end_idx never change once set
// - every offset is a UTF-8 char boundary in full_text

use super::metadata::parse_metadata;
use super::types::{QuizMetadata, METADATA_MARKER};

/// Result of finalizing a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalFlush {
    /// Visible content not yet forwarded, if any.
    pub tail: Option<String>,
    pub metadata: QuizMetadata,
}

#[derive(Debug, Clone)]
pub struct SplitState {
    marker: &'static str,
    full_text: String,
    last_sent: usize,
    delimiter_idx: Option<usize>,
    marker_end_idx: Option<usize>,
    /// Re-derived from `full_text` on every push once the marker is known.
    metadata_buffer: String,
    /// Where the next marker search starts; trails the end of `full_text`
    /// by less than one marker length.
    search_from: usize,
    finished: bool,
}

impl Default for SplitState {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitState {
    pub fn new() -> Self {
        Self::with_marker(METADATA_MARKER)
    }

    pub fn with_marker(marker: &'static str) -> Self {
        Self {
            marker,
            full_text: String::new(),
            last_sent: 0,
            delimiter_idx: None,
            marker_end_idx: None,
            metadata_buffer: String::new(),
            search_from: 0,
            finished: false,
        }
    }

    /// Append a content delta. Returns the visible text that is now safe to
    /// forward, if any.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if self.finished || delta.is_empty() {
            return None;
        }

        self.full_text.push_str(delta);
        self.locate_marker();

        if let Some(end) = self.marker_end_idx {
            self.metadata_buffer = self.full_text[end..].trim_start().to_string();
        }

        self.take_visible(self.safe_end())
    }

    /// Flush remaining visible text and parse the metadata. Returns `None`
    /// if the state was already finished.
    pub fn finish(&mut self) -> Option<FinalFlush> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let boundary = self.delimiter_idx.unwrap_or(self.full_text.len());
        let tail = self.take_visible(boundary);
        Some(FinalFlush {
            tail,
            metadata: parse_metadata(&self.metadata_buffer),
        })
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn last_sent(&self) -> usize {
        self.last_sent
    }

    pub fn delimiter_idx(&self) -> Option<usize> {
        self.delimiter_idx
    }

    pub fn marker_end_idx(&self) -> Option<usize> {
        self.marker_end_idx
    }

    pub fn metadata_buffer(&self) -> &str {
        &self.metadata_buffer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn locate_marker(&mut self) {
        if self.delimiter_idx.is_some() {
            return;
        }

        match self.full_text[self.search_from..].find(self.marker) {
            Some(rel) => {
                let start = self.search_from + rel;
                self.delimiter_idx = Some(self.full_text[..start].trim_end().len());
                self.marker_end_idx = Some(start + self.marker.len());
            }
            None => {
                let mut from = self
                    .full_text
                    .len()
                    .saturating_sub(self.marker.len().saturating_sub(1));
                while !self.full_text.is_char_boundary(from) {
                    from -= 1;
                }
                self.search_from = from;
            }
        }
    }

    /// Furthest offset that can be forwarded without leaking the marker or
    /// the whitespace in front of it.
    fn safe_end(&self) -> usize {
        if let Some(delimiter) = self.delimiter_idx {
            return delimiter;
        }
        let hold = partial_marker_len(&self.full_text, self.marker);
        self.full_text[..self.full_text.len() - hold].trim_end().len()
    }

    fn take_visible(&mut self, end: usize) -> Option<String> {
        if end <= self.last_sent {
            return None;
        }
        let chunk = self.full_text[self.last_sent..end].to_string();
        self.last_sent = end;
        Some(chunk)
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    let text = text.as_bytes();
    let marker = marker.as_bytes();
    let max = marker.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&n| text.ends_with(&marker[..n]))
        .unwrap_or(0)
}
