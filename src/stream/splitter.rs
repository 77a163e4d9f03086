// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream splitter
//
// Takes the upstream response body, reassembles SSE lines, feeds content
// deltas through SplitState, and produces the normalized output stream:
// content frames, exactly one metadata frame, then `[DONE]`.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::classifier::{classify_frame, parse_sse_line};
use super::state::SplitState;
use super::types::{
    FrameKind, MetadataEvent, MetadataSink, QuizMetadata, DONE_FRAME, METADATA_MARKER,
};
use crate::upstream::{ByteStream, HttpBody, HttpError};

/// Output channel depth. Backpressure reaches the upstream reader when the
/// browser is slow.
const CHANNEL_CAPACITY: usize = 64;

/// Splits an upstream chat stream into visible content and trailing metadata.
pub struct StreamSplitter {
    marker: &'static str,
    sink: Option<Arc<dyn MetadataSink>>,
}

impl Default for StreamSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSplitter {
    pub fn new() -> Self {
        Self {
            marker: METADATA_MARKER,
            sink: None,
        }
    }

    /// Hand the full metadata (including `analysis`) to `sink` after
    /// finalization.
    pub fn with_sink(mut self, sink: Arc<dyn MetadataSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start splitting `body`. The work runs on a spawned task; the returned
    /// stream yields ready-to-send SSE frames.
    pub fn split(&self, body: HttpBody) -> impl Stream<Item = Bytes> + Send + 'static {
        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let mut run = SplitRun::new(self.marker, tx);
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let mut input: ByteStream = match body {
                HttpBody::Stream(s) => s,
                HttpBody::Full(bytes) => {
                    Box::pin(futures_util::stream::once(async move {
                        Ok::<Bytes, HttpError>(bytes)
                    }))
                }
                HttpBody::Empty => {
                    tracing::warn!(
                        "upstream response has no readable body; sending empty metadata"
                    );
                    run.finalize(sink.as_deref()).await;
                    return;
                }
            };

            loop {
                // Nothing is sent after the marker, so watch the channel
                // directly instead of waiting for a failed send.
                let item = tokio::select! {
                    biased;
                    _ = run.tx.closed() => {
                        tracing::debug!("client disconnected; stopping upstream read");
                        return;
                    }
                    item = input.next() => item,
                };
                match item {
                    Some(Ok(bytes)) => {
                        if run.feed(&bytes).await.is_err() {
                            tracing::debug!("client disconnected; stopping upstream read");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            error = %e,
                            "upstream stream read failed; finalizing with partial content"
                        );
                        break;
                    }
                    None => break,
                }
            }

            run.finalize(sink.as_deref()).await;
        });

        ReceiverStream::new(rx)
    }
}

// ---------------------------------------------------------------------------
// Per-stream run state
// ---------------------------------------------------------------------------

/// Client went away; the channel is closed.
struct Disconnected;

struct SplitRun {
    state: SplitState,
    /// Bytes after the last newline, waiting for the rest of the line.
    line_buffer: Vec<u8>,
    tx: mpsc::Sender<Bytes>,
}

impl SplitRun {
    fn new(marker: &'static str, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            state: SplitState::with_marker(marker),
            line_buffer: Vec::new(),
            tx,
        }
    }

    /// Consume one network chunk.
    async fn feed(&mut self, bytes: &[u8]) -> Result<(), Disconnected> {
        self.line_buffer.extend_from_slice(bytes);

        while let Some(pos) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.line_buffer.drain(..=pos).collect();
            self.process_line(&line[..pos]).await?;
        }
        Ok(())
    }

    async fn process_line(&mut self, raw: &[u8]) -> Result<(), Disconnected> {
        let line = String::from_utf8_lossy(raw);
        let Some(chunk) = parse_sse_line(&line) else {
            return Ok(());
        };

        match classify_frame(&chunk) {
            FrameKind::Content(delta) => {
                if let Some(visible) = self.state.push(&delta) {
                    self.send(content_frame(&visible)).await?;
                }
            }
            FrameKind::Malformed => {
                tracing::debug!(line = %line, "skipping malformed SSE frame");
            }
            FrameKind::Control | FrameKind::Done => {}
        }
        Ok(())
    }

    /// Flush, emit metadata and `[DONE]`. Runs at most once: the split state
    /// refuses a second finish. The sink only hears about metadata the client
    /// actually received.
    async fn finalize(&mut self, sink: Option<&dyn MetadataSink>) {
        if !self.line_buffer.is_empty() {
            let rest = std::mem::take(&mut self.line_buffer);
            if self.process_line(&rest).await.is_err() {
                return;
            }
        }

        let Some(flush) = self.state.finish() else {
            return;
        };

        if self.emit_final(flush.tail.as_deref(), &flush.metadata).await.is_err() {
            tracing::debug!("client disconnected before metadata; skipping sink");
            return;
        }

        tracing::debug!(
            visible_bytes = self.state.last_sent(),
            has_metadata = !flush.metadata.is_empty(),
            "stream finalized"
        );

        if let Some(sink) = sink {
            sink.on_metadata(&flush.metadata);
        }
    }

    async fn emit_final(
        &self,
        tail: Option<&str>,
        metadata: &QuizMetadata,
    ) -> Result<(), Disconnected> {
        if let Some(tail) = tail {
            self.send(content_frame(tail)).await?;
        }
        self.send(metadata_frame(&MetadataEvent::new(metadata.public())))
            .await?;
        self.send(Bytes::from_static(DONE_FRAME.as_bytes())).await
    }

    async fn send(&self, frame: Bytes) -> Result<(), Disconnected> {
        self.tx.send(frame).await.map_err(|_| Disconnected)
    }
}

// ---------------------------------------------------------------------------
// Frame encoding
// ---------------------------------------------------------------------------

pub fn content_frame(text: &str) -> Bytes {
    let payload = serde_json::json!({
        "choices": [{ "delta": { "content": text } }]
    });
    Bytes::from(format!("data: {payload}\n\n"))
}

pub fn metadata_frame(event: &MetadataEvent) -> Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"metadata","data":{"weaknesses":"","conclusion":""}}"#.to_string()
    });
    Bytes::from(format!("data: {payload}\n\n"))
}
