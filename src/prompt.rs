// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Quiz system prompt
//
// The model is told to answer normally and then append the metadata marker
// followed by one JSON object. The stream splitter relies on that contract.

use serde::Deserialize;

use crate::message::{ChatMessage, Role};
use crate::stream::METADATA_MARKER;
use crate::usage::ActionType;

/// Upper bound on note text copied into the prompt, in chars.
const MAX_NOTE_CHARS: usize = 12_000;

/// The note a quiz is generated from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuizNote {
    pub title: String,
    pub content: String,
}

/// Build the system prompt for one quiz turn.
pub fn build_system_prompt(
    note: Option<&QuizNote>,
    previous_analysis: Option<&str>,
    action: ActionType,
) -> String {
    let mut prompt = String::from(
        "You are a quiz tutor. Ask the learner one question at a time about the note \
         below, evaluate each answer briefly and kindly, then ask the next question.\n",
    );

    if action == ActionType::QuizSummary {
        prompt.push_str(
            "The learner asked to finish. Do not ask another question; summarize how they did.\n",
        );
    }

    if let Some(note) = note {
        prompt.push_str("\n## Note: ");
        prompt.push_str(note.title.trim());
        prompt.push('\n');
        prompt.push_str(truncate_chars(note.content.trim(), MAX_NOTE_CHARS));
        prompt.push('\n');
    }

    if let Some(analysis) = previous_analysis.map(str::trim).filter(|a| !a.is_empty()) {
        prompt.push_str("\n## Your private notes on this learner so far\n");
        prompt.push_str(analysis);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\n## Output format\n\
         After your reply, on a new line, write {METADATA_MARKER} followed by a single JSON \
         object with exactly these string fields:\n\
         {{\"analysis\": \"private notes on the learner for your next turn\", \
         \"weaknesses\": \"topics the learner should review\", \
         \"conclusion\": \"one-sentence assessment shown to the learner\"}}\n\
         Never mention the marker or the JSON in your reply.\n"
    ));
    prompt
}

/// Replace any caller-supplied system messages with `system`.
pub fn with_system_prompt(system: String, messages: &[ChatMessage]) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::system(system))
        .chain(messages.iter().filter(|m| m.role != Role::System).cloned())
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
