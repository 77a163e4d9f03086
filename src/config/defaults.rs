// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REFERER: &str = "https://quizgate.app";
pub const DEFAULT_TITLE: &str = "Quizgate";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_FREE_QUIZZES: u32 = 5;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Paid-tier models, tried first for eligible callers.
pub fn default_premium_models() -> Vec<String> {
    ["anthropic/claude-3.5-sonnet", "openai/gpt-4o"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Free-tier models, tried last (or exclusively for free callers).
pub fn default_fallback_models() -> Vec<String> {
    [
        "meta-llama/llama-3.3-70b-instruct:free",
        "google/gemini-2.0-flash-exp:free",
        "mistralai/mistral-7b-instruct:free",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
