// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// These are separate from the public Config structs because:
// 1. Variable interpolation happens between raw and public
// 2. Validation (model list overlap, key length) needs the whole document
// 3. Keeps the public API free of Option-heavy shapes

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub quizgate: String,
    pub upstream: RawUpstreamConfig,
    pub models: Option<RawModelConfig>,
    pub generation: Option<RawGenerationConfig>,
    pub byok: Option<RawByokConfig>,
    pub credits: Option<RawCreditConfig>,
    pub sessions: Option<RawSessionConfig>,
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpstreamConfig {
    pub base_url: String,
    pub referer: Option<String>,
    pub title: Option<String>,
    /// Usually `${OPENROUTER_API_KEY}`. An unset variable means "no platform key".
    pub platform_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawModelConfig {
    #[serde(default)]
    pub premium: Vec<String>,
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawGenerationConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawByokConfig {
    /// Base64-encoded 32-byte AES-256-GCM key.
    pub encryption_key: String,
}

#[derive(Debug, Deserialize)]
pub struct RawCreditConfig {
    pub free_quizzes: Option<u32>,
    pub platform_budget: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawSessionConfig {
    pub ttl_secs: Option<u64>,
}
