// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::defaults::{
    DEFAULT_FREE_QUIZZES, DEFAULT_REFERER, DEFAULT_SESSION_TTL_SECS, DEFAULT_TEMPERATURE,
    DEFAULT_TITLE,
};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated quizgate config.
///
/// Loaded once at startup and shared behind `Arc`; nothing in the pipeline
/// reads ambient globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub upstream: UpstreamConfig,
    pub models: ModelCatalog,
    pub generation: GenerationConfig,
    /// Base64 AES-256-GCM key for sealed BYOK keys. `None` disables BYOK.
    pub byok_encryption_key: Option<String>,
    pub credits: CreditConfig,
    pub sessions: SessionConfig,
    /// Environment label (e.g. "development", "production").
    pub environment: String,
    /// SHA256 hash of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            upstream: UpstreamConfig::default(),
            models: ModelCatalog::default(),
            generation: GenerationConfig::default(),
            byok_encryption_key: None,
            credits: CreditConfig::default(),
            sessions: SessionConfig::default(),
            environment: String::new(),
            config_hash: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where and how to reach the upstream chat-completion provider.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Base URL without trailing slash, e.g. `https://openrouter.ai/api/v1`.
    pub base_url: String,
    /// Sent as `HTTP-Referer`.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
    /// Platform-wide key after interpolation. May still be misconfigured;
    /// see `credential::platform_candidate`.
    pub platform_key: Option<String>,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("platform_key", &self.platform_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: super::defaults::DEFAULT_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            platform_key: None,
        }
    }
}

/// Ordered premium and fallback model identifiers.
///
/// Invariant (enforced by the loader): the two lists are disjoint and
/// `fallback` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub premium: Vec<String>,
    pub fallback: Vec<String>,
}

impl ModelCatalog {
    pub fn is_premium(&self, model: &str) -> bool {
        self.premium.iter().any(|m| m == model)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            premium: super::defaults::default_premium_models(),
            fallback: super::defaults::default_fallback_models(),
        }
    }
}

/// Sampling parameters applied when the caller leaves them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// Parameters for the bundled in-memory credit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditConfig {
    /// Free-tier quizzes granted to an account on first sight.
    pub free_quizzes: u32,
    /// Platform-paid quiz starts allowed across all users. `None` = unlimited.
    pub platform_budget: Option<u64>,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            free_quizzes: DEFAULT_FREE_QUIZZES,
            platform_budget: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}
