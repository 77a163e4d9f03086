// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::credential::KeyVault;

use super::defaults::{DEFAULT_REFERER, DEFAULT_TITLE};
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a quizgate config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version, URLs, model lists and sampling defaults
/// 5. Resolve variable interpolation in string fields
/// 6. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.quizgate != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.quizgate
        )));
    }

    let upstream = build_upstream_config(raw.upstream)?;
    let models = build_model_catalog(raw.models)?;
    let generation = build_generation_config(raw.generation)?;
    let byok_encryption_key = build_byok_key(raw.byok)?;

    let credits = raw
        .credits
        .map(|c| CreditConfig {
            free_quizzes: c.free_quizzes.unwrap_or(CreditConfig::default().free_quizzes),
            platform_budget: c.platform_budget,
        })
        .unwrap_or_default();

    let sessions = match raw.sessions.and_then(|s| s.ttl_secs) {
        Some(0) => {
            return Err(ConfigError::Validation(
                "sessions.ttl_secs must be greater than zero".to_string(),
            ))
        }
        Some(secs) => SessionConfig {
            ttl: Duration::from_secs(secs),
        },
        None => SessionConfig::default(),
    };

    Ok(Config {
        version: raw.quizgate,
        upstream,
        models,
        generation,
        byok_encryption_key,
        credits,
        sessions,
        environment: raw.environment.unwrap_or_default(),
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_upstream_config(raw: raw::RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    let base_url = resolve_variables(raw.base_url.trim())?
        .trim_end_matches('/')
        .to_string();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url must be an http(s) URL, got \"{base_url}\""
        )));
    }

    // An unset key variable disables the platform credential instead of
    // failing startup: BYOK-only deployments are valid.
    let platform_key = match raw.platform_key {
        None => None,
        Some(value) => match resolve_variables(&value) {
            Ok(resolved) => Some(resolved),
            Err(ConfigError::UndefinedVariable { name }) => {
                tracing::warn!(
                    variable = %name,
                    "platform key variable not set; platform credential disabled"
                );
                None
            }
            Err(e) => return Err(e),
        },
    };

    Ok(UpstreamConfig {
        base_url,
        referer: raw
            .referer
            .map(|r| resolve_variables(&r))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_REFERER.to_string()),
        title: raw
            .title
            .map(|t| resolve_variables(&t))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        platform_key,
    })
}

fn build_model_catalog(raw: Option<raw::RawModelConfig>) -> Result<ModelCatalog, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(ModelCatalog::default()),
    };

    let clean = |list: Vec<String>, name: &str| -> Result<Vec<String>, ConfigError> {
        list.into_iter()
            .map(|m| {
                let m = m.trim().to_string();
                if m.is_empty() {
                    Err(ConfigError::Validation(format!(
                        "models.{name} contains an empty model identifier"
                    )))
                } else {
                    Ok(m)
                }
            })
            .collect()
    };

    let premium = clean(raw.premium, "premium")?;
    let fallback = clean(raw.fallback, "fallback")?;

    if fallback.is_empty() {
        return Err(ConfigError::Validation(
            "models.fallback must list at least one model".to_string(),
        ));
    }

    let premium_set: HashSet<&str> = premium.iter().map(String::as_str).collect();
    if let Some(shared) = fallback.iter().find(|m| premium_set.contains(m.as_str())) {
        return Err(ConfigError::Validation(format!(
            "model \"{shared}\" is listed as both premium and fallback"
        )));
    }

    Ok(ModelCatalog { premium, fallback })
}

fn build_generation_config(
    raw: Option<raw::RawGenerationConfig>,
) -> Result<GenerationConfig, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(GenerationConfig::default()),
    };

    let temperature = raw.temperature.unwrap_or(GenerationConfig::default().temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Validation(format!(
            "generation.temperature must be within [0, 2], got {temperature}"
        )));
    }
    if raw.max_tokens == Some(0) {
        return Err(ConfigError::Validation(
            "generation.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(GenerationConfig {
        temperature,
        max_tokens: raw.max_tokens,
    })
}

fn build_byok_key(raw: Option<raw::RawByokConfig>) -> Result<Option<String>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let key = resolve_variables(raw.encryption_key.trim())?;
    KeyVault::from_base64(&key)
        .map_err(|e| ConfigError::Validation(format!("byok.encryption_key: {e}")))?;
    Ok(Some(key))
}
