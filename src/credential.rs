// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Credential candidates
//
// Responsibilities:
// - Decide whether the platform key is usable
// - Look up and unseal a caller's own key (BYOK)
// - Produce the ordered candidate list the router iterates over
//
// Candidates are built per request and never persisted.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;

/// AES-256 key length in bytes.
const KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LENGTH: usize = 12;

/// Sealed values look like `v1:BASE64(nonce || ciphertext)`.
const SEALED_PREFIX: &str = "v1:";

// ---------------------------------------------------------------------------
// Credential candidate
// ---------------------------------------------------------------------------

/// Who pays for an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Platform,
    Byok,
}

impl KeySource {
    pub fn as_str(self) -> &'static str {
        match self {
            KeySource::Platform => "platform",
            KeySource::Byok => "byok",
        }
    }
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream credential the router may try.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialCandidate {
    pub source: KeySource,
    secret: String,
}

impl CredentialCandidate {
    pub fn new(source: KeySource, secret: impl Into<String>) -> Self {
        Self {
            source,
            secret: secret.into(),
        }
    }

    pub fn platform(secret: impl Into<String>) -> Self {
        Self::new(KeySource::Platform, secret)
    }

    pub fn byok(secret: impl Into<String>) -> Self {
        Self::new(KeySource::Byok, secret)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_byok(&self) -> bool {
        self.source == KeySource::Byok
    }
}

impl std::fmt::Debug for CredentialCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCandidate")
            .field("source", &self.source)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Values operators leave in config templates instead of a real key.
const PLACEHOLDER_KEYS: &[&str] = &[
    "changeme",
    "change-me",
    "your-api-key",
    "your_api_key",
    "your-openrouter-key",
    "sk-...",
    "todo",
];

/// Whether a configured platform key is obviously not a real key.
pub fn is_misconfigured_key(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() || key.contains("${") {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    PLACEHOLDER_KEYS.contains(&lower.as_str()) || lower.chars().all(|c| c == 'x')
}

/// The platform credential, if one is configured and usable.
pub fn platform_candidate(platform_key: Option<&str>) -> Option<CredentialCandidate> {
    match platform_key {
        Some(key) if !is_misconfigured_key(key) => Some(CredentialCandidate::platform(key.trim())),
        Some(_) => {
            tracing::warn!("platform key is misconfigured; skipping platform credential");
            None
        }
        None => None,
    }
}

/// Order candidates: platform first, then the caller's own key.
pub fn ordered_candidates(
    platform: Option<CredentialCandidate>,
    byok: Option<CredentialCandidate>,
) -> Vec<CredentialCandidate> {
    platform.into_iter().chain(byok).collect()
}

// ---------------------------------------------------------------------------
// Sealed key storage
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    #[error("sealed value is malformed: {0}")]
    Malformed(String),

    #[error("decryption failed: invalid key or corrupted data")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("key store unavailable: {0}")]
    Store(String),
}

/// AES-256-GCM sealing for user-supplied upstream keys at rest.
#[derive(Clone)]
pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build a vault from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, CredentialError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            CredentialError::InvalidKey(format!(
                "expected {KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(&key))
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CredentialError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{SEALED_PREFIX}{}", BASE64.encode(&combined)))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CredentialError> {
        let payload = sealed
            .trim()
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| CredentialError::Malformed("missing version prefix".to_string()))?;

        let combined = BASE64
            .decode(payload)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        if combined.len() <= NONCE_LENGTH {
            return Err(CredentialError::Malformed("value too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CredentialError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CredentialError::Decrypt)
    }
}

/// Where sealed BYOK keys live. Backed by the application database in
/// production; the bundled implementation is in-memory.
#[async_trait]
pub trait ByokKeyStore: Send + Sync {
    /// The caller's sealed key, if they registered one.
    async fn sealed_key(&self, user_id: &str) -> Result<Option<String>, CredentialError>;
}

#[derive(Default)]
pub struct InMemoryByokKeyStore {
    keys: DashMap<String, String>,
}

impl InMemoryByokKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, sealed: impl Into<String>) {
        self.keys.insert(user_id.into(), sealed.into());
    }
}

#[async_trait]
impl ByokKeyStore for InMemoryByokKeyStore {
    async fn sealed_key(&self, user_id: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.keys.get(user_id).map(|k| k.value().clone()))
    }
}

/// Look up and unseal the caller's key. Any failure (no vault, store error,
/// bad ciphertext) means "no BYOK candidate" and is logged, never surfaced.
pub async fn byok_candidate(
    store: &dyn ByokKeyStore,
    vault: Option<&KeyVault>,
    user_id: &str,
) -> Option<CredentialCandidate> {
    let sealed = match store.sealed_key(user_id).await {
        Ok(Some(sealed)) => sealed,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "BYOK key lookup failed");
            return None;
        }
    };

    let Some(vault) = vault else {
        tracing::warn!(user_id, "BYOK key present but no vault key configured");
        return None;
    };

    match vault.open(&sealed) {
        Ok(secret) if !secret.trim().is_empty() => Some(CredentialCandidate::byok(secret.trim())),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "BYOK key could not be decrypted");
            None
        }
    }
}
