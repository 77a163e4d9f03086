// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Upstream error classification
//
// Responsibilities:
// - Normalize an arbitrary upstream error body into a small closed record
// - Map that record onto a coarse ErrorKind with an ordered rule table
//
// Rule order matters: provider messages often carry several keywords at once
// ("rate limited: context length exceeded"), and the first match wins.

use serde_json::Value;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of an upstream chat-completion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The prompt does not fit the model. Retrying elsewhere cannot help.
    ContextLengthExceeded,
    InsufficientQuota,
    RateLimitExceeded,
    InvalidModel,
    InvalidApiKey,
}

impl ErrorKind {
    /// Whether another (credential, model) candidate could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::ContextLengthExceeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ContextLengthExceeded => "context_length_exceeded",
            ErrorKind::InsufficientQuota => "insufficient_quota",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::InvalidModel => "invalid_model",
            ErrorKind::InvalidApiKey => "invalid_api_key",
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorEnvelope
// ---------------------------------------------------------------------------

/// Normalized view of an upstream error payload.
///
/// Every field is lower-cased; absent or non-scalar fields are empty strings,
/// so the rule table never has to deal with missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub message: String,
    pub code: String,
    pub kind: String,
    pub status: String,
}

impl ErrorEnvelope {
    /// Build an envelope from an upstream payload.
    ///
    /// Accepted shapes:
    /// - `{"error": {"message", "code", "type", "status"}}` (OpenAI style)
    /// - `{"error": "some message"}`
    /// - `{"message", "code", "type", "status"}` (flat)
    ///
    /// Anything that is not a JSON object yields an empty envelope.
    pub fn from_value(payload: &Value) -> Self {
        let Some(root) = payload.as_object() else {
            return Self::default();
        };

        match root.get("error") {
            Some(Value::Object(nested)) => Self::from_fields(|k| nested.get(k)),
            Some(Value::String(msg)) => {
                let mut env = Self::from_fields(|k| root.get(k));
                env.message = msg.to_lowercase();
                env
            }
            _ => Self::from_fields(|k| root.get(k)),
        }
    }

    fn from_fields<'a>(get: impl Fn(&str) -> Option<&'a Value>) -> Self {
        Self {
            message: scalar_lower(get("message")),
            code: scalar_lower(get("code")),
            kind: scalar_lower(get("type")),
            status: scalar_lower(get("status")),
        }
    }
}

fn scalar_lower(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify an upstream error payload. Returns `None` when no rule matches.
pub fn classify(payload: &Value) -> Option<ErrorKind> {
    classify_envelope(&ErrorEnvelope::from_value(payload))
}

/// Apply the ordered rule table to an already-normalized envelope.
pub fn classify_envelope(env: &ErrorEnvelope) -> Option<ErrorKind> {
    let msg = env.message.as_str();
    let code_or_type = |needle: &str| env.code == needle || env.kind == needle;
    let code_or_status = |needle: &str| env.code == needle || env.status == needle;

    if (msg.contains("context") && msg.contains("length"))
        || code_or_type("context_length_exceeded")
    {
        return Some(ErrorKind::ContextLengthExceeded);
    }

    if msg.contains("quota") || msg.contains("insufficient") || code_or_type("insufficient_quota")
    {
        return Some(ErrorKind::InsufficientQuota);
    }

    if msg.contains("rate") || msg.contains("429") || code_or_status("429") {
        return Some(ErrorKind::RateLimitExceeded);
    }

    if msg.contains("invalid model")
        || (msg.contains("model") && msg.contains("invalid"))
        || env.code == "invalid_model"
    {
        return Some(ErrorKind::InvalidModel);
    }

    if msg.contains("invalid api key")
        || msg.contains("unauthorized")
        || code_or_status("401")
        || code_or_status("invalid_api_key")
    {
        return Some(ErrorKind::InvalidApiKey);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // Envelope normalization
    // -----------------------------------------------------------------------

    #[test]
    fn envelope_prefers_nested_error_object() {
        let env = ErrorEnvelope::from_value(&json!({
            "message": "outer",
            "error": {"message": "Inner Message", "code": 429, "type": "Rate_Limit"}
        }));
        assert_eq!(env.message, "inner message");
        assert_eq!(env.code, "429");
        assert_eq!(env.kind, "rate_limit");
        assert_eq!(env.status, "");
    }

    #[test]
    fn envelope_reads_flat_payload() {
        let env = ErrorEnvelope::from_value(&json!({"message": "Boom", "status": 401}));
        assert_eq!(env.message, "boom");
        assert_eq!(env.status, "401");
    }

    #[test]
    fn envelope_accepts_string_error() {
        let env = ErrorEnvelope::from_value(&json!({"error": "Unauthorized", "status": 401}));
        assert_eq!(env.message, "unauthorized");
        assert_eq!(env.status, "401");
    }

    #[test]
    fn envelope_of_non_object_is_empty() {
        assert_eq!(ErrorEnvelope::from_value(&json!("nope")), ErrorEnvelope::default());
        assert_eq!(ErrorEnvelope::from_value(&json!([1, 2])), ErrorEnvelope::default());
        assert_eq!(ErrorEnvelope::from_value(&Value::Null), ErrorEnvelope::default());
    }

    #[test]
    fn envelope_ignores_non_scalar_fields() {
        let env = ErrorEnvelope::from_value(&json!({"error": {"message": {"x": 1}, "code": null}}));
        assert_eq!(env, ErrorEnvelope::default());
    }

    // -----------------------------------------------------------------------
    // Rule table
    // -----------------------------------------------------------------------

    #[test]
    fn context_length_by_message() {
        let p = json!({"error": {"message": "This model's maximum context length is 8192 tokens"}});
        assert_eq!(classify(&p), Some(ErrorKind::ContextLengthExceeded));
    }

    #[test]
    fn context_length_by_code_or_type() {
        assert_eq!(
            classify(&json!({"error": {"code": "context_length_exceeded"}})),
            Some(ErrorKind::ContextLengthExceeded)
        );
        assert_eq!(
            classify(&json!({"error": {"type": "context_length_exceeded"}})),
            Some(ErrorKind::ContextLengthExceeded)
        );
    }

    #[test]
    fn context_length_wins_over_every_other_keyword() {
        let p = json!({"error": {
            "message": "rate limited: insufficient quota, invalid model, unauthorized, context length too long",
            "code": 429,
            "status": 401
        }});
        assert_eq!(classify(&p), Some(ErrorKind::ContextLengthExceeded));
    }

    #[test]
    fn context_alone_is_not_enough() {
        let p = json!({"error": {"message": "context missing"}});
        assert_eq!(classify(&p), None);
    }

    #[test]
    fn insufficient_quota_variants() {
        for p in [
            json!({"error": {"message": "You exceeded your current quota"}}),
            json!({"error": {"message": "Insufficient credits"}}),
            json!({"error": {"code": "insufficient_quota"}}),
            json!({"error": {"type": "insufficient_quota"}}),
        ] {
            assert_eq!(classify(&p), Some(ErrorKind::InsufficientQuota), "{p}");
        }
    }

    #[test]
    fn quota_wins_over_rate_limit() {
        let p = json!({"error": {"message": "rate limit reached: quota exceeded", "code": 429}});
        assert_eq!(classify(&p), Some(ErrorKind::InsufficientQuota));
    }

    #[test]
    fn rate_limit_variants() {
        for p in [
            json!({"error": {"message": "Rate limit exceeded"}}),
            json!({"error": {"message": "HTTP 429 from provider"}}),
            json!({"error": {"code": 429}}),
            json!({"status": "429"}),
        ] {
            assert_eq!(classify(&p), Some(ErrorKind::RateLimitExceeded), "{p}");
        }
    }

    #[test]
    fn invalid_model_variants() {
        for p in [
            json!({"error": {"message": "Invalid model: foo/bar"}}),
            json!({"error": {"message": "model foo is invalid"}}),
            json!({"error": {"code": "invalid_model"}}),
        ] {
            assert_eq!(classify(&p), Some(ErrorKind::InvalidModel), "{p}");
        }
    }

    #[test]
    fn invalid_model_wins_over_invalid_key_keywords() {
        let p = json!({"error": {"message": "invalid model, also unauthorized", "code": 401}});
        assert_eq!(classify(&p), Some(ErrorKind::InvalidModel));
    }

    #[test]
    fn invalid_api_key_variants() {
        for p in [
            json!({"error": {"message": "Invalid API key provided"}}),
            json!({"error": {"message": "Unauthorized"}}),
            json!({"error": {"code": 401}}),
            json!({"status": 401}),
            json!({"error": {"code": "invalid_api_key"}}),
        ] {
            assert_eq!(classify(&p), Some(ErrorKind::InvalidApiKey), "{p}");
        }
    }

    #[test]
    fn unclassified_payloads_return_none() {
        assert_eq!(classify(&json!({"error": {"message": "upstream exploded"}})), None);
        assert_eq!(classify(&json!({"raw": "<html>bad gateway</html>"})), None);
        assert_eq!(classify(&json!(null)), None);
    }

    #[test]
    fn only_context_length_is_non_retryable() {
        assert!(!ErrorKind::ContextLengthExceeded.is_retryable());
        assert!(ErrorKind::RateLimitExceeded.is_retryable());
        assert!(ErrorKind::InvalidApiKey.is_retryable());
    }
}
