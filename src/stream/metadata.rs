// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Metadata block parsing
//
// The model is asked for bare JSON after the marker but regularly wraps it
// in a markdown fence or adds a sentence after it. Parsing is layered from
// strict to lenient and never fails: the worst case is empty metadata.

use serde_json::Value;

use super::types::QuizMetadata;

/// Maximum number of characters of a bad block echoed into the log.
const LOG_EXCERPT_CHARS: usize = 120;

/// Parse the text collected after the marker.
pub fn parse_metadata(raw: &str) -> QuizMetadata {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return QuizMetadata::default();
    }

    let unfenced = strip_code_fence(trimmed);

    let parsed = serde_json::from_str::<Value>(unfenced)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(trimmed).ok())
        .or_else(|| extract_json_object(unfenced).and_then(|s| serde_json::from_str(s).ok()));

    match parsed {
        Some(value) => project(&value),
        None => {
            let excerpt: String = trimmed.chars().take(LOG_EXCERPT_CHARS).collect();
            tracing::warn!(%excerpt, "metadata block is not valid JSON; using empty metadata");
            QuizMetadata::default()
        }
    }
}

/// Keep only the known fields; anything missing or non-string becomes "".
fn project(value: &Value) -> QuizMetadata {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    QuizMetadata {
        analysis: field("analysis"),
        weaknesses: field("weaknesses"),
        conclusion: field("conclusion"),
    }
}

/// Remove a leading ```` ```lang ```` fence and a trailing ```` ``` ````.
fn strip_code_fence(text: &str) -> &str {
    let mut s = text;

    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.split_once('\n') {
            Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
            Some(_) => rest,
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }

    let tail = s.trim_end();
    if let Some(rest) = tail.strip_suffix("```") {
        s = rest;
    }

    s.trim()
}

/// Find the first top-level `{...}` block.
///
/// Braces inside JSON strings are ignored. If the block never closes, the
/// span from the first `{` to the last `}` is returned instead.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{"analysis":"a","weaknesses":"w","conclusion":"c"}"#;

    fn expected() -> QuizMetadata {
        QuizMetadata {
            analysis: "a".to_string(),
            weaknesses: "w".to_string(),
            conclusion: "c".to_string(),
        }
    }

    #[test]
    fn empty_input_gives_default() {
        assert_eq!(parse_metadata(""), QuizMetadata::default());
        assert_eq!(parse_metadata("  \n\t "), QuizMetadata::default());
    }

    #[test]
    fn bare_json_parses() {
        assert_eq!(parse_metadata(FULL), expected());
        assert_eq!(parse_metadata(&format!("\n  {FULL}  \n")), expected());
    }

    #[test]
    fn fenced_json_parses() {
        assert_eq!(parse_metadata(&format!("```json\n{FULL}\n```")), expected());
        assert_eq!(parse_metadata(&format!("```\n{FULL}\n```")), expected());
        assert_eq!(parse_metadata(&format!("```json{FULL}```")), expected());
    }

    #[test]
    fn trailing_commentary_is_ignored() {
        let raw = format!("{FULL}\n\nLet me know if you want another round!");
        assert_eq!(parse_metadata(&raw), expected());
    }

    #[test]
    fn fence_with_trailing_commentary() {
        let raw = format!("```json\n{FULL}\n```\nGood luck {{:)}}");
        assert_eq!(parse_metadata(&raw), expected());
    }

    #[test]
    fn leading_prose_is_ignored() {
        let raw = format!("Here is the metadata: {FULL}");
        assert_eq!(parse_metadata(&raw), expected());
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let raw = r#"{"analysis":"uses {curly} braces","weaknesses":"\"}\"","conclusion":"ok"} trailing"#;
        let meta = parse_metadata(raw);
        assert_eq!(meta.analysis, "uses {curly} braces");
        assert_eq!(meta.weaknesses, "\"}\"");
        assert_eq!(meta.conclusion, "ok");
    }

    #[test]
    fn garbage_gives_default() {
        assert_eq!(parse_metadata("no json here at all"), QuizMetadata::default());
        assert_eq!(parse_metadata("{ definitely: not json"), QuizMetadata::default());
        assert_eq!(parse_metadata("}{"), QuizMetadata::default());
    }

    #[test]
    fn missing_and_non_string_fields_become_empty() {
        let meta = parse_metadata(r#"{"weaknesses":["a","b"],"conclusion":"done","extra":1}"#);
        assert_eq!(
            meta,
            QuizMetadata {
                analysis: String::new(),
                weaknesses: String::new(),
                conclusion: "done".to_string(),
            }
        );
    }

    #[test]
    fn non_object_json_gives_default() {
        assert_eq!(parse_metadata("[1,2,3]"), QuizMetadata::default());
        assert_eq!(parse_metadata("\"just a string\""), QuizMetadata::default());
    }

    #[test]
    fn extraction_helpers() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{}"), "{}");
        assert_eq!(extract_json_object("x {\"a\":{\"b\":1}} y"), Some("{\"a\":{\"b\":1}}"));
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("{ \"a\": 1 } }"), Some("{ \"a\": 1 }"));
    }
}
