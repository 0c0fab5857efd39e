//! Prompt sanitizing and retry framing
//!
//! The framing rotation is a pure function of the attempt index, never a
//! stateful counter, so retries stay idempotent and each attempt's prompt is
//! reproducible from (sanitized prompt, attempt) alone.

use crate::error::{GenerationError, GenerationResult};

/// Minimum prompt length after sanitizing. Shorter prompts produce generic,
/// unusable creatives; rejecting early saves an attempt and a credit.
pub const MIN_PROMPT_CHARS: usize = 20;

/// Framing templates rotated through on retry attempts so a repeated failure
/// never resends an identical prompt to the provider.
const FRAMING_TEMPLATES: &[&str] = &[
    "Write a persuasive ad for the following offer: {}",
    "Create a bold, attention-grabbing ad campaign around: {}",
    "Describe the customer benefit first, then pitch: {}",
    "Write a short, friendly ad speaking directly to one reader: {}",
    "Highlight urgency and a clear call to action for: {}",
];

/// Strip disallowed characters and normalize whitespace.
///
/// Rejects with [`GenerationError::PromptTooShort`] below the minimum length.
/// This is a hard precondition: the caller must not retry it.
pub fn sanitize_prompt(raw: &str) -> GenerationResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '.' | ',' | '!' | '?' | '\'' | '"' | '-' | ':' | ';' | '(' | ')' | '&' | '%' | '$' | '/')
        })
        .collect();

    let sanitized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let length = sanitized.chars().count();
    if length < MIN_PROMPT_CHARS {
        return Err(GenerationError::PromptTooShort {
            length,
            minimum: MIN_PROMPT_CHARS,
        });
    }

    Ok(sanitized)
}

/// Prompt to send on a given attempt.
///
/// Attempt 0 sends the sanitized prompt untransformed; attempt `n > 0`
/// selects a framing template by `n mod N`.
pub fn prompt_for_attempt(sanitized: &str, attempt: u32) -> String {
    if attempt == 0 {
        return sanitized.to_string();
    }

    let template = FRAMING_TEMPLATES[attempt as usize % FRAMING_TEMPLATES.len()];
    template.replacen("{}", sanitized, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_disallowed_characters() {
        let result = sanitize_prompt("Fresh <script>alert()</script> bread, baked daily!");
        #[allow(clippy::unwrap_used)]
        let sanitized = result.unwrap();
        assert!(!sanitized.contains('<'));
        assert!(!sanitized.contains('>'));
        assert!(sanitized.contains("Fresh"));
        assert!(sanitized.contains("bread, baked daily!"));
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        #[allow(clippy::unwrap_used)]
        let sanitized = sanitize_prompt("organic   coffee\n\nroasted  locally every week").unwrap();
        assert_eq!(sanitized, "organic coffee roasted locally every week");
    }

    #[test]
    fn test_short_prompt_rejected() {
        let result = sanitize_prompt("too short");
        assert!(matches!(
            result,
            Err(GenerationError::PromptTooShort { minimum: MIN_PROMPT_CHARS, .. })
        ));
    }

    #[test]
    fn test_stripping_can_push_prompt_below_minimum() {
        // Long enough raw, but mostly disallowed characters
        let result = sanitize_prompt("@@@@@@@@@@@@@@@@ ok @@@@@@@@@@@@@@@@");
        assert!(matches!(result, Err(GenerationError::PromptTooShort { .. })));
    }

    #[test]
    fn test_attempt_zero_is_untransformed() {
        let prompt = "handmade ceramic mugs for coffee lovers";
        assert_eq!(prompt_for_attempt(prompt, 0), prompt);
    }

    #[test]
    fn test_retry_attempts_use_distinct_framings() {
        let prompt = "handmade ceramic mugs for coffee lovers";
        let mut seen = std::collections::HashSet::new();
        seen.insert(prompt_for_attempt(prompt, 0));

        // Every retry below the rotation length produces a fresh prompt
        for attempt in 1..FRAMING_TEMPLATES.len() as u32 {
            let framed = prompt_for_attempt(prompt, attempt);
            assert!(framed.contains(prompt));
            assert!(seen.insert(framed), "attempt {} repeated a prompt", attempt);
        }
    }

    #[test]
    fn test_framing_is_deterministic() {
        let prompt = "weekly meal prep delivery for busy families";
        assert_eq!(prompt_for_attempt(prompt, 2), prompt_for_attempt(prompt, 2));
    }
}
