//! Prompt template rendering and validation.
//!
//! Templates are plain strings with two placeholder tokens: `{{text}}` for
//! the source paragraph and `{{translation}}` for the current result
//! (proofread only). Validation happens before any network request so a
//! broken template never costs an API call.

use crate::error::{Error, Result};

/// Placeholder for the unit's source text.
pub const SOURCE_PLACEHOLDER: &str = "{{text}}";
/// Placeholder for the unit's current translation (proofread templates).
pub const TRANSLATION_PLACEHOLDER: &str = "{{translation}}";

fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

fn require_exactly_one(template: &str, placeholder: &str) -> Result<()> {
    match occurrences(template, placeholder) {
        1 => Ok(()),
        n => Err(Error::PromptTemplate(format!(
            "expected exactly one '{placeholder}' placeholder, found {n}"
        ))),
    }
}

/// Render a translate prompt. Fails if `{{text}}` does not occur exactly once.
pub fn render_translate(template: &str, text: &str) -> Result<String> {
    require_exactly_one(template, SOURCE_PLACEHOLDER)?;
    Ok(template.replacen(SOURCE_PLACEHOLDER, text, 1))
}

/// Render a proofread prompt. Fails unless both `{{text}}` and
/// `{{translation}}` occur exactly once.
pub fn render_proofread(template: &str, text: &str, translation: &str) -> Result<String> {
    require_exactly_one(template, SOURCE_PLACEHOLDER)?;
    require_exactly_one(template, TRANSLATION_PLACEHOLDER)?;
    Ok(template
        .replacen(SOURCE_PLACEHOLDER, text, 1)
        .replacen(TRANSLATION_PLACEHOLDER, translation, 1))
}

/// Append surrounding paragraphs to a rendered prompt so the model sees the
/// unit in context. Empty context slices leave the prompt untouched.
pub fn with_context(prompt: String, before: &[String], after: &[String]) -> String {
    if before.is_empty() && after.is_empty() {
        return prompt;
    }

    let mut out = prompt;
    if !before.is_empty() {
        out.push_str("\n\nPreceding context (do not translate):\n");
        out.push_str(&before.join("\n\n"));
    }
    if !after.is_empty() {
        out.push_str("\n\nFollowing context (do not translate):\n");
        out.push_str(&after.join("\n\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_translate() {
        let rendered = render_translate("Translate:\n{{text}}", "Bonjour").expect("valid");
        assert_eq!(rendered, "Translate:\nBonjour");
    }

    #[test]
    fn test_translate_rejects_zero_placeholders() {
        let err = render_translate("Translate this.", "Bonjour").unwrap_err();
        assert!(matches!(err, Error::PromptTemplate(_)));
    }

    #[test]
    fn test_translate_rejects_duplicate_placeholders() {
        let err = render_translate("{{text}} {{text}}", "Bonjour").unwrap_err();
        assert!(matches!(err, Error::PromptTemplate(_)));
    }

    #[test]
    fn test_proofread_requires_both_placeholders() {
        let err = render_proofread("Fix: {{text}}", "Bonjour", "Hello").unwrap_err();
        assert!(matches!(err, Error::PromptTemplate(_)));

        let rendered = render_proofread("O: {{text}}\nT: {{translation}}", "Bonjour", "Hello")
            .expect("valid");
        assert_eq!(rendered, "O: Bonjour\nT: Hello");
    }

    #[test]
    fn test_placeholder_replaced_once_even_if_text_contains_token() {
        // A paragraph that itself contains the token must not recurse
        let rendered = render_translate("{{text}}", "literal {{text}} inside").expect("valid");
        assert_eq!(rendered, "literal {{text}} inside");
    }

    #[test]
    fn test_context_appended() {
        let out = with_context(
            "P".to_string(),
            &["before".to_string()],
            &["after".to_string()],
        );
        assert!(out.starts_with('P'));
        assert!(out.contains("before"));
        assert!(out.contains("after"));
    }
}
