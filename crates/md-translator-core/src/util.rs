//! Utility functions shared across the crate.

use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Strip the model's thinking spans from a result snapshot.
///
/// Reasoning models wrap internal notes in `<think>...</think>` ahead of the
/// answer, and some emit several such spans. None of them are user-visible
/// translated content: every closed span is removed (and logged at debug
/// level), and a trailing unclosed span hides everything from `<think>`
/// onward so partial snapshots never leak notes.
pub fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let Some(open) = rest.find(THINK_OPEN) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open]);

        match rest[open..].find(THINK_CLOSE) {
            Some(rel_close) => {
                tracing::debug!(
                    "Discarding thinking span ({} chars)",
                    rel_close - THINK_OPEN.len()
                );
                rest = &rest[open + rel_close + THINK_CLOSE.len()..];
            }
            // Span still open: everything after the marker is internal notes
            None => break,
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_closed_span() {
        assert_eq!(
            strip_thinking("<think>internal notes</think>Bonjour traduit"),
            "Bonjour traduit"
        );
    }

    #[test]
    fn test_strip_unclosed_span_hides_tail() {
        assert_eq!(strip_thinking("Hello <think>still reason"), "Hello");
    }

    #[test]
    fn test_no_span_is_trimmed_passthrough() {
        assert_eq!(strip_thinking("  plain text \n"), "plain text");
    }

    #[test]
    fn test_span_in_the_middle() {
        assert_eq!(strip_thinking("A<think>x</think> B"), "A B");
    }

    #[test]
    fn test_every_closed_span_is_removed() {
        assert_eq!(
            strip_thinking("<think>one</think>Hello<think>two</think> world"),
            "Hello world"
        );
    }

    #[test]
    fn test_closed_span_then_unclosed_tail() {
        assert_eq!(
            strip_thinking("<think>a</think>Hello<think>still going"),
            "Hello"
        );
    }
}
