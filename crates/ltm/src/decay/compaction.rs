//! Content compaction strategies
//!
//! Each strategy shortens a memory's original content to a smaller
//! representation. Sentences are detected by period, exclamation or
//! question mark.

use crate::config::DecayConfig;
use crate::memory::types::CompactionLevel;

/// Compact `text` to `level` using the sizes in `config`
pub fn compact(text: &str, level: CompactionLevel, config: &DecayConfig) -> String {
    match level {
        CompactionLevel::Full => text.to_string(),
        CompactionLevel::Technical => technical_summary(text, config.technical_max_chars),
        CompactionLevel::Paragraph => paragraph_summary(text, config.paragraph_max_sentences),
        CompactionLevel::OneLine => one_line_summary(text, config.one_line_max_chars),
    }
}

/// First sentence on a single line, truncated to `max_chars`
pub fn one_line_summary(text: &str, max_chars: usize) -> String {
    let first = sentences(text)
        .into_iter()
        .next()
        .unwrap_or_else(|| collapse_whitespace(text));
    truncate_chars(&first, max_chars)
}

/// First `max_sentences` sentences joined into one paragraph
pub fn paragraph_summary(text: &str, max_sentences: usize) -> String {
    let kept: Vec<String> = sentences(text).into_iter().take(max_sentences.max(1)).collect();
    if kept.is_empty() {
        return truncate_chars(&collapse_whitespace(text), 200);
    }
    kept.join(" ")
}

/// Keeps the opening sentence plus every sentence carrying technical
/// specifics (numbers, paths, identifiers, code), up to `max_chars`
pub fn technical_summary(text: &str, max_chars: usize) -> String {
    let all = sentences(text);
    let mut kept: Vec<&str> = Vec::new();
    for (i, sentence) in all.iter().enumerate() {
        if i == 0 || has_technical_detail(sentence) {
            kept.push(sentence);
        }
    }
    if kept.is_empty() {
        return truncate_chars(&collapse_whitespace(text), max_chars);
    }
    truncate_chars(&kept.join(" "), max_chars)
}

fn has_technical_detail(sentence: &str) -> bool {
    sentence.split_whitespace().any(|word| {
        let word = word.trim_matches(|c: char| {
            matches!(c, ',' | ';' | ':' | '(' | ')' | '"' | '.' | '!' | '?')
        });
        word.chars().any(|c| c.is_ascii_digit())
            || word.contains(['_', '/', '`', '=', '<', '>'])
            || word.contains("::")
            || (word.contains('.') && word.len() > 2)
            || has_inner_capital(word)
    })
}

/// camelCase or PascalCase identifiers
fn has_inner_capital(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next();
    word.len() > 2 && chars.any(|c| c.is_ascii_uppercase()) && word.chars().any(|c| c.is_ascii_lowercase())
}

/// Split into trimmed sentences, keeping their terminal punctuation
fn sentences(text: &str) -> Vec<String> {
    let collapsed = collapse_whitespace(text);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = collapsed.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace());
        if at_boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                out.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Char-boundary-safe truncation with a trailing "..."
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let truncated: String = text.chars().take(keep).collect();
    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "We moved the queue to SQLite. The old JSON files kept corrupting \
        under concurrent hooks. Writes now go through rusqlite with WAL enabled at \
        ~/.ltm/memories.db. Everyone seemed relieved. Follow-up work is tracked elsewhere.";

    #[test]
    fn test_sentence_split_keeps_decimals_and_paths() {
        let parts = sentences("Version 1.5 shipped. See ~/.ltm/x.db now! Done?");
        assert_eq!(parts, vec!["Version 1.5 shipped.", "See ~/.ltm/x.db now!", "Done?"]);
    }

    #[test]
    fn test_one_line_is_single_short_line() {
        let summary = one_line_summary(LONG, 40);
        assert!(!summary.contains('\n'));
        assert!(summary.chars().count() <= 40);
        assert!(summary.starts_with("We moved the queue"));
    }

    #[test]
    fn test_one_line_keeps_short_text() {
        assert_eq!(one_line_summary("minor formatting nit", 80), "minor formatting nit");
    }

    #[test]
    fn test_paragraph_takes_leading_sentences() {
        let summary = paragraph_summary("One.\nTwo.  Three. Four.", 2);
        assert_eq!(summary, "One. Two.");
    }

    #[test]
    fn test_technical_keeps_specifics() {
        let summary = technical_summary(LONG, 400);
        assert!(summary.starts_with("We moved the queue to SQLite."));
        assert!(summary.contains("~/.ltm/memories.db"));
        assert!(!summary.contains("Everyone seemed relieved"));
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let text = "é".repeat(50);
        let truncated = truncate_chars(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_compact_dispatch() {
        let config = DecayConfig::default();
        assert_eq!(compact(LONG, CompactionLevel::Full, &config), LONG);
        assert!(compact(LONG, CompactionLevel::OneLine, &config).len() <= 80);
    }
}
