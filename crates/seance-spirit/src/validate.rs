//! Word-limit enforcement.

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Cut `text` to its first `max_words` words.
///
/// Returns `None` when `text` is already within the limit. Otherwise the kept
/// words are joined by single spaces, one trailing `,` `;` or `:` is removed,
/// and `...` is appended.
pub fn truncate_words(text: &str, max_words: usize) -> Option<String> {
    if word_count(text) <= max_words {
        return None;
    }
    let mut truncated = text
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");
    if truncated.ends_with([',', ';', ':']) {
        let _ = truncated.pop();
    }
    truncated.push_str("...");
    Some(truncated)
}
