// Text helpers shared by filtering and display

use std::ops::Range;

/// Default excerpt length used by the feed cards.
pub const DEFAULT_EXCERPT_CHARS: usize = 150;

/// Strip markup tags and decode the common HTML entities.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;

    for c in input.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => out.push(c),
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain-text preview of `body`, at most `max_chars` characters plus `...`.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let text = strip_markup(body);
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Byte ranges in `text` matching any whitespace-separated term of `query`,
/// case-insensitively. Overlapping matches are merged; ranges are sorted.
pub fn highlight_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();

    for term in query.split_whitespace() {
        let term_chars: Vec<char> = term.chars().collect();
        for (start, _) in text.char_indices() {
            if let Some(end) = match_at(text, start, &term_chars) {
                ranges.push(start..end);
            }
        }
    }

    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

fn match_at(text: &str, start: usize, term: &[char]) -> Option<usize> {
    let mut iter = text[start..].char_indices();
    for &expected in term {
        let (_, actual) = iter.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(match iter.next() {
        Some((offset, _)) => start + offset,
        None => text.len(),
    })
}
