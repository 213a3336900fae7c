//! Tag field normalization
//!
//! Raw tag fields arrive as native arrays, JSON-encoded array strings,
//! Postgres array literals (`{a,"b c",d}`) or plain comma-separated text.
//! Every shape collapses to an ordered `Vec<String>` of at most `max_tags`
//! entries. Normalization never fails and is idempotent: feeding the output
//! back in as an array yields the same list.
//!
//! A string that decodes as a JSON array is always read as one, even if the
//! author meant it literally.

use serde_json::Value;

pub fn normalize_tags(raw: &Value, max_tags: usize) -> Vec<String> {
    match raw {
        Value::Null | Value::Object(_) => Vec::new(),
        Value::Array(items) => collect_tags(items.iter().filter_map(scalar_to_string), max_tags),
        Value::String(text) => normalize_tag_text(text, max_tags),
        scalar => collect_tags(scalar_to_string(scalar), max_tags),
    }
}

pub fn normalize_tag_text(text: &str, max_tags: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return collect_tags(items.iter().filter_map(scalar_to_string), max_tags);
    }

    if let Some(inner) = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return collect_tags(split_array_literal(inner), max_tags);
    }

    collect_tags(trimmed.split(',').map(str::to_string), max_tags)
}

fn collect_tags<I>(tags: I, max_tags: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    tags.into_iter()
        .filter_map(|tag| clean_tag(&tag))
        .take(max_tags)
        .collect()
}

/// Trim whitespace, wrapping quotes and a leading `#`. Applying it twice
/// is the same as applying it once.
fn clean_tag(tag: &str) -> Option<String> {
    let cleaned = tag
        .trim_start_matches(|c: char| c == '#' || c == '"' || c == '\'' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Split the body of a Postgres array literal, honoring double quotes and
/// backslash escapes. Unquoted `NULL` elements are dropped.
fn split_array_literal(inner: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            ',' if !in_quotes => {
                push_element(&mut elements, &current, quoted);
                current.clear();
                quoted = false;
            }
            _ => current.push(c),
        }
    }
    push_element(&mut elements, &current, quoted);

    elements
}

fn push_element(elements: &mut Vec<String>, raw: &str, quoted: bool) {
    if !quoted && raw.trim().eq_ignore_ascii_case("null") {
        return;
    }
    elements.push(raw.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 5;

    fn renormalize(tags: &[String]) -> Vec<String> {
        normalize_tags(&json!(tags), MAX)
    }

    #[test]
    fn test_native_sequence() {
        let tags = normalize_tags(&json!(["rust", " web ", "", null, 42]), MAX);
        assert_eq!(tags, vec!["rust", "web", "42"]);
    }

    #[test]
    fn test_json_encoded_string() {
        let tags = normalize_tags(&json!("[\"news\", \"react\"]"), MAX);
        assert_eq!(tags, vec!["news", "react"]);
    }

    #[test]
    fn test_brace_literal() {
        let tags = normalize_tags(&json!("{news,\"hello, world\",NULL,tech}"), MAX);
        assert_eq!(tags, vec!["news", "hello, world", "tech"]);
    }

    #[test]
    fn test_comma_separated() {
        let tags = normalize_tags(&json!(" #rust ,  async,,tokio "), MAX);
        assert_eq!(tags, vec!["rust", "async", "tokio"]);
    }

    #[test]
    fn test_single_word_and_scalars() {
        assert_eq!(normalize_tags(&json!("rust"), MAX), vec!["rust"]);
        assert_eq!(normalize_tags(&json!(7), MAX), vec!["7"]);
        assert!(normalize_tags(&json!({ "a": 1 }), MAX).is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(normalize_tags(&Value::Null, MAX).is_empty());
        assert!(normalize_tags(&json!(""), MAX).is_empty());
        assert!(normalize_tags(&json!("   "), MAX).is_empty());
        assert!(normalize_tags(&json!([]), MAX).is_empty());
        assert!(normalize_tags(&json!("{}"), MAX).is_empty());
    }

    #[test]
    fn test_capped_at_max_tags() {
        let tags = normalize_tags(&json!("a,b,c,d,e,f,g"), MAX);
        assert_eq!(tags, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_structured_interpretation_wins() {
        // Valid JSON array text is decoded even when it could be literal text
        let tags = normalize_tags(&json!("[\"a,b\"]"), MAX);
        assert_eq!(tags, vec!["a,b"]);
    }

    #[test]
    fn test_idempotent_for_every_shape() {
        let inputs = vec![
            json!(["rust", "#web", " \"quoted\" "]),
            json!("[\"news\", \" react \"]"),
            json!("{news,\"hello, world\",tech}"),
            json!("#a, 'b', \"c\", d, e, f"),
            json!("#\"nested\""),
            Value::Null,
        ];

        for input in inputs {
            let once = normalize_tags(&input, MAX);
            assert_eq!(renormalize(&once), once, "not idempotent for {input}");
        }
    }
}
