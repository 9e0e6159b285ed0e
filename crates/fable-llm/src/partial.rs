//! Live preview of one string field inside a JSON document that is still
//! being streamed.

/// Best-effort value of the string field `key` in a possibly truncated JSON
/// buffer.
///
/// Scans from the first `"key":"` (whitespace around the colon is allowed)
/// up to the closing unescaped quote, or to the end of the buffer while the
/// value is still in flight. `\n`, `\t`, `\"` and `\\` are decoded for
/// display. Returns an empty string when the key has not appeared yet.
pub fn extract_partial_field(buffer: &str, key: &str) -> String {
    let Some(start) = value_start(buffer, key) else {
        return String::new();
    };

    let mut raw = String::new();
    let mut escaped = false;
    for ch in buffer[start..].chars() {
        if escaped {
            raw.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                raw.push(ch);
                escaped = true;
            }
            '"' => break,
            _ => raw.push(ch),
        }
    }

    unescape_for_display(&raw)
}

/// Byte offset just past the opening quote of `key`'s string value.
fn value_start(buffer: &str, key: &str) -> Option<usize> {
    let needle = format!("\"{key}\"");
    let mut from = 0;
    while let Some(found) = buffer[from..].find(&needle) {
        let after_key = from + found + needle.len();
        let rest = &buffer[after_key..];
        let trimmed = rest.trim_start();
        if let Some(after_colon) = trimmed.strip_prefix(':') {
            let value = after_colon.trim_start();
            if value.starts_with('"') {
                return Some(buffer.len() - value.len() + 1);
            }
        }
        from = after_key;
    }
    None
}

fn unescape_for_display(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            // A lone trailing backslash is an escape still in flight.
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unterminated_value_with_escaped_quote() {
        assert_eq!(extract_partial_field(r#"{"speech":"Hello \"World"#, "speech"), "Hello \"World");
    }

    #[test]
    fn complete_value_stops_at_closing_quote() {
        let buffer = r#"{"speech":"Hi there","mood":"calm"}"#;
        assert_eq!(extract_partial_field(buffer, "speech"), "Hi there");
        assert_eq!(extract_partial_field(buffer, "mood"), "calm");
    }

    #[test]
    fn missing_key_is_empty() {
        assert_eq!(extract_partial_field(r#"{"mood":"calm"}"#, "speech"), "");
        assert_eq!(extract_partial_field("", "speech"), "");
        assert_eq!(extract_partial_field(r#"{"spee"#, "speech"), "");
    }

    #[test]
    fn key_present_but_value_not_started() {
        assert_eq!(extract_partial_field(r#"{"speech":"#, "speech"), "");
        assert_eq!(extract_partial_field(r#"{"speech""#, "speech"), "");
    }

    #[test]
    fn whitespace_around_colon_is_tolerated() {
        assert_eq!(extract_partial_field("{\n  \"speech\" : \"line one\\nline", "speech"), "line one\nline");
    }

    #[test]
    fn escapes_are_decoded_once() {
        assert_eq!(extract_partial_field(r#"{"s":"a\\nb"}"#, "s"), "a\\nb");
        assert_eq!(extract_partial_field(r#"{"s":"tab\there"}"#, "s"), "tab\there");
        assert_eq!(extract_partial_field(r#"{"s":"\u00e9"}"#, "s"), "\\u00e9");
    }

    #[test]
    fn trailing_backslash_mid_escape() {
        assert_eq!(extract_partial_field(r#"{"s":"wait\"#, "s"), "wait");
    }

    #[test]
    fn non_string_value_with_same_key_is_skipped() {
        let buffer = r#"{"meta":{"speech":1},"speech":"real"}"#;
        assert_eq!(extract_partial_field(buffer, "speech"), "real");
    }

    #[test]
    fn multibyte_text() {
        assert_eq!(extract_partial_field(r#"{"speech":"你好，世"#, "speech"), "你好，世");
    }
}
