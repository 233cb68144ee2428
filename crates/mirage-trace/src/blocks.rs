//! Locating structured blocks inside free model text
//!
//! Models wrap JSON in prose and code fences. The scanners here find the
//! first balanced block, ignoring brackets that appear inside string literals.

/// First balanced `open ... close` block, string-literal aware
fn balanced_block(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced top-level `{...}` block, or the trimmed text if none
///
/// # Examples
/// ```
/// use mirage_trace::blocks::extract_object_block;
///
/// let raw = "Here is your config:\n{\"services\": [{\"a\": \"}\"}]}\nEnjoy!";
/// assert_eq!(extract_object_block(raw), "{\"services\": [{\"a\": \"}\"}]}");
/// ```
#[must_use]
pub fn extract_object_block(text: &str) -> &str {
    balanced_block(text, '{', '}').unwrap_or_else(|| text.trim())
}

/// First balanced top-level `[...]` block, if any
#[must_use]
pub fn extract_array_block(text: &str) -> Option<&str> {
    balanced_block(text, '[', ']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extract_block_skips_commentary() {
        let raw = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` then {\"c\": 2}";
        assert_eq!(extract_object_block(raw), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn extract_block_falls_back_to_trimmed_text() {
        assert_eq!(extract_object_block("  services: []  "), "services: []");
        assert_eq!(extract_object_block("{ unterminated"), "{ unterminated");
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let raw = r#"call: {"command": "echo \"}\" > /tmp/x", "tactic": "Execution"} done"#;
        assert_eq!(
            extract_object_block(raw),
            r#"{"command": "echo \"}\" > /tmp/x", "tactic": "Execution"}"#
        );
    }

    #[test]
    fn extract_array_block_finds_first_list() {
        let raw = "Predicted:\n[{\"tactic\": \"Discovery\", \"technique\": \"T1083 [a]\"}]\nDone [x]";
        assert_eq!(
            extract_array_block(raw),
            Some("[{\"tactic\": \"Discovery\", \"technique\": \"T1083 [a]\"}]")
        );
        assert_eq!(extract_array_block("none"), None);
    }
}
