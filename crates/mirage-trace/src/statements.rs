//! Atomic statement splitting
//!
//! A logical shell command is split on `; `, `| `, `|| ` and `&& `. Each
//! separator stays attached to the statement before it; a trailing statement
//! without a separator is closed with ` ;`.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(; |\|\|? |&& )").expect("separator pattern is valid"));

/// Terminator appended to a statement that has no separator of its own
pub const STATEMENT_TERMINATOR: &str = " ;";

/// Split a command into atomic statements
///
/// Whitespace-only input yields no statements.
///
/// # Examples
/// ```
/// use mirage_trace::split_statements;
///
/// assert_eq!(
///     split_statements("ls -la ; whoami && id"),
///     vec!["ls -la ;", "whoami &&", "id ;"],
/// );
/// ```
#[must_use]
pub fn split_statements(command: &str) -> Vec<String> {
    if command.trim().is_empty() {
        return Vec::new();
    }

    // trailing space lets a final separator match
    let padded = format!("{command} ");
    let mut statements = Vec::new();
    let mut start = 0;

    for separator in SEPARATOR.find_iter(&padded) {
        let statement = padded[start..separator.end()].trim();
        if !statement.is_empty() {
            statements.push(statement.to_string());
        }
        start = separator.end();
    }

    let remainder = padded[start..].trim();
    if !remainder.is_empty() {
        statements.push(format!("{remainder}{STATEMENT_TERMINATOR}"));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn split_mixed_separators() {
        assert_eq!(
            split_statements("ls -la ; whoami && id"),
            vec!["ls -la ;", "whoami &&", "id ;"]
        );
    }

    #[test]
    fn split_pipes() {
        assert_eq!(
            split_statements("cat /etc/passwd | grep root || echo none"),
            vec!["cat /etc/passwd |", "grep root ||", "echo none ;"]
        );
    }

    #[test]
    fn single_statement_is_terminated() {
        assert_eq!(split_statements("uname -a"), vec!["uname -a ;"]);
    }

    #[test]
    fn trailing_separator_is_kept() {
        assert_eq!(split_statements("cd /tmp ;"), vec!["cd /tmp ;"]);
    }

    #[test]
    fn separator_without_space_does_not_split() {
        assert_eq!(split_statements("echo a;b"), vec!["echo a;b ;"]);
    }

    #[test]
    fn blank_command_yields_nothing() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("   ").is_empty());
    }

    proptest! {
        #[test]
        fn prop_statements_cover_all_words(
            parts in proptest::collection::vec("[a-z]{1,6}( [a-z0-9/-]{1,6}){0,2}", 1..6),
            seps in proptest::collection::vec(prop_oneof![Just(" ; "), Just(" && "), Just(" | "), Just(" || ")], 5)
        ) {
            let mut command = String::new();
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    command.push_str(seps[i - 1]);
                }
                command.push_str(part);
            }

            let statements = split_statements(&command);
            prop_assert_eq!(statements.len(), parts.len());

            let rejoined: Vec<&str> = statements
                .iter()
                .flat_map(|s| s.split_whitespace())
                .filter(|w| !matches!(*w, ";" | "&&" | "|" | "||"))
                .collect();
            let original: Vec<&str> = parts.iter().flat_map(|p| p.split_whitespace()).collect();
            prop_assert_eq!(rejoined, original);
        }
    }
}
