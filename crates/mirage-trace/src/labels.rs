//! Tactic/technique label handling
//!
//! Labels are persisted as a run-length encoded string: every run of equal
//! consecutive labels becomes `<label> - <endIndex>`, runs are joined with
//! ` -- `. End indices are zero-based and refer to the last event of the run.
//!
//! ```text
//! [A, A, A, B, B]  <->  "A - 2 -- B - 4"
//! ```
//!
//! Inside a label, `-` is written `\-` and `\` is written `\\`, so no label
//! can produce either separator.

use crate::error::LabelError;

/// Separator between runs
pub const RUN_SEPARATOR: &str = " -- ";

/// Separator between a label and its end index
pub const INDEX_SEPARATOR: &str = " - ";

/// Clean a self-reported label
///
/// Agents report labels like `TA0007:Discovery`; only the text after the
/// last `:` is kept, trimmed.
#[must_use]
pub fn clean_label(raw: &str) -> String {
    raw.rsplit(':').next().unwrap_or(raw).trim().to_string()
}

/// Run-length encode a label sequence
///
/// An empty sequence encodes to the empty string.
#[must_use]
pub fn run_length_encode<S: AsRef<str>>(labels: &[S]) -> String {
    let mut runs: Vec<String> = Vec::new();

    for (index, label) in labels.iter().enumerate() {
        let label = label.as_ref();
        let run_ends_here = labels
            .get(index + 1)
            .map_or(true, |next| next.as_ref() != label);

        if run_ends_here {
            runs.push(format!("{}{INDEX_SEPARATOR}{index}", escape(label)));
        }
    }

    runs.join(RUN_SEPARATOR)
}

/// Expand a run-length encoded sequence back to one label per event
///
/// # Errors
/// Returns [`LabelError`] if a segment is malformed or end indices do not
/// strictly increase.
pub fn expand(encoded: &str) -> Result<Vec<String>, LabelError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let mut labels = Vec::new();
    let mut next_start = 0usize;

    for segment in encoded.split(RUN_SEPARATOR) {
        let (label, index) = segment
            .rsplit_once(INDEX_SEPARATOR)
            .ok_or_else(|| LabelError::MalformedSegment(segment.to_string()))?;

        let end: usize = index.trim().parse().map_err(|_| LabelError::InvalidIndex {
            segment: segment.to_string(),
        })?;

        if end < next_start {
            return Err(LabelError::NonIncreasingIndex {
                index: end,
                previous: next_start.saturating_sub(1),
            });
        }

        labels.extend(std::iter::repeat(unescape(label)).take(end - next_start + 1));
        next_start = end + 1;
    }

    Ok(labels)
}

fn escape(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for c in label.chars() {
        if c == '\\' || c == '-' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unescape(label: &str) -> String {
    let mut unescaped = String::with_capacity(label.len());
    let mut chars = label.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => unescaped.push(chars.next().unwrap_or('\\')),
            c => unescaped.push(c),
        }
    }
    unescaped
}

/// Number of events described by an encoded sequence, without expanding it
///
/// # Errors
/// Same conditions as [`expand`].
pub fn expanded_len(encoded: &str) -> Result<usize, LabelError> {
    Ok(expand(encoded)?.len())
}
