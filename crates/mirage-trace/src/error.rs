//! Error types for trace construction
//!
//! Two families:
//! - Label sequence decoding failures
//! - Tool call contract violations (missing or mistyped arguments, unknown tools)

/// Errors decoding a run-length encoded label sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    /// Segment lacks the `<label> - <index>` shape
    #[error("malformed label segment: {0:?}")]
    MalformedSegment(String),

    /// End index is not an unsigned integer
    #[error("invalid end index in segment {segment:?}")]
    InvalidIndex {
        /// Offending segment
        segment: String,
    },

    /// End indices must strictly increase
    #[error("end index {index} does not follow previous end index {previous}")]
    NonIncreasingIndex {
        /// Offending end index
        index: usize,
        /// End index of the previous run
        previous: usize,
    },
}

/// Tool call contract violations
///
/// Raised when an agent emits a call that is not one of the two recognized
/// tools or omits a mandatory argument. Only the offending call is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolCallError {
    /// Tool name is not recognized
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments were not a JSON object
    #[error("arguments for `{tool}` must be an object")]
    ArgumentsNotObject {
        /// Tool name
        tool: String,
    },

    /// Mandatory argument is absent
    #[error("`{tool}` is missing mandatory argument `{field}`")]
    MissingField {
        /// Tool name
        tool: String,
        /// Argument name
        field: &'static str,
    },

    /// Argument has the wrong JSON type
    #[error("`{tool}` argument `{field}` must be a {expected}")]
    WrongType {
        /// Tool name
        tool: String,
        /// Argument name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },
}

impl ToolCallError {
    /// Name of the tool the failing call targeted
    #[inline]
    #[must_use]
    pub fn tool(&self) -> &str {
        match self {
            Self::UnknownTool(tool)
            | Self::ArgumentsNotObject { tool }
            | Self::MissingField { tool, .. }
            | Self::WrongType { tool, .. } => tool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_error_display() {
        let err = ToolCallError::MissingField {
            tool: "execute".to_string(),
            field: "command",
        };
        assert!(err.to_string().contains("missing mandatory argument `command`"));
        assert_eq!(err.tool(), "execute");
    }

    #[test]
    fn label_error_display() {
        let err = LabelError::NonIncreasingIndex { index: 1, previous: 3 };
        assert!(err.to_string().contains("does not follow"));
    }
}
