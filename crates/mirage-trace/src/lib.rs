//! Mirage Trace - structured records of attacker sessions
//!
//! Turns the raw conversation of one attacker session into a frozen
//! [`SessionTrace`]:
//! - Atomic statement splitting of shell commands
//! - Tactic/technique label cleaning and run-length encoding
//! - Transcript model shared by the session runner and the extractor
//! - Append-only experiment-wide trace history
//! - Balanced JSON block scanning over free model text
//!
//! # Example
//!
//! ```rust
//! use mirage_trace::labels::{expand, run_length_encode};
//!
//! let labels = vec!["A".to_string(), "A".to_string(), "B".to_string()];
//! let encoded = run_length_encode(&labels);
//! assert_eq!(encoded, "A - 1 -- B - 2");
//! assert_eq!(expand(&encoded).unwrap(), labels);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod blocks;
pub mod error;
pub mod event;
pub mod extract;
pub mod history;
pub mod labels;
pub mod statements;
pub mod trace;
pub mod transcript;

pub use blocks::{extract_array_block, extract_object_block};
pub use error::{LabelError, ToolCallError};
pub use event::CommandEvent;
pub use extract::{ExtractionMode, TraceExtractor};
pub use history::{RecordedTrace, TraceHistory};
pub use labels::{clean_label, expand, run_length_encode};
pub use statements::split_statements;
pub use trace::{AttackSequence, AttackStep, SessionId, SessionOutcome, SessionTrace, TraceBuilder};
pub use transcript::{HoneypotEvent, Message, ToolCall, ToolName, Transcript};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with traces
    pub use crate::{
        AttackSequence, CommandEvent, ExtractionMode, Message, SessionOutcome, SessionTrace,
        ToolCall, TraceExtractor, TraceHistory, Transcript,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
