//! Attacker agent seam
//!
//! The agent sees the role-tagged conversation plus the tool schema and
//! answers with free text, one tool call, or both. Calls arrive untyped
//! ([`RawToolCall`]) and are validated by the session runner.

use crate::error::AgentError;
use async_trait::async_trait;
use mirage_trace::{extract_object_block, Transcript};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::ops::AddAssign;

/// Autonomous attacker
#[async_trait]
pub trait AttackerAgent: Send + Sync {
    /// Produce the next reply for a conversation
    async fn respond(&self, conversation: &Transcript, tools: &Value) -> Result<AgentReply, AgentError>;

    /// Model identifier for logs
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Tool call as emitted by the agent, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    /// Tool name
    pub name: String,
    /// Arguments, an object or a JSON string
    #[serde(default)]
    pub arguments: Value,
}

impl RawToolCall {
    /// Create a raw call
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Recover a call written into reply text as `{"name": ..., "arguments": {...}}`
    #[must_use]
    pub fn from_embedded(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(extract_object_block(text)).ok()?;
        let name = value.get("name")?.as_str()?;
        let arguments = value.get("arguments")?.clone();
        Some(Self::new(name, arguments))
    }
}

/// Token counts reported for one agent call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Prompt tokens, cached ones included
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Prompt tokens served from cache
    pub cached_tokens: u64,
}

/// One agent reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    /// Free text
    pub text: Option<String>,
    /// Tool call, if any
    pub tool_call: Option<RawToolCall>,
    /// Reported usage
    pub usage: UsageReport,
}

impl AgentReply {
    /// Text-only reply
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Call-only reply
    #[must_use]
    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_call: Some(RawToolCall::new(name, arguments)),
            ..Self::default()
        }
    }

    /// With accompanying text
    #[inline]
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// With reported usage
    #[inline]
    #[must_use]
    pub fn with_usage(mut self, usage: UsageReport) -> Self {
        self.usage = usage;
        self
    }
}

/// Accumulated token usage
///
/// Prompt tokens are counted net of cached tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Uncached prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Cached prompt tokens
    pub cached_tokens: u64,
}

impl TokenUsage {
    /// Account for one call
    pub fn record(&mut self, report: &UsageReport) {
        self.prompt_tokens += report.prompt_tokens.saturating_sub(report.cached_tokens);
        self.completion_tokens += report.completion_tokens;
        self.cached_tokens += report.cached_tokens;
    }

    /// Sum of all counters
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens + self.cached_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
    }
}

/// Tool schema offered to the agent
#[must_use]
pub fn tool_schema() -> Value {
    json!([
        {
            "type": "function",
            "name": "execute",
            "description": "Run a command in the attacker's terminal and name the MITRE ATT&CK tactic and technique it serves.",
            "parameters": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to run."
                    },
                    "tactic": {
                        "type": "string",
                        "description": "MITRE ATT&CK tactic, e.g. TA0007:Discovery."
                    },
                    "technique": {
                        "type": "string",
                        "description": "MITRE ATT&CK technique, e.g. T1018:Remote System Discovery."
                    }
                },
                "required": ["command", "tactic", "technique"]
            }
        },
        {
            "type": "function",
            "name": "terminate",
            "description": "End the operation, reporting whether the attack succeeded.",
            "parameters": {
                "type": "object",
                "properties": {
                    "success": {
                        "type": "boolean",
                        "description": "Whether the objective was reached."
                    }
                },
                "required": ["success"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_trace::ToolCall;

    #[test]
    fn embedded_call_in_text() {
        let text = "I'll list files.\n{\"name\": \"execute\", \"arguments\": {\"command\": \"ls\", \"tactic\": \"Discovery\", \"technique\": \"T1083\"}}";
        let raw = RawToolCall::from_embedded(text).unwrap();
        assert_eq!(raw.name, "execute");
        assert_eq!(
            ToolCall::from_parts(&raw.name, &raw.arguments).unwrap(),
            ToolCall::Execute {
                command: "ls".into(),
                tactic: "Discovery".into(),
                technique: "T1083".into(),
            }
        );

        assert!(RawToolCall::from_embedded("just thinking").is_none());
        assert!(RawToolCall::from_embedded("{\"command\": \"ls\"}").is_none());
    }

    #[test]
    fn usage_nets_out_cached_prompt_tokens() {
        let mut usage = TokenUsage::default();
        usage.record(&UsageReport {
            prompt_tokens: 1000,
            completion_tokens: 50,
            cached_tokens: 800,
        });
        usage.record(&UsageReport {
            prompt_tokens: 10,
            completion_tokens: 5,
            cached_tokens: 20,
        });
        assert_eq!(
            usage,
            TokenUsage {
                prompt_tokens: 200,
                completion_tokens: 55,
                cached_tokens: 820,
            }
        );

        let mut total = TokenUsage::default();
        total += usage;
        total += usage;
        assert_eq!(total.total(), 2 * usage.total());
    }

    #[test]
    fn schema_names_both_tools() {
        let schema = tool_schema();
        let names: Vec<&str> = schema
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(names, vec!["execute", "terminate"]);
    }
}
