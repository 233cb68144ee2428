//! Session transcript model
//!
//! The transcript is the role-tagged conversation between the runner and the
//! attacker agent. It is both the agent's prompt state and the extractor's
//! input, so tool results carry the honeypot log lines captured for them.

use crate::error::ToolCallError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The two recognized tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Run a command on the attacker's terminal
    Execute,
    /// End the session
    Terminate,
}

impl ToolName {
    /// Resolve a tool name, accepting the legacy aliases agents were prompted with
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "execute" | "run_command" | "terminal_input" => Some(Self::Execute),
            "terminate" => Some(Self::Terminate),
            _ => None,
        }
    }

    /// Canonical name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    /// Run `command`, self-labelled with a MITRE ATT&CK tactic and technique
    Execute {
        /// Command text
        command: String,
        /// Reported tactic (raw)
        tactic: String,
        /// Reported technique (raw)
        technique: String,
    },
    /// End the session, reporting whether the attack succeeded
    Terminate {
        /// Self-reported success
        success: bool,
    },
}

impl ToolCall {
    /// Build a call from a tool name and loosely-typed arguments
    ///
    /// Arguments may be a JSON object or a string containing one.
    ///
    /// # Errors
    /// Returns [`ToolCallError`] for unknown tools, non-object arguments,
    /// missing mandatory fields or mistyped fields.
    pub fn from_parts(name: &str, arguments: &Value) -> Result<Self, ToolCallError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;

        let decoded;
        let args = match arguments {
            Value::Object(map) => map,
            Value::String(text) => {
                decoded = serde_json::from_str::<Value>(text).map_err(|_| {
                    ToolCallError::ArgumentsNotObject {
                        tool: tool.to_string(),
                    }
                })?;
                decoded.as_object().ok_or_else(|| ToolCallError::ArgumentsNotObject {
                    tool: tool.to_string(),
                })?
            }
            _ => {
                return Err(ToolCallError::ArgumentsNotObject {
                    tool: tool.to_string(),
                })
            }
        };

        match tool {
            ToolName::Execute => Ok(Self::Execute {
                command: required_str(args, tool, "command", &["command", "input"])?,
                tactic: required_str(args, tool, "tactic", &["tactic", "tactic_used"])?,
                technique: required_str(args, tool, "technique", &["technique", "technique_used"])?,
            }),
            ToolName::Terminate => {
                let success = args.get("success").ok_or(ToolCallError::MissingField {
                    tool: tool.to_string(),
                    field: "success",
                })?;
                let success = success.as_bool().ok_or(ToolCallError::WrongType {
                    tool: tool.to_string(),
                    field: "success",
                    expected: "boolean",
                })?;
                Ok(Self::Terminate { success })
            }
        }
    }

    /// Tool this call targets
    #[inline]
    #[must_use]
    pub fn name(&self) -> ToolName {
        match self {
            Self::Execute { .. } => ToolName::Execute,
            Self::Terminate { .. } => ToolName::Terminate,
        }
    }
}

fn required_str(
    args: &Map<String, Value>,
    tool: ToolName,
    field: &'static str,
    keys: &[&str],
) -> Result<String, ToolCallError> {
    let value = keys
        .iter()
        .find_map(|key| args.get(*key))
        .ok_or(ToolCallError::MissingField {
            tool: tool.to_string(),
            field,
        })?;

    value
        .as_str()
        .map(str::to_string)
        .ok_or(ToolCallError::WrongType {
            tool: tool.to_string(),
            field,
            expected: "string",
        })
}

/// A honeypot-side log event
///
/// Log lines are JSON objects whose `event` member carries `Protocol` and,
/// for interactive protocols, the `Command` the honeypot received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoneypotEvent {
    /// Protocol tag as logged
    pub protocol: String,
    /// Command received, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Full log record
    pub raw: Value,
}

impl HoneypotEvent {
    /// Parse one raw log line
    ///
    /// Returns `None` for lines that are not JSON or lack an `event` object.
    #[must_use]
    pub fn from_log_line(line: &str) -> Option<Self> {
        let raw: Value = serde_json::from_str(line.trim()).ok()?;
        Self::from_value(raw)
    }

    /// Interpret an already-parsed log record
    #[must_use]
    pub fn from_value(raw: Value) -> Option<Self> {
        let event = raw.get("event")?.as_object()?;
        let protocol = event.get("Protocol").map(value_text)?;
        let command = event.get("Command").map(value_text);
        Some(Self {
            protocol,
            command,
            raw,
        })
    }

    /// Create a synthetic SSH command event
    #[must_use]
    pub fn ssh_command(command: impl Into<String>) -> Self {
        let command = command.into();
        let raw = serde_json::json!({ "event": { "Protocol": "SSH", "Command": command } });
        Self {
            protocol: "SSH".to_string(),
            command: Some(command),
            raw,
        }
    }

    /// Trimmed command text when this is a non-empty SSH command event
    #[must_use]
    pub fn ssh_command_text(&self) -> Option<&str> {
        if !self.protocol.eq_ignore_ascii_case("ssh") {
            return None;
        }
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Instructions for the agent
    System {
        /// Text
        content: String,
    },
    /// Operator-side message (initial task, continuation nudges, rejections)
    User {
        /// Text
        content: String,
    },
    /// Agent reply
    Assistant {
        /// Free text (reasoning)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Recognized tool call
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call: Option<ToolCall>,
    },
    /// Result of a tool call
    Tool {
        /// Tool that produced the result
        name: ToolName,
        /// Result text shown to the agent
        content: String,
        /// Honeypot log events captured while the call ran
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        honeypot_events: Vec<HoneypotEvent>,
    },
}

impl Message {
    /// System message
    #[inline]
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// User message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: Option<String>, tool_call: Option<ToolCall>) -> Self {
        Self::Assistant { content, tool_call }
    }

    /// Tool result message
    #[inline]
    #[must_use]
    pub fn tool(name: ToolName, content: impl Into<String>, honeypot_events: Vec<HoneypotEvent>) -> Self {
        Self::Tool {
            name,
            content: content.into(),
            honeypot_events,
        }
    }

    /// Role tag
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// Ordered, role-tagged conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Empty transcript
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript seeded with initial messages
    #[inline]
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a message
    #[inline]
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The terminate call, if the session ended with one
    #[must_use]
    pub fn termination(&self) -> Option<bool> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::Assistant {
                tool_call: Some(ToolCall::Terminate { success }),
                ..
            } => Some(*success),
            _ => None,
        })
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_call_from_legacy_arguments() {
        let call = ToolCall::from_parts(
            "run_command",
            &json!({"command": "ls", "tactic_used": "TA0007:Discovery", "technique_used": "T1083"}),
        )
        .unwrap();

        assert_eq!(
            call,
            ToolCall::Execute {
                command: "ls".into(),
                tactic: "TA0007:Discovery".into(),
                technique: "T1083".into(),
            }
        );
        assert_eq!(call.name(), ToolName::Execute);
    }

    #[test]
    fn execute_call_from_string_arguments() {
        let args = Value::String(r#"{"input": "id", "tactic": "Discovery", "technique": "T1033"}"#.into());
        let call = ToolCall::from_parts("execute", &args).unwrap();
        assert!(matches!(call, ToolCall::Execute { ref command, .. } if command == "id"));
    }

    #[test]
    fn execute_call_missing_technique() {
        let err = ToolCall::from_parts("execute", &json!({"command": "ls", "tactic": "Discovery"})).unwrap_err();
        assert_eq!(
            err,
            ToolCallError::MissingField {
                tool: "execute".into(),
                field: "technique"
            }
        );
    }

    #[test]
    fn terminate_requires_boolean() {
        assert_eq!(
            ToolCall::from_parts("terminate", &json!({"success": true})).unwrap(),
            ToolCall::Terminate { success: true }
        );
        assert!(matches!(
            ToolCall::from_parts("terminate", &json!({"success": "yes"})),
            Err(ToolCallError::WrongType { .. })
        ));
        assert!(matches!(
            ToolCall::from_parts("terminate", &json!({})),
            Err(ToolCallError::MissingField { field: "success", .. })
        ));
    }

    #[test]
    fn unknown_tool_rejected() {
        assert_eq!(
            ToolCall::from_parts("web_search_tool", &json!({"query": "x"})).unwrap_err(),
            ToolCallError::UnknownTool("web_search_tool".into())
        );
    }

    #[test]
    fn honeypot_event_from_log_line() {
        let event =
            HoneypotEvent::from_log_line(r#"{"level":"info","event":{"Protocol":"SSH","Command":" whoami "}}"#)
                .unwrap();
        assert_eq!(event.ssh_command_text(), Some("whoami"));

        let http = HoneypotEvent::from_log_line(r#"{"event":{"Protocol":"HTTP","RequestURI":"/"}}"#).unwrap();
        assert_eq!(http.ssh_command_text(), None);

        assert!(HoneypotEvent::from_log_line("not json").is_none());
        assert!(HoneypotEvent::from_log_line(r#"{"msg":"started"}"#).is_none());
    }

    #[test]
    fn transcript_termination() {
        let mut transcript = Transcript::new();
        transcript.push(Message::system("attack"));
        assert_eq!(transcript.termination(), None);

        transcript.push(Message::assistant(None, Some(ToolCall::Terminate { success: false })));
        transcript.push(Message::tool(ToolName::Terminate, "false", Vec::new()));
        assert_eq!(transcript.termination(), Some(false));
    }

    #[test]
    fn message_serializes_with_role_tag() {
        let value = serde_json::to_value(Message::user("continue")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "continue"}));
    }
}
