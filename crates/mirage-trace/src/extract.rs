//! Trace extraction
//!
//! Scans a [`Transcript`] in order and turns every `execute` call that got a
//! tool result into labelled [`CommandEvent`]s.
//!
//! - [`ExtractionMode::HoneypotObserved`] takes statements from the SSH
//!   command events the honeypot logged for the call
//! - [`ExtractionMode::AttackerIssued`] takes statements from the command
//!   text the attacker sent
//!
//! The justification of an event is the text of the first assistant message
//! after the call's tool result.

use crate::event::CommandEvent;
use crate::statements::split_statements;
use crate::trace::{SessionOutcome, SessionTrace, TraceBuilder};
use crate::transcript::{HoneypotEvent, Message, ToolCall, Transcript};
use serde::{Deserialize, Serialize};

/// Where extracted statements come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Commands the honeypot logged as received over SSH
    #[default]
    HoneypotObserved,
    /// Commands the attacker issued, whether or not the honeypot logged them
    AttackerIssued,
}

/// Extracts structured traces from transcripts
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceExtractor {
    mode: ExtractionMode,
}

impl TraceExtractor {
    /// Create an extractor
    #[inline]
    #[must_use]
    pub fn new(mode: ExtractionMode) -> Self {
        Self { mode }
    }

    /// Active mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Extract a trace, inferring the outcome from the transcript
    ///
    /// A transcript containing a `terminate` call is `Terminated`, anything
    /// else is treated as having hit the iteration cap.
    #[must_use]
    pub fn extract(&self, transcript: &Transcript) -> SessionTrace {
        let outcome = transcript
            .termination()
            .map_or(SessionOutcome::IterationCap, |success| {
                SessionOutcome::Terminated { success }
            });
        self.extract_into(transcript, TraceBuilder::new(), outcome)
    }

    /// Extract into an existing builder and freeze with a known outcome
    #[must_use]
    pub fn extract_into(
        &self,
        transcript: &Transcript,
        mut builder: TraceBuilder,
        outcome: SessionOutcome,
    ) -> SessionTrace {
        builder.extend(self.events(transcript));
        builder.finish(outcome)
    }

    /// Labelled events of a transcript in order
    #[must_use]
    pub fn events(&self, transcript: &Transcript) -> Vec<CommandEvent> {
        let messages = transcript.messages();
        let mut events = Vec::new();

        for (index, message) in messages.iter().enumerate() {
            let Message::Assistant {
                tool_call:
                    Some(ToolCall::Execute {
                        command,
                        tactic,
                        technique,
                    }),
                ..
            } = message
            else {
                continue;
            };

            // the call's result must directly follow it
            let Some(Message::Tool {
                honeypot_events, ..
            }) = messages.get(index + 1)
            else {
                continue;
            };

            let justification = follow_up_text(&messages[index + 2..]);
            let statements = match self.mode {
                ExtractionMode::HoneypotObserved => observed_statements(honeypot_events),
                ExtractionMode::AttackerIssued => split_statements(command),
            };

            events.extend(statements.into_iter().map(|statement| {
                let event = CommandEvent::new(statement, tactic.as_str(), technique.as_str());
                match justification {
                    Some(text) => event.with_justification(text),
                    None => event,
                }
            }));
        }

        tracing::debug!("Extracted {} events ({:?})", events.len(), self.mode);
        events
    }
}

fn observed_statements(events: &[HoneypotEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(HoneypotEvent::ssh_command_text)
        .flat_map(split_statements)
        .collect()
}

fn follow_up_text(rest: &[Message]) -> Option<&str> {
    rest.iter().find_map(|message| match message {
        Message::Assistant { content, .. } => Some(content.as_deref().unwrap_or_default()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ToolName;
    use pretty_assertions::assert_eq;

    fn execute(command: &str, tactic: &str, technique: &str) -> Message {
        Message::assistant(
            None,
            Some(ToolCall::Execute {
                command: command.into(),
                tactic: tactic.into(),
                technique: technique.into(),
            }),
        )
    }

    fn transcript() -> Transcript {
        Transcript::from_messages(vec![
            Message::system("you are a pentester"),
            Message::user("attack 172.20.0.3"),
            execute("ls -la ; whoami && id", "TA0007:Discovery", "T1083:File and Directory Discovery"),
            Message::tool(
                ToolName::Execute,
                "total 0",
                vec![
                    HoneypotEvent::ssh_command("ls -la ; whoami && id"),
                    HoneypotEvent::from_log_line(r#"{"event":{"Protocol":"HTTP","Command":"GET /"}}"#)
                        .unwrap(),
                ],
            ),
            Message::assistant(Some("enumerated the home directory".into()), None),
            execute("cat /etc/shadow", "Credential Access", "T1003"),
            Message::tool(ToolName::Execute, "permission denied", Vec::new()),
            Message::assistant(None, Some(ToolCall::Terminate { success: false })),
            Message::tool(ToolName::Terminate, "false", Vec::new()),
        ])
    }

    #[test]
    fn honeypot_observed_uses_logged_ssh_commands() {
        let trace = TraceExtractor::default().extract(&transcript());

        let commands: Vec<&str> = trace.events().iter().map(CommandEvent::command).collect();
        assert_eq!(commands, vec!["ls -la ;", "whoami &&", "id ;"]);
        assert_eq!(trace.tactics(), "Discovery - 2");
        assert_eq!(trace.techniques(), "File and Directory Discovery - 2");
        assert_eq!(
            trace.events()[0].justification(),
            Some("enumerated the home directory")
        );
        assert_eq!(trace.outcome(), SessionOutcome::Terminated { success: false });
    }

    #[test]
    fn attacker_issued_uses_command_text() {
        let trace = TraceExtractor::new(ExtractionMode::AttackerIssued).extract(&transcript());

        assert_eq!(trace.len(), 4);
        assert_eq!(trace.events()[3].command(), "cat /etc/shadow ;");
        assert_eq!(
            trace.tactics(),
            "Discovery - 2 -- Credential Access - 3"
        );
        // terminate follows without reasoning text
        assert_eq!(trace.events()[3].justification(), None);
    }

    #[test]
    fn call_without_result_is_skipped() {
        let transcript = Transcript::from_messages(vec![execute("uname -a", "Discovery", "T1082")]);
        let trace = TraceExtractor::new(ExtractionMode::AttackerIssued).extract(&transcript);
        assert!(trace.is_empty());
        assert_eq!(trace.outcome(), SessionOutcome::IterationCap);
    }

    #[test]
    fn scenario_event_labels() {
        let transcript = Transcript::from_messages(vec![
            execute("ls", "Discovery", "T1083"),
            Message::tool(ToolName::Execute, "", vec![HoneypotEvent::ssh_command("ls")]),
            execute("whoami", "Discovery", "T1033"),
            Message::tool(ToolName::Execute, "", vec![HoneypotEvent::ssh_command("whoami")]),
            execute("rm -rf /", "Impact", "T1485"),
            Message::tool(ToolName::Execute, "", vec![HoneypotEvent::ssh_command("rm -rf /")]),
        ]);
        let trace = TraceExtractor::default().extract(&transcript);

        assert_eq!(trace.tactics(), "Discovery - 1 -- Impact - 2");
        assert_eq!(trace.techniques(), "T1083 - 0 -- T1033 - 1 -- T1485 - 2");
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.technique_labels().unwrap().len(), trace.len());
    }
}
