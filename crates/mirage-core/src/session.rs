//! One bounded attacker-vs-honeypot session
//!
//! Each iteration asks the agent for its next move:
//! - no recognizable call: the reply is kept as reasoning and the agent gets
//!   one continuation nudge
//! - a malformed or unknown call: rejected with a message back to the agent,
//!   the session goes on
//! - `execute`: the command runs through the guarded terminal, honeypot log
//!   lines emitted meanwhile are attached to the result
//! - `terminate`: the session ends
//!
//! The session always completes with a trace. Agent failure ends it early
//! with [`SessionOutcome::AgentUnavailable`].

use crate::agent::{tool_schema, AgentReply, AttackerAgent, RawToolCall, TokenUsage};
use crate::honeypot::LogPoller;
use crate::terminal::GuardedTerminal;
use mirage_trace::{
    ExtractionMode, Message, SessionOutcome, SessionTrace, ToolCall, ToolName, TraceBuilder,
    TraceExtractor, Transcript,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Sent after a reply without a usable tool call
pub const CONTINUE_NUDGE: &str = "Continue the operation. Use the execute tool to run your next command, or terminate when you are done.";

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Full conversation
    pub transcript: Transcript,
    /// Frozen trace
    pub trace: SessionTrace,
    /// Tokens used by the agent this session
    pub usage: TokenUsage,
    /// Iterations consumed
    pub iterations: u32,
    /// How the session ended
    pub outcome: SessionOutcome,
    /// Tool calls rejected for contract violations
    pub rejected_calls: u32,
}

/// Drives sessions against one terminal
pub struct SessionRunner {
    agent: Arc<dyn AttackerAgent>,
    terminal: GuardedTerminal,
    logs: Option<LogPoller>,
    extractor: TraceExtractor,
    max_iterations: u32,
    tools: Value,
}

impl SessionRunner {
    /// Create a runner with the default iteration cap and no log capture
    #[must_use]
    pub fn new(agent: Arc<dyn AttackerAgent>, terminal: GuardedTerminal) -> Self {
        Self {
            agent,
            terminal,
            logs: None,
            extractor: TraceExtractor::default(),
            max_iterations: 5,
            tools: tool_schema(),
        }
    }

    /// Attach honeypot log capture
    #[inline]
    #[must_use]
    pub fn with_log_poller(mut self, poller: LogPoller) -> Self {
        self.logs = Some(poller);
        self
    }

    /// Set the extraction mode
    #[inline]
    #[must_use]
    pub fn with_extraction(mut self, mode: ExtractionMode) -> Self {
        self.extractor = TraceExtractor::new(mode);
        self
    }

    /// Set the iteration cap
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Iteration cap
    #[inline]
    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run one session from `initial`
    pub async fn run(&mut self, initial: Transcript) -> SessionReport {
        let mut transcript = initial;
        let mut usage = TokenUsage::default();
        let mut rejected_calls = 0;
        let mut iterations = 0;
        let mut outcome = SessionOutcome::IterationCap;

        if let Some(logs) = self.logs.as_mut() {
            logs.mark();
        }

        for iteration in 1..=self.max_iterations {
            iterations = iteration;
            tracing::debug!("Iteration {} / {}", iteration, self.max_iterations);

            let reply = match self.agent.respond(&transcript, &self.tools).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("Attacker agent failed, ending session: {}", e);
                    outcome = SessionOutcome::AgentUnavailable;
                    break;
                }
            };
            usage.record(&reply.usage);

            let (text, raw_call) = split_reply(reply);
            let Some(raw_call) = raw_call else {
                transcript.push(Message::assistant(text, None));
                transcript.push(Message::user(CONTINUE_NUDGE));
                continue;
            };

            let call = match ToolCall::from_parts(&raw_call.name, &raw_call.arguments) {
                Ok(call) => call,
                Err(e) => {
                    tracing::warn!("Rejected tool call `{}`: {}", raw_call.name, e);
                    rejected_calls += 1;
                    transcript.push(Message::assistant(text, None));
                    transcript.push(Message::user(format!(
                        "Tool call rejected: {e}. Use `execute` with command, tactic and technique, or `terminate` with success."
                    )));
                    continue;
                }
            };

            transcript.push(Message::assistant(text, Some(call.clone())));
            match call {
                ToolCall::Execute { command, .. } => {
                    let result = self.terminal.run(&command).await;
                    let events = match self.logs.as_mut() {
                        Some(logs) => logs.poll().await,
                        None => Vec::new(),
                    };
                    tracing::debug!(
                        "Executed {:?} ({:?}, {} honeypot events)",
                        command,
                        result.status,
                        events.len()
                    );
                    transcript.push(Message::tool(ToolName::Execute, result.output, events));
                }
                ToolCall::Terminate { success } => {
                    transcript.push(Message::tool(ToolName::Terminate, success.to_string(), Vec::new()));
                    tracing::info!(
                        "Attack {} after {} iterations",
                        if success { "succeeded" } else { "failed" },
                        iteration
                    );
                    outcome = SessionOutcome::Terminated { success };
                    break;
                }
            }
        }

        let trace = self.extractor.extract_into(
            &transcript,
            TraceBuilder::new().with_iterations(iterations),
            outcome,
        );
        tracing::info!(
            "Session {} finished: {} events, {} iterations, {:?}",
            trace.id(),
            trace.len(),
            iterations,
            outcome
        );

        SessionReport {
            transcript,
            trace,
            usage,
            iterations,
            outcome,
            rejected_calls,
        }
    }
}

/// Separate reasoning text from the tool call, recovering calls embedded in text
fn split_reply(reply: AgentReply) -> (Option<String>, Option<RawToolCall>) {
    match reply.tool_call {
        Some(call) => (reply.text, Some(call)),
        None => match reply.text.as_deref().and_then(RawToolCall::from_embedded) {
            Some(call) => (None, Some(call)),
            None => (reply.text, None),
        },
    }
}

impl fmt::Debug for SessionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRunner")
            .field("agent", &self.agent.model_name())
            .field("terminal", &self.terminal)
            .field("logs", &self.logs)
            .field("extractor", &self.extractor)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}
