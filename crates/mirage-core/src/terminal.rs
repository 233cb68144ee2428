//! Terminal seam and its guard
//!
//! [`GuardedTerminal`] never fails and never hangs: a timeout interrupts the
//! command and substitutes a sentinel, transport failures become empty
//! output, and oversized output is cut to its tail.

use crate::config::TerminalSettings;
use crate::error::TerminalError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Appended when a command outlives the timeout
pub const TIMEOUT_SENTINEL: &str = "***COMMAND TOOK TO LONG TO RUN, KILLING COMMAND***\n";

/// Appended when output was cut to its last `max_chars` characters
#[must_use]
pub fn truncation_notice(max_chars: usize) -> String {
    format!("\n***TOO LONG OUTPUT FROM COMMAND, ONLY SHOWING THE FINAL {max_chars} characters***")
}

/// Attacker-side terminal
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Run a command and return what the terminal printed
    async fn send(&self, command: &str) -> Result<String, TerminalError>;

    /// Interrupt the running command, returning anything printed meanwhile
    async fn interrupt(&self) -> Result<String, TerminalError>;
}

/// How a guarded command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// Terminal answered in time
    Completed,
    /// Timeout hit, command interrupted
    TimedOut,
    /// Transport failed
    Failed(String),
}

/// Result of a guarded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Output shown to the agent
    pub output: String,
    /// How the command ended
    pub status: CommandStatus,
    /// Whether the output was cut
    pub truncated: bool,
}

/// Keep the last `max_chars` characters of `output`, marking the cut
#[must_use]
pub fn truncate_tail(output: &str, max_chars: usize) -> Option<String> {
    let count = output.chars().count();
    if count <= max_chars {
        return None;
    }
    let start = output
        .char_indices()
        .nth(count - max_chars)
        .map_or(output.len(), |(index, _)| index);
    Some(format!("{}{}", &output[start..], truncation_notice(max_chars)))
}

/// Terminal with timeout, interrupt and truncation
#[derive(Clone)]
pub struct GuardedTerminal {
    inner: Arc<dyn Terminal>,
    settings: TerminalSettings,
}

impl GuardedTerminal {
    /// Guard a terminal
    #[inline]
    #[must_use]
    pub fn new(inner: Arc<dyn Terminal>, settings: TerminalSettings) -> Self {
        Self { inner, settings }
    }

    /// Guard settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &TerminalSettings {
        &self.settings
    }

    /// Run a command; always returns a result
    pub async fn run(&self, command: &str) -> CommandResult {
        let (output, status) =
            match tokio::time::timeout(self.settings.timeout(), self.inner.send(command)).await {
                Ok(Ok(output)) => (output, CommandStatus::Completed),
                Ok(Err(e)) => {
                    tracing::warn!("Terminal failed on {:?}: {}", command, e);
                    (String::new(), CommandStatus::Failed(e.to_string()))
                }
                Err(_) => {
                    tracing::warn!(
                        "Command {:?} exceeded {}s, interrupting",
                        command,
                        self.settings.timeout_secs
                    );
                    (self.interrupt().await, CommandStatus::TimedOut)
                }
            };

        match truncate_tail(&output, self.settings.max_output_chars) {
            Some(output) => CommandResult {
                output,
                status,
                truncated: true,
            },
            None => CommandResult {
                output,
                status,
                truncated: false,
            },
        }
    }

    async fn interrupt(&self) -> String {
        let tail = match tokio::time::timeout(self.settings.interrupt_grace(), self.inner.interrupt()).await {
            Ok(Ok(tail)) => tail,
            Ok(Err(e)) => {
                tracing::warn!("Interrupt failed: {}", e);
                String::new()
            }
            Err(_) => {
                tracing::warn!("Interrupt did not return within {}s", self.settings.interrupt_grace_secs);
                String::new()
            }
        };
        format!("{TIMEOUT_SENTINEL}{tail}")
    }
}

impl fmt::Debug for GuardedTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedTerminal")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    struct Fixed(Result<String, TerminalError>);

    #[async_trait]
    impl Terminal for Fixed {
        async fn send(&self, _command: &str) -> Result<String, TerminalError> {
            self.0.clone()
        }

        async fn interrupt(&self) -> Result<String, TerminalError> {
            Ok(String::new())
        }
    }

    struct Hanging;

    #[async_trait]
    impl Terminal for Hanging {
        async fn send(&self, _command: &str) -> Result<String, TerminalError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }

        async fn interrupt(&self) -> Result<String, TerminalError> {
            Ok("^C\nkali@kali:~$ ".into())
        }
    }

    fn guard(inner: impl Terminal + 'static) -> GuardedTerminal {
        GuardedTerminal::new(Arc::new(inner), TerminalSettings::default())
    }

    #[tokio::test]
    async fn passes_output_through() {
        let result = guard(Fixed(Ok("root".into()))).run("whoami").await;
        assert_eq!(result.output, "root");
        assert_eq!(result.status, CommandStatus::Completed);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn transport_failure_yields_empty_output() {
        let result = guard(Fixed(Err(TerminalError::Closed))).run("ls").await;
        assert_eq!(result.output, "");
        assert!(matches!(result.status, CommandStatus::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_interrupts_with_sentinel() {
        let result = guard(Hanging).run("nmap -p- 172.20.0.3").await;
        assert_eq!(result.status, CommandStatus::TimedOut);
        assert!(result.output.starts_with(TIMEOUT_SENTINEL));
        assert!(result.output.ends_with("kali@kali:~$ "));
    }

    #[tokio::test]
    async fn long_output_keeps_tail() {
        let output = format!("{}{}", "a".repeat(5), "b".repeat(10_000));
        let result = guard(Fixed(Ok(output))).run("cat /dev/urandom").await;
        assert!(result.truncated);
        assert_eq!(
            result.output,
            format!(
                "{}\n***TOO LONG OUTPUT FROM COMMAND, ONLY SHOWING THE FINAL 10000 characters***",
                "b".repeat(10_000)
            )
        );
    }

    #[tokio::test]
    async fn truncation_notice_names_configured_limit() {
        let terminal = GuardedTerminal::new(
            Arc::new(Fixed(Ok("0123456789".to_string()))),
            TerminalSettings {
                max_output_chars: 5,
                ..TerminalSettings::default()
            },
        );
        let result = terminal.run("seq 0 9").await;
        assert!(result.truncated);
        assert_eq!(
            result.output,
            "56789\n***TOO LONG OUTPUT FROM COMMAND, ONLY SHOWING THE FINAL 5 characters***"
        );
    }

    proptest! {
        #[test]
        fn truncation_keeps_exactly_the_tail(text in "\\PC{0,64}", max in 1usize..32) {
            match truncate_tail(&text, max) {
                None => prop_assert!(text.chars().count() <= max),
                Some(cut) => {
                    let kept = cut.strip_suffix(truncation_notice(max).as_str()).unwrap();
                    prop_assert_eq!(kept.chars().count(), max);
                    prop_assert!(text.ends_with(kept));
                }
            }
        }
    }
}
