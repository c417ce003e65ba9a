//! Transport sink that pipes the compendium to a mail submission command
//! (`msmtp -t`, `sendmail -t`, ...).

use std::process::Stdio;
use std::time::Duration;

use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use digestmerge_core::ports::TransportSink;
use digestmerge_shared::{DigestError, Result};

/// Spawns a command and writes an RFC 822 message to its stdin.
#[derive(Debug, Clone)]
pub struct CommandSink {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    sender: Option<String>,
}

impl CommandSink {
    /// Create a sink for `command args...`, killed after `timeout`.
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            sender: None,
        }
    }

    /// Use `sender` as the `From:` address instead of the recipient.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        let sender = sender.into();
        self.sender = (!sender.trim().is_empty()).then_some(sender);
        self
    }
}

/// Build the outgoing plain-text message in its wire form (LF line endings,
/// as local submission programs expect on stdin).
pub fn compose_message(
    body: &str,
    subject: &str,
    sender: &str,
    recipient: &str,
) -> Result<String> {
    if [subject, sender, recipient].iter().any(|v| v.contains(['\r', '\n'])) {
        return Err(DigestError::Sink("header value contains a line break".into()));
    }

    let from = parse_mailbox("sender", sender)?;
    let to = parse_mailbox("recipient", recipient)?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| DigestError::Sink(format!("failed to build message: {e}")))?;

    Ok(String::from_utf8_lossy(&message.formatted()).replace("\r\n", "\n"))
}

fn parse_mailbox(role: &str, address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| DigestError::Sink(format!("invalid {role} address '{address}': {e}")))
}

impl TransportSink for CommandSink {
    #[instrument(skip(self, body), fields(command = %self.command))]
    async fn send(&self, body: &str, subject: &str, recipient: &str) -> Result<()> {
        let sender = self.sender.as_deref().unwrap_or(recipient);
        let message = compose_message(body, subject, sender, recipient)?;

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DigestError::Sink(format!("failed to spawn {}: {e}", self.command)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DigestError::Sink("child stdin unavailable".into()))?;

        let exchange = async {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|e| DigestError::Sink(format!("writing to {}: {e}", self.command)))?;
            drop(stdin);
            child
                .wait_with_output()
                .await
                .map_err(|e| DigestError::Sink(format!("waiting for {}: {e}", self.command)))
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                DigestError::Sink(format!(
                    "{} did not finish within {}s",
                    self.command,
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DigestError::Sink(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        debug!(bytes = message.len(), "message handed to transport");
        Ok(())
    }
}
