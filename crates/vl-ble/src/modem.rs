//! AT-command session over one BLE characteristic.
//!
//! The adapter behaves like a serial modem: commands go out as
//! `\r`-terminated text, responses stream back as notification chunks and
//! end with a `>` prompt. This module owns the framing — chunk
//! accumulation, prompt detection, echo suppression, timeout, and the
//! resend bound for acknowledged commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use crate::error::{TransportError, TransportResult};
use crate::transport::{BlePeripheral, GattCharacteristic};

/// Prompt character the adapter prints when a response is complete.
pub const RESPONSE_PROMPT: char = '>';

/// How long to wait for notification data before declaring a timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Resend bound when an acknowledgement is expected but the adapter stays
/// silent. The full command is resent on every retry.
pub const ACK_RETRIES: u32 = 2;

/// Byte-stream session bound to one transport characteristic.
///
/// Exclusively owned: only one caller sends commands through a session at
/// a time.
pub struct ModemSession {
    peripheral: Arc<dyn BlePeripheral>,
    characteristic: GattCharacteristic,
    notifications: mpsc::Receiver<Vec<u8>>,
    timeout: Duration,
}

impl ModemSession {
    pub fn new(
        peripheral: Arc<dyn BlePeripheral>,
        characteristic: GattCharacteristic,
        notifications: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            peripheral,
            characteristic,
            notifications,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one command and wait for the prompt-terminated response.
    ///
    /// Returns the response text with the prompt, surrounding whitespace,
    /// and the command's own echo stripped. With `expect_ack`, a silent
    /// adapter gets the command resent up to [`ACK_RETRIES`] times before
    /// the timeout is surfaced.
    pub async fn send_command(
        &mut self,
        command: &str,
        expect_ack: bool,
    ) -> TransportResult<String> {
        let attempts = if expect_ack { 1 + ACK_RETRIES } else { 1 };
        let mut last = TransportError::CommandTimeout {
            timeout_ms: self.timeout.as_millis() as u64,
        };

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::debug!(command, attempt, "no acknowledgement, resending");
            }
            self.write_line(command).await?;
            match self.read_response(command).await {
                Ok(text) => return Ok(text),
                Err(err @ TransportError::CommandTimeout { .. }) => last = err,
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }

    async fn write_line(&self, command: &str) -> TransportResult<()> {
        let mut payload = command.as_bytes().to_vec();
        payload.push(b'\r');
        self.peripheral.write(&self.characteristic, &payload).await
    }

    /// Accumulate queued chunks until the prompt appears. The timeout is
    /// per chunk: any incoming data restarts it.
    async fn read_response(&mut self, command: &str) -> TransportResult<String> {
        let mut accumulated = String::new();
        loop {
            let chunk = match time::timeout(self.timeout, self.notifications.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Err(TransportError::ChannelClosed),
                Err(_) => {
                    return Err(TransportError::CommandTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
            };
            accumulated.push_str(&String::from_utf8_lossy(&chunk));
            if accumulated.contains(RESPONSE_PROMPT) {
                break;
            }
        }
        Ok(extract_body(&accumulated, command))
    }
}

/// Strip the prompt, surrounding whitespace, and the echoed command.
fn extract_body(accumulated: &str, command: &str) -> String {
    let before_prompt = accumulated
        .split(RESPONSE_PROMPT)
        .next()
        .unwrap_or_default();
    let mut body = before_prompt.trim();
    if let Some(rest) = body.strip_prefix(command) {
        body = rest.trim_start();
    }
    body.to_string()
}
