//! AtClient -- host-side AT command engine.
//!
//! [`AtClient`] owns one connection to a modem. All mutable connection
//! state (line assembler, mode flags, get buffer, last error) lives in a
//! single session behind a `tokio::sync::Mutex`. Holding that lock is what
//! makes a command "pending": a second caller of
//! [`send_at_command`](AtClient::send_at_command) waits on the lock and is
//! admitted only after the first cycle has reached a terminal state.
//! Waiters are admitted in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use atcmd_core::error::{Error, Result};
use atcmd_core::transport::Transport;
use atcmd_core::types::{
    AtErrorCode, Framing, ModeFlags, DEFAULT_COMMAND_TIMEOUT, DEFAULT_URC_TIMEOUT,
};
use atcmd_protocol::crc::Crc16Codec;
use atcmd_protocol::line::LineAssembler;

use crate::engine::{CommandCycle, CycleResult, Payload};

const READ_CHUNK: usize = 256;

/// Reads spent clearing stale input before a command gives up and sends
/// anyway.
const MAX_STALE_READS: usize = 16;

/// Construction-time settings for an [`AtClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub framing: Framing,
    /// Deadline for a command cycle when none is given per call.
    pub command_timeout: Duration,
    /// Deadline for completing an unsolicited line once bytes are seen.
    pub urc_timeout: Duration,
    /// Assumed device modes before anything is observed.
    pub modes: ModeFlags,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            urc_timeout: DEFAULT_URC_TIMEOUT,
            modes: ModeFlags::default(),
        }
    }
}

pub(crate) struct Session {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) assembler: LineAssembler,
    pub(crate) modes: ModeFlags,
    pub(crate) get_buffer: Option<Payload>,
    pub(crate) last_error: Option<AtErrorCode>,
}

/// Clears the pending flag when a cycle ends, however it ends.
pub(crate) struct PendingGuard<'a>(&'a AtomicBool);

impl<'a> PendingGuard<'a> {
    pub(crate) fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Host-side AT command client.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct AtClient {
    pub(crate) session: Mutex<Session>,
    pending: AtomicBool,
    pub(crate) config: ClientConfig,
    codec: Crc16Codec,
}

impl AtClient {
    /// Wrap an open transport.
    pub fn new(transport: Box<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            session: Mutex::new(Session {
                transport,
                assembler: LineAssembler::new(config.framing),
                modes: config.modes,
                get_buffer: None,
                last_error: None,
            }),
            pending: AtomicBool::new(false),
            config,
            codec: Crc16Codec::new(config.framing.crc_separator),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a command and wait for its terminal state, using the default
    /// timeout and the current CRC mode.
    ///
    /// Protocol outcomes (`ERROR`, timeout, bad checksum) are returned as
    /// [`AtErrorCode`]; `Err` means the transport itself failed.
    pub async fn send_at_command(&self, text: &str) -> Result<AtErrorCode> {
        self.send_at_command_with(text, self.config.command_timeout, None)
            .await
    }

    /// Send a command with an explicit timeout and CRC choice.
    ///
    /// `use_crc: None` follows the session's current CRC mode.
    pub async fn send_at_command_with(
        &self,
        text: &str,
        timeout: Duration,
        use_crc: Option<bool>,
    ) -> Result<AtErrorCode> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidParameter("empty command".into()));
        }

        let mut session = self.session.lock().await;
        let _pending = PendingGuard::set(&self.pending);
        let session = &mut *session;

        session.last_error = None;
        discard_stale_input(session).await?;

        let use_crc = use_crc.unwrap_or(session.modes.crc_enabled);
        let mut wire = if use_crc {
            self.codec.append(text.as_bytes())
        } else {
            text.as_bytes().to_vec()
        };
        let echo_text = String::from_utf8_lossy(&wire).into_owned();
        wire.push(self.config.framing.termination);

        debug!(command = text, use_crc, "sending command");
        session.transport.send(&wire).await?;
        session.transport.flush().await?;

        let cycle = CommandCycle::new(
            text,
            echo_text,
            use_crc,
            session.modes,
            session.assembler.position(),
        );
        let result = run_cycle(session, cycle, timeout).await?;
        session.assembler.discard_consumed();

        if let Some(payload) = result.payload {
            session.get_buffer = Some(payload);
        }
        session.last_error = Some(result.code.clone());
        Ok(result.code)
    }

    /// Take the last response, stripping `prefix` from each line.
    ///
    /// Lines are trimmed and joined with `\n`. The buffer is cleared;
    /// an empty buffer yields an empty string.
    pub async fn get_response(&self, prefix: Option<&str>) -> String {
        let Some(payload) = self.session.lock().await.get_buffer.take() else {
            return String::new();
        };
        payload
            .lines
            .iter()
            .map(|line| {
                let line = line.as_str();
                prefix
                    .and_then(|p| line.strip_prefix(p))
                    .unwrap_or(line)
                    .trim()
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Take the last response exactly as received, framing included.
    pub async fn get_raw_response(&self) -> String {
        self.session
            .lock()
            .await
            .get_buffer
            .take()
            .map(|p| p.raw)
            .unwrap_or_default()
    }

    /// `true` if a response or URC is waiting to be retrieved.
    pub async fn is_response_ready(&self) -> bool {
        self.session.lock().await.get_buffer.is_some()
    }

    /// Outcome of the most recent command cycle. `None` before the first
    /// cycle completes, or when the last attempt failed at the transport.
    pub async fn last_error_code(&self) -> Option<AtErrorCode> {
        self.session.lock().await.last_error.clone()
    }

    /// `true` while a command cycle is running.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Current view of the device's modes.
    pub async fn mode_flags(&self) -> ModeFlags {
        self.session.lock().await.modes
    }

    /// Probe with `AT` until the device answers `OK` or `retry_timeout`
    /// elapses. Returns whether the device answered.
    pub async fn wait_ready(&self, retry_timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + retry_timeout;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let attempt_timeout = self
                .config
                .command_timeout
                .min(deadline.saturating_duration_since(Instant::now()))
                .max(Duration::from_millis(1));
            let code = self.send_at_command_with("AT", attempt_timeout, None).await?;
            if code.is_ok() {
                debug!(attempts, "device ready");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!(attempts, %code, "device not ready");
                return Ok(false);
            }
            // A modem that answers ERROR straight away is retried at the
            // command timeout cadence rather than in a tight loop.
            if code != AtErrorCode::Timeout {
                tokio::time::sleep(
                    self.config
                        .command_timeout
                        .min(deadline.saturating_duration_since(Instant::now())),
                )
                .await;
            }
        }
    }

    /// Suspend command processing and take exclusive use of the transport,
    /// e.g. for a binary file transfer. Commands resume when the guard is
    /// dropped.
    pub async fn data_mode(&self) -> DataMode<'_> {
        let session = self.session.lock().await;
        let pending = PendingGuard::set(&self.pending);
        debug!("entering data mode");
        DataMode {
            session,
            _pending: pending,
        }
    }

    /// Close the transport.
    pub async fn close(&self) -> Result<()> {
        self.session.lock().await.transport.close().await
    }
}

/// Exclusive transport access while command processing is suspended.
pub struct DataMode<'a> {
    session: MutexGuard<'a, Session>,
    _pending: PendingGuard<'a>,
}

impl DataMode<'_> {
    pub fn transport(&mut self) -> &mut dyn Transport {
        &mut *self.session.transport
    }
}

impl Drop for DataMode<'_> {
    fn drop(&mut self) {
        // Whatever the transfer left half-read is not a response.
        self.session.assembler.reset();
        debug!("leaving data mode");
    }
}

/// Clear everything that arrived since the last cycle.
///
/// Complete lines are unsolicited output or late replies to a command that
/// already timed out; neither belongs to the command about to be sent.
async fn discard_stale_input(session: &mut Session) -> Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    for _ in 0..MAX_STALE_READS {
        let n = session.transport.receive_available(&mut buf).await?;
        if n == 0 {
            break;
        }
        session.assembler.push(&buf[..n]);
    }

    while let Some(line) = session.assembler.next_line() {
        if !line.is_blank() {
            warn!(line = %line.text, "stale line before command, dropping");
        }
    }
    if session.assembler.has_pending() {
        debug!(
            bytes = session.assembler.pending_len(),
            "discarding partial line before command"
        );
    }
    session.assembler.reset();
    Ok(())
}

/// Read and assemble lines until the cycle reaches a terminal state.
async fn run_cycle(
    session: &mut Session,
    mut cycle: CommandCycle,
    timeout: Duration,
) -> Result<CycleResult> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; READ_CHUNK];
    loop {
        while let Some(line) = session.assembler.next_line() {
            if let Some(result) = cycle.on_line(&line, &session.assembler, &mut session.modes) {
                return Ok(result);
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(cycle.time_out());
        }
        match session.transport.receive(&mut buf, remaining).await {
            Ok(n) => {
                session.assembler.push(&buf[..n]);
            }
            Err(Error::Timeout) => return Ok(cycle.time_out()),
            Err(e) => return Err(e),
        }
    }
}
