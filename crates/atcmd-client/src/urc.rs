//! Unsolicited result code detection.
//!
//! Between commands a modem may emit lines on its own (`RING`,
//! `+CREG: 1`). [`AtClient::check_urc`] picks these up opportunistically:
//! it never waits when the line is idle, and once bytes are seen it waits
//! only until the line is fully framed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use atcmd_core::error::{Error, Result};
use atcmd_core::types::AtErrorCode;
use atcmd_protocol::line::Boundary;

use crate::client::{AtClient, Session};
use crate::engine::Payload;

const READ_CHUNK: usize = 256;

impl AtClient {
    /// Look for one unsolicited line.
    ///
    /// Returns `Ok(None)` straight away when no bytes are waiting. Otherwise
    /// waits up to `timeout` (default: the configured URC timeout) for a
    /// fully framed line, stores it for [`get_response`](Self::get_response)
    /// and returns [`AtErrorCode::Ok`], or [`AtErrorCode::Timeout`] if the
    /// line never completes.
    ///
    /// Runs between command cycles; if a command is in flight this waits
    /// for it to finish first.
    pub async fn check_urc(&self, timeout: Option<Duration>) -> Result<Option<AtErrorCode>> {
        let timeout = timeout.unwrap_or(self.config.urc_timeout);
        let mut session = self.session.lock().await;
        let session = &mut *session;

        let mut buf = [0u8; READ_CHUNK];
        if !session.assembler.has_pending() {
            let n = session.transport.receive_available(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            session.assembler.push(&buf[..n]);
        }

        session.assembler.set_boundary(Boundary::Formatted);
        let result = read_urc(session, &mut buf, timeout).await;
        session.assembler.set_boundary(Boundary::Any);
        session.assembler.discard_consumed();
        result.map(Some)
    }

    /// Check for an unsolicited line and return its text if one completed.
    pub async fn get_urc(&self) -> Result<Option<String>> {
        match self.check_urc(None).await? {
            Some(AtErrorCode::Ok) => Ok(Some(self.get_response(None).await)),
            _ => Ok(None),
        }
    }
}

async fn read_urc(session: &mut Session, buf: &mut [u8], timeout: Duration) -> Result<AtErrorCode> {
    let deadline = Instant::now() + timeout;
    let start = session.assembler.position();
    loop {
        while let Some(line) = session.assembler.next_line() {
            if line.is_blank() {
                continue;
            }
            debug!(urc = %line.text, "unsolicited line");
            let raw = session.assembler.transcript(start, line.end);
            session.get_buffer = Some(Payload {
                raw: String::from_utf8_lossy(raw).into_owned(),
                lines: vec![line.text],
            });
            return Ok(AtErrorCode::Ok);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                bytes = session.assembler.pending_len(),
                "timed out waiting for unsolicited line to complete"
            );
            return Ok(AtErrorCode::Timeout);
        }
        match session.transport.receive(buf, remaining).await {
            Ok(n) => {
                session.assembler.push(&buf[..n]);
            }
            Err(Error::Timeout) => {
                warn!(
                    bytes = session.assembler.pending_len(),
                    "timed out waiting for unsolicited line to complete"
                );
                return Ok(AtErrorCode::Timeout);
            }
            Err(e) => return Err(e),
        }
    }
}
