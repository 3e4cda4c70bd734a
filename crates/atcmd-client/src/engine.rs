//! Command/response state machine.
//!
//! A [`CommandCycle`] tracks one command from the moment its bytes are on
//! the wire until a terminal state. It is fed complete lines by the client
//! and never touches the transport, so every transition can be exercised
//! synchronously.
//!
//! ```text
//! ECHO ──echo──▶ RESPONSE ──final code──▶ CRC ──checksum──▶ DONE_OK / DONE_ERROR
//!   │                │                     │
//!   └──final code────┘ (echo off)          └── mismatch ──▶ DONE_ERROR (CmdCrc)
//! ```

use tracing::{debug, warn};

use atcmd_core::types::{AtErrorCode, ModeFlags};
use atcmd_protocol::crc::{crc16, parse_checksum};
use atcmd_protocol::line::{Line, LineAssembler};
use atcmd_protocol::protocol::{mode_commands_in, ModeCommand, ResultCode};

/// Where a command cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    Echo,
    Response,
    Crc,
    DoneOk,
    DoneError,
    TimedOut,
}

impl ParseState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParseState::DoneOk | ParseState::DoneError | ParseState::TimedOut
        )
    }
}

/// A successfully parsed response or unsolicited line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Content lines, without framing or the result code.
    pub lines: Vec<String>,
    /// Raw response bytes as received, including framing.
    pub raw: String,
}

/// Terminal result of a [`CommandCycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    pub code: AtErrorCode,
    /// Present only for [`AtErrorCode::Ok`].
    pub payload: Option<Payload>,
}

/// State for one in-flight command.
#[derive(Debug)]
pub struct CommandCycle {
    /// Command text as sent, checksum included, termination excluded.
    echo_text: String,
    use_crc: bool,
    modes_sent: Vec<ModeCommand>,
    state: ParseState,
    /// Lines seen before the echo, replayed if the echo never comes.
    stash: Vec<Line>,
    lines: Vec<String>,
    /// Transcript offset where the response proper begins.
    response_start: usize,
    /// A blank framing line has been seen ahead of any content.
    framed: bool,
    final_code: Option<ResultCode>,
    final_end: usize,
}

impl CommandCycle {
    /// Begin a cycle for `command`, whose wire form (minus termination) is
    /// `echo_text`. `start` is the transcript position after the command
    /// was sent.
    pub fn new(command: &str, echo_text: String, use_crc: bool, modes: ModeFlags, start: usize) -> Self {
        let state = if modes.echo {
            ParseState::Echo
        } else {
            ParseState::Response
        };
        debug!(command, ?state, use_crc, "command cycle started");
        Self {
            echo_text,
            use_crc,
            modes_sent: mode_commands_in(command),
            state,
            stash: Vec::new(),
            lines: Vec::new(),
            response_start: start,
            framed: false,
            final_code: None,
            final_end: start,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed one line. Returns the result once a terminal state is reached.
    ///
    /// `transcript` must be the assembler that produced `line`; it supplies
    /// the raw bytes a response checksum covers.
    pub fn on_line(
        &mut self,
        line: &Line,
        transcript: &LineAssembler,
        modes: &mut ModeFlags,
    ) -> Option<CycleResult> {
        match self.state {
            ParseState::Echo => self.on_echo_line(line, transcript, modes),
            ParseState::Response => self.on_response_line(line, transcript, modes),
            ParseState::Crc => self.on_crc_line(line, transcript, modes),
            _ => None,
        }
    }

    /// The deadline passed without a terminal state.
    pub fn time_out(&mut self) -> CycleResult {
        debug!(state = ?self.state, "command timed out");
        self.state = ParseState::TimedOut;
        CycleResult {
            code: AtErrorCode::Timeout,
            payload: None,
        }
    }

    fn is_echo(&self, line: &Line) -> bool {
        line.text.eq_ignore_ascii_case(&self.echo_text)
    }

    fn on_echo_line(
        &mut self,
        line: &Line,
        transcript: &LineAssembler,
        modes: &mut ModeFlags,
    ) -> Option<CycleResult> {
        if self.is_echo(line) {
            for dropped in self.stash.drain(..).filter(|l| !l.is_blank()) {
                warn!(line = %dropped.text, "line received before echo, dropping");
            }
            self.state = ParseState::Response;
            self.response_start = line.end;
            return None;
        }

        let is_final = ResultCode::parse_verbose(&line.text)
            .or_else(|| ResultCode::parse_numeric(&line.text))
            .is_some_and(|code| code.is_final());
        if !is_final {
            self.stash.push(line.clone());
            return None;
        }

        debug!("result code before echo, echo is off");
        modes.echo = false;
        self.state = ParseState::Response;
        let stash = std::mem::take(&mut self.stash);
        stash
            .iter()
            .chain(std::iter::once(line))
            .find_map(|l| self.on_line(l, transcript, modes))
    }

    fn on_response_line(
        &mut self,
        line: &Line,
        transcript: &LineAssembler,
        modes: &mut ModeFlags,
    ) -> Option<CycleResult> {
        if line.is_blank() {
            if self.lines.is_empty() {
                self.framed = true;
            }
            return None;
        }

        // A device reset can turn echo back on behind our back.
        if !modes.echo && self.lines.is_empty() && self.is_echo(line) {
            debug!("echo seen with echo off, echo is on");
            modes.echo = true;
            self.response_start = line.end;
            self.framed = false;
            return None;
        }

        let code = if let Some(code) = ResultCode::parse_verbose(&line.text) {
            if matches!(
                code,
                ResultCode::CmeError(_) | ResultCode::CmsError(_)
            ) {
                Some(code)
            } else if code.is_final() {
                modes.verbose = true;
                Some(code)
            } else {
                warn!(line = %line.text, "unsolicited line during response, dropping");
                return None;
            }
        } else if !modes.verbose || !self.framed {
            ResultCode::parse_numeric(&line.text)
                .filter(ResultCode::is_final)
                .inspect(|_| modes.verbose = false)
        } else {
            None
        };

        let Some(code) = code else {
            self.lines.push(line.text.clone());
            return None;
        };

        self.final_end = line.end;
        let expect_crc = self.expects_crc(&code);
        self.final_code = Some(code);
        if expect_crc {
            self.state = ParseState::Crc;
            return None;
        }
        Some(self.finish(transcript, modes))
    }

    fn on_crc_line(
        &mut self,
        line: &Line,
        transcript: &LineAssembler,
        modes: &mut ModeFlags,
    ) -> Option<CycleResult> {
        if line.is_blank() {
            return None;
        }
        let separator = transcript.framing().crc_separator;
        let covered = transcript.transcript(self.response_start, line.start);
        let matched = line
            .text
            .as_bytes()
            .split_first()
            .filter(|&(&first, _)| first == separator)
            .and_then(|(_, digits)| parse_checksum(digits))
            .is_some_and(|expected| crc16(covered) == expected);

        if !matched {
            warn!(line = %line.text, computed = crc16(covered), "invalid crc");
            self.state = ParseState::DoneError;
            return Some(CycleResult {
                code: AtErrorCode::CmdCrc,
                payload: None,
            });
        }
        Some(self.finish(transcript, modes))
    }

    /// Whether the reply to this command carries a checksum.
    fn expects_crc(&self, code: &ResultCode) -> bool {
        if code.is_success() {
            if self.modes_sent.contains(&ModeCommand::Crc(true)) {
                return true;
            }
            if self.modes_sent.contains(&ModeCommand::Crc(false)) {
                return false;
            }
        }
        self.use_crc
    }

    fn finish(&mut self, transcript: &LineAssembler, modes: &mut ModeFlags) -> CycleResult {
        let Some(code) = self.final_code.take() else {
            return self.time_out();
        };
        let code = code.to_error_code();
        if !code.is_ok() {
            debug!(%code, "command failed");
            self.state = ParseState::DoneError;
            return CycleResult {
                code,
                payload: None,
            };
        }

        for cmd in &self.modes_sent {
            cmd.apply(modes);
        }
        self.state = ParseState::DoneOk;
        let raw = transcript.transcript(self.response_start, self.final_end);
        debug!(lines = self.lines.len(), "command succeeded");
        CycleResult {
            code,
            payload: Some(Payload {
                lines: std::mem::take(&mut self.lines),
                raw: String::from_utf8_lossy(raw).into_owned(),
            }),
        }
    }
}
