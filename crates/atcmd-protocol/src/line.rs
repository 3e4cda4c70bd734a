//! Line assembly from a raw byte stream.
//!
//! [`LineAssembler`] buffers bytes as they arrive from a transport and
//! splits them into lines using the two framing characters from
//! [`Framing`]. Partial lines persist across pushes. Every accepted byte is
//! also kept in a transcript so callers can recover the exact raw bytes a
//! checksum was computed over.

use atcmd_core::types::Framing;
use tracing::warn;

/// Default cap on unconsumed bytes before the buffer is reset.
pub const DEFAULT_MAX_PENDING: usize = 8192;

/// Which characters end a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    /// Either the termination or the formatting character ends a line.
    /// A formatting character directly after a termination character is
    /// part of the same boundary, so `\r\n` yields one line, not two.
    #[default]
    Any,
    /// Only the formatting character ends a line; termination characters
    /// before it are stripped. Used when a fully framed line is required.
    Formatted,
}

/// One complete line extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line content without framing characters.
    pub text: String,
    /// Transcript offset of the first content byte.
    pub start: usize,
    /// Transcript offset just past the terminating character.
    pub end: usize,
}

impl Line {
    /// `true` when the line has no content (framing-only).
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental line splitter. See the module docs.
#[derive(Debug, Clone)]
pub struct LineAssembler {
    framing: Framing,
    boundary: Boundary,
    data: Vec<u8>,
    cursor: usize,
    /// The previous line ended on a termination character; a formatting
    /// character arriving next belongs to that boundary.
    after_termination: bool,
    max_pending: usize,
}

impl LineAssembler {
    /// Create an assembler for the given framing, in [`Boundary::Any`] mode.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            boundary: Boundary::Any,
            data: Vec::new(),
            cursor: 0,
            after_termination: false,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Override the cap on unconsumed bytes.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Switch the line boundary rule. Buffered bytes are re-scanned with
    /// the new rule on the next [`next_line`](Self::next_line).
    pub fn set_boundary(&mut self, boundary: Boundary) {
        self.boundary = boundary;
    }

    /// Append raw bytes. Returns the number of bytes dropped as invalid.
    ///
    /// Only printable IA5 characters, tab, and the two framing characters
    /// are accepted; anything else is logged and discarded.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let mut dropped = 0;
        for &b in bytes {
            if self.accepts(b) {
                self.data.push(b);
            } else {
                warn!(byte = b, "invalid char on line, dropping");
                dropped += 1;
            }
        }

        if self.pending_len() > self.max_pending {
            warn!(
                len = self.pending_len(),
                "line buffer overflow, resetting"
            );
            self.reset();
        }
        dropped
    }

    /// Extract the next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<Line> {
        let Framing {
            termination,
            formatting,
            ..
        } = self.framing;

        if self.after_termination && self.cursor < self.data.len() {
            if self.data[self.cursor] == formatting {
                self.cursor += 1;
            }
            self.after_termination = false;
        }

        let pending = &self.data[self.cursor..];
        let pos = match self.boundary {
            Boundary::Any => pending
                .iter()
                .position(|&b| b == termination || b == formatting)?,
            Boundary::Formatted => pending.iter().position(|&b| b == formatting)?,
        };

        let start = self.cursor;
        let delimiter = pending[pos];
        let mut content = &pending[..pos];
        if self.boundary == Boundary::Formatted {
            while let Some((&last, rest)) = content.split_last() {
                if last != termination {
                    break;
                }
                content = rest;
            }
            // Drop any termination characters that led into this line.
            while let Some((&first, rest)) = content.split_first() {
                if first != termination {
                    break;
                }
                content = rest;
            }
        }

        let text = String::from_utf8_lossy(content).into_owned();
        let line = Line {
            text,
            start,
            end: start + pos + 1,
        };
        self.cursor = line.end;
        self.after_termination = self.boundary == Boundary::Any && delimiter == termination;
        Some(line)
    }

    /// Append bytes and return every line completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Line> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Discard all buffered bytes, partial lines, and the transcript.
    pub fn reset(&mut self) {
        self.data.clear();
        self.cursor = 0;
        self.after_termination = false;
    }

    /// Drop transcript bytes that have already been consumed as lines.
    ///
    /// Offsets of previously returned [`Line`]s are invalidated.
    pub fn discard_consumed(&mut self) {
        self.data.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Number of buffered bytes not yet returned as part of a line.
    pub fn pending_len(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// `true` if any unconsumed bytes are buffered.
    pub fn has_pending(&self) -> bool {
        self.pending_len() > 0
    }

    /// Raw transcript bytes between two offsets.
    pub fn transcript(&self, start: usize, end: usize) -> &[u8] {
        let end = end.min(self.data.len());
        &self.data[start.min(end)..end]
    }

    /// Current transcript length, usable as an offset marker.
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn accepts(&self, b: u8) -> bool {
        b == self.framing.termination
            || b == self.framing.formatting
            || b == b'\t'
            || (0x20..0x7F).contains(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[Line]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn verbose_response_splits_on_crlf() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"\r\n+CSQ: 15,99\r\n\r\nOK\r\n");
        assert_eq!(texts(&lines), vec!["", "+CSQ: 15,99", "", "OK"]);
        assert!(!asm.has_pending());
    }

    #[test]
    fn echo_then_verbose_response() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"AT\r\r\nOK\r\n");
        assert_eq!(texts(&lines), vec!["AT", "", "OK"]);
    }

    #[test]
    fn non_verbose_result_ends_on_bare_termination() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"+CSQ: 15,99\r\n0\r");
        assert_eq!(texts(&lines), vec!["+CSQ: 15,99", "0"]);
    }

    #[test]
    fn partial_lines_persist_across_feeds() {
        let mut asm = LineAssembler::new(Framing::default());
        assert!(asm.feed(b"\r\n+CS").len() == 1);
        assert_eq!(asm.pending_len(), 3);
        let lines = asm.feed(b"Q: 1\r");
        assert_eq!(texts(&lines), vec!["+CSQ: 1"]);
        // The formatting char arriving separately is absorbed.
        assert!(asm.feed(b"\n").is_empty());
        assert!(!asm.has_pending());
    }

    #[test]
    fn lone_formatting_chars_are_blank_lines() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"\n\n");
        assert_eq!(texts(&lines), vec!["", ""]);
        assert!(lines.iter().all(Line::is_blank));
    }

    #[test]
    fn formatted_boundary_waits_for_formatting_char() {
        let mut asm = LineAssembler::new(Framing::default());
        asm.set_boundary(Boundary::Formatted);
        assert!(asm.feed(b"\r\n+URC: Test\r").len() == 1);
        let lines = asm.feed(b"\n");
        assert_eq!(texts(&lines), vec!["+URC: Test"]);
    }

    #[test]
    fn invalid_bytes_are_dropped() {
        let mut asm = LineAssembler::new(Framing::default());
        let dropped = asm.push(b"\r\nO\xFFK\r\n");
        assert_eq!(dropped, 1);
        let lines: Vec<Line> = std::iter::from_fn(|| asm.next_line()).collect();
        assert_eq!(texts(&lines), vec!["", "OK"]);
    }

    #[test]
    fn offsets_recover_raw_bytes() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"AT\r\r\nOK\r\n*86C5\r\n");
        let echo_end = lines[0].end;
        let crc_line = lines.last().unwrap();
        assert_eq!(crc_line.text, "*86C5");
        assert_eq!(asm.transcript(echo_end, crc_line.start), b"\r\nOK\r\n");
    }

    #[test]
    fn custom_framing_characters() {
        let framing = Framing {
            termination: b'#',
            formatting: b'$',
            crc_separator: b'*',
        };
        let mut asm = LineAssembler::new(framing);
        let lines = asm.feed(b"AT#$$OK#$");
        assert_eq!(texts(&lines), vec!["AT", "", "OK"]);
    }

    #[test]
    fn overflow_resets_buffer() {
        let mut asm = LineAssembler::new(Framing::default()).with_max_pending(8);
        asm.push(b"0123456789");
        assert!(!asm.has_pending());
        assert_eq!(asm.feed(b"OK\r"), vec![Line { text: "OK".into(), start: 0, end: 3 }]);
    }

    #[test]
    fn reset_discards_partial_line() {
        let mut asm = LineAssembler::new(Framing::default());
        asm.push(b"+CSQ: 1");
        asm.reset();
        assert!(!asm.has_pending());
        assert_eq!(texts(&asm.feed(b"OK\r")), vec!["OK"]);
    }

    #[test]
    fn discard_consumed_keeps_pending_bytes() {
        let mut asm = LineAssembler::new(Framing::default());
        let lines = asm.feed(b"OK\r+UR");
        assert_eq!(lines.len(), 1);
        asm.discard_consumed();
        assert_eq!(asm.position(), 0);
        assert_eq!(asm.pending_len(), 3);
        assert_eq!(texts(&asm.feed(b"C\r")), vec!["+URC"]);
    }
}
