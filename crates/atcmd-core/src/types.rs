//! Core types shared by the client and server sides of the AT stack.

use std::fmt;
use std::time::Duration;

/// Default deadline for one command/response cycle.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for completing an unsolicited line once bytes are seen.
pub const DEFAULT_URC_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one completed command cycle or URC check.
///
/// Every cycle resolves to exactly one of these; there is no "still
/// pending" value. `Ok` is the success sentinel (code 0).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtErrorCode {
    /// The command completed with a success result (`OK`, `0`, `CONNECT`).
    Ok,
    /// No terminal result arrived before the deadline.
    Timeout,
    /// The response checksum did not match its payload.
    CmdCrc,
    /// The device answered with an error token, passed through verbatim
    /// (`ERROR`, `NO CARRIER`, `+CME ERROR: 10`, ...).
    Modem(String),
    /// Server side: the command is not registered, or has no callback for
    /// the requested operator.
    Unregistered,
}

impl AtErrorCode {
    /// `true` only for [`AtErrorCode::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, AtErrorCode::Ok)
    }

    /// The detail carried by a `+CME ERROR:` / `+CMS ERROR:` token, if any.
    pub fn extended_detail(&self) -> Option<&str> {
        match self {
            AtErrorCode::Modem(token) => ["+CME ERROR:", "+CMS ERROR:"]
                .iter()
                .find_map(|p| token.strip_prefix(p))
                .map(str::trim),
            _ => None,
        }
    }
}

impl fmt::Display for AtErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtErrorCode::Ok => write!(f, "OK"),
            AtErrorCode::Timeout => write!(f, "ERR_TIMEOUT"),
            AtErrorCode::CmdCrc => write!(f, "ERR_CMD_CRC"),
            AtErrorCode::Modem(token) => write!(f, "ERR_MODEM({token})"),
            AtErrorCode::Unregistered => write!(f, "ERR_UNREGISTERED"),
        }
    }
}

/// Per-connection mode flags.
///
/// The server mutates these authoritatively when it handles `V`, `E` and
/// `+CRC`/`%CRC`. The client tracks them from what the device confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    /// Textual result codes with blank-line framing (`V1`).
    pub verbose: bool,
    /// The device echoes each command line back (`E1`).
    pub echo: bool,
    /// Lines carry a CCITT-16 checksum suffix.
    pub crc_enabled: bool,
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            verbose: true,
            echo: true,
            crc_enabled: false,
        }
    }
}

/// Line framing characters.
///
/// V.25 calls these S3 (command line termination) and S4 (response
/// formatting). The checksum separator precedes the 4-digit hex CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Command line termination character (default `\r`).
    pub termination: u8,
    /// Response formatting character (default `\n`).
    pub formatting: u8,
    /// Separator between a line and its checksum (default `*`).
    pub crc_separator: u8,
}

impl Framing {
    /// The two-character header/trailer used around verbose responses.
    pub fn line_break(&self) -> [u8; 2] {
        [self.termination, self.formatting]
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            termination: b'\r',
            formatting: b'\n',
            crc_separator: b'*',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_defaults() {
        let flags = ModeFlags::default();
        assert!(flags.verbose);
        assert!(flags.echo);
        assert!(!flags.crc_enabled);
    }

    #[test]
    fn framing_defaults() {
        let framing = Framing::default();
        assert_eq!(framing.termination, b'\r');
        assert_eq!(framing.formatting, b'\n');
        assert_eq!(framing.crc_separator, b'*');
        assert_eq!(&framing.line_break(), b"\r\n");
    }

    #[test]
    fn error_code_display() {
        assert_eq!(AtErrorCode::Ok.to_string(), "OK");
        assert_eq!(AtErrorCode::Timeout.to_string(), "ERR_TIMEOUT");
        assert_eq!(AtErrorCode::CmdCrc.to_string(), "ERR_CMD_CRC");
        assert_eq!(
            AtErrorCode::Modem("NO CARRIER".into()).to_string(),
            "ERR_MODEM(NO CARRIER)"
        );
        assert_eq!(AtErrorCode::Unregistered.to_string(), "ERR_UNREGISTERED");
    }

    #[test]
    fn only_ok_is_ok() {
        assert!(AtErrorCode::Ok.is_ok());
        assert!(!AtErrorCode::Timeout.is_ok());
        assert!(!AtErrorCode::Modem("ERROR".into()).is_ok());
    }

    #[test]
    fn extended_detail_from_cme_token() {
        let code = AtErrorCode::Modem("+CME ERROR: invalid configuration".into());
        assert_eq!(code.extended_detail(), Some("invalid configuration"));
        let code = AtErrorCode::Modem("+CMS ERROR: 500".into());
        assert_eq!(code.extended_detail(), Some("500"));
        assert_eq!(AtErrorCode::Modem("ERROR".into()).extended_detail(), None);
        assert_eq!(AtErrorCode::Timeout.extended_detail(), None);
    }
}
