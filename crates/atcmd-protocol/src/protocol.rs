//! V.25 command line and result code grammar.
//!
//! Shared by both roles: the client uses it to recognize terminal result
//! codes and the mode commands it has sent, the server uses it to split an
//! incoming line into sub-commands and to render result codes.

use atcmd_core::error::{Error, Result};
use atcmd_core::types::{AtErrorCode, ModeFlags};

/// A V.25 result code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    /// `CONNECT`, optionally followed by a rate or other text.
    Connect(Option<String>),
    Ring,
    NoCarrier,
    Error,
    NoDialtone,
    Busy,
    NoAnswer,
    /// `+CME ERROR: <detail>`
    CmeError(String),
    /// `+CMS ERROR: <detail>`
    CmsError(String),
}

impl ResultCode {
    /// Recognize a textual result code line.
    pub fn parse_verbose(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(detail) = line.strip_prefix("+CME ERROR:") {
            return Some(ResultCode::CmeError(detail.trim().to_string()));
        }
        if let Some(detail) = line.strip_prefix("+CMS ERROR:") {
            return Some(ResultCode::CmsError(detail.trim().to_string()));
        }
        if let Some(rest) = line.strip_prefix("CONNECT") {
            return match rest.strip_prefix(' ') {
                Some(extra) if !extra.trim().is_empty() => {
                    Some(ResultCode::Connect(Some(extra.trim().to_string())))
                }
                _ if rest.is_empty() => Some(ResultCode::Connect(None)),
                _ => None,
            };
        }
        match line {
            "OK" => Some(ResultCode::Ok),
            "RING" => Some(ResultCode::Ring),
            "NO CARRIER" => Some(ResultCode::NoCarrier),
            "ERROR" => Some(ResultCode::Error),
            "NO DIALTONE" => Some(ResultCode::NoDialtone),
            "BUSY" => Some(ResultCode::Busy),
            "NO ANSWER" => Some(ResultCode::NoAnswer),
            _ => None,
        }
    }

    /// Recognize a numeric (`V0`) result code line.
    pub fn parse_numeric(line: &str) -> Option<Self> {
        match line.trim() {
            "0" => Some(ResultCode::Ok),
            "1" => Some(ResultCode::Connect(None)),
            "2" => Some(ResultCode::Ring),
            "3" => Some(ResultCode::NoCarrier),
            "4" => Some(ResultCode::Error),
            "6" => Some(ResultCode::NoDialtone),
            "7" => Some(ResultCode::Busy),
            "8" => Some(ResultCode::NoAnswer),
            _ => None,
        }
    }

    /// Numeric form used in non-verbose mode. Extended error tokens have
    /// no numeric form and are always sent as text.
    pub fn numeric(&self) -> Option<u8> {
        match self {
            ResultCode::Ok => Some(0),
            ResultCode::Connect(_) => Some(1),
            ResultCode::Ring => Some(2),
            ResultCode::NoCarrier => Some(3),
            ResultCode::Error => Some(4),
            ResultCode::NoDialtone => Some(6),
            ResultCode::Busy => Some(7),
            ResultCode::NoAnswer => Some(8),
            ResultCode::CmeError(_) | ResultCode::CmsError(_) => None,
        }
    }

    /// Textual form used in verbose mode.
    pub fn verbose_text(&self) -> String {
        match self {
            ResultCode::Ok => "OK".into(),
            ResultCode::Connect(None) => "CONNECT".into(),
            ResultCode::Connect(Some(extra)) => format!("CONNECT {extra}"),
            ResultCode::Ring => "RING".into(),
            ResultCode::NoCarrier => "NO CARRIER".into(),
            ResultCode::Error => "ERROR".into(),
            ResultCode::NoDialtone => "NO DIALTONE".into(),
            ResultCode::Busy => "BUSY".into(),
            ResultCode::NoAnswer => "NO ANSWER".into(),
            ResultCode::CmeError(detail) => format!("+CME ERROR: {detail}"),
            ResultCode::CmsError(detail) => format!("+CMS ERROR: {detail}"),
        }
    }

    /// `RING` is unsolicited; every other code ends a command cycle.
    pub fn is_final(&self) -> bool {
        !matches!(self, ResultCode::Ring)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Ok | ResultCode::Connect(_))
    }

    /// Map to the cycle outcome. Failure tokens pass through as text.
    pub fn to_error_code(&self) -> AtErrorCode {
        if self.is_success() {
            AtErrorCode::Ok
        } else {
            AtErrorCode::Modem(self.verbose_text())
        }
    }
}

/// Strip a leading `AT` (either case) from a command line.
pub fn strip_at_prefix(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    if bytes.len() >= 2 && bytes[..2].eq_ignore_ascii_case(b"AT") {
        Some(&line[2..])
    } else {
        None
    }
}

/// Split the body of a command line (after `AT`) into sub-commands.
///
/// Pieces are separated by `;` outside double quotes. A piece made only of
/// basic commands (`E0V1`, `&W`, `I`) is further split into one entry per
/// basic command. `D` consumes the rest of its piece as the dial string.
pub fn split_subcommands(body: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in body.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);

    let mut out = Vec::new();
    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        // Later pieces of a batch may repeat the prefix.
        let piece = strip_at_prefix(piece)
            .filter(|rest| !rest.is_empty())
            .unwrap_or(piece);
        if is_basic_only(piece) {
            out.extend(split_basic(piece));
        } else {
            out.push(piece.to_string());
        }
    }
    out
}

fn is_basic_only(piece: &str) -> bool {
    piece
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '&')
        && piece
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '&')
}

fn split_basic(piece: &str) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut chars = piece.chars().peekable();
    while let Some(c) = chars.next() {
        if c.eq_ignore_ascii_case(&'D') {
            groups.push(std::iter::once(c).chain(chars.by_ref()).collect());
            break;
        }
        let mut group = String::from(c);
        if c == '&' {
            if let Some(letter) = chars.next() {
                group.push(letter);
            }
        }
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            group.push(d);
        }
        groups.push(group);
    }
    groups
}

/// How a sub-command addresses its command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `<name>?`
    Read,
    /// `<name>=?`
    Test,
    /// `<name>=<args>`
    Write(String),
    /// `<name>`
    Run,
}

/// Split a sub-command into its name and operation.
pub fn classify(sub: &str) -> (&str, Operation) {
    if let Some(name) = sub.strip_suffix("=?") {
        (name, Operation::Test)
    } else if let Some(name) = sub.strip_suffix('?') {
        (name, Operation::Read)
    } else if let Some((name, args)) = sub.split_once('=') {
        (name, Operation::Write(args.to_string()))
    } else {
        (sub, Operation::Run)
    }
}

/// A command that changes the connection's [`ModeFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// `E<0|1>`
    Echo(bool),
    /// `V<0|1>`
    Verbose(bool),
    /// `+CRC=<0|1>` or `%CRC=<0|1>`
    Crc(bool),
    /// `+CRC?`
    CrcRead,
    /// `+CRC=?`
    CrcTest,
}

impl ModeCommand {
    /// Apply to a set of flags. Queries leave them unchanged.
    pub fn apply(&self, flags: &mut ModeFlags) {
        match *self {
            ModeCommand::Echo(on) => flags.echo = on,
            ModeCommand::Verbose(on) => flags.verbose = on,
            ModeCommand::Crc(on) => flags.crc_enabled = on,
            ModeCommand::CrcRead | ModeCommand::CrcTest => {}
        }
    }
}

/// Recognize a mode-altering sub-command.
///
/// Returns `Ok(None)` for anything else, and
/// [`Error::InvalidParameter`] for a mode command with a bad value
/// (`E2`, `+CRC=5`).
pub fn parse_mode_command(sub: &str) -> Result<Option<ModeCommand>> {
    let sub = sub.trim();
    if let Some((letter, value)) = sub.split_at_checked(1) {
        let basic = match letter {
            "E" | "e" => Some(ModeCommand::Echo as fn(bool) -> ModeCommand),
            "V" | "v" => Some(ModeCommand::Verbose as fn(bool) -> ModeCommand),
            _ => None,
        };
        if let Some(make) = basic {
            return match value {
                "" | "0" => Ok(Some(make(false))),
                "1" => Ok(Some(make(true))),
                _ if value.chars().all(|c| c.is_ascii_digit()) => Err(Error::InvalidParameter(
                    format!("{letter} accepts 0 or 1, got {value}"),
                )),
                _ => Ok(None),
            };
        }
    }

    let bytes = sub.as_bytes();
    if bytes.len() < 4
        || !(bytes[0] == b'+' || bytes[0] == b'%')
        || !bytes[1..4].eq_ignore_ascii_case(b"CRC")
    {
        return Ok(None);
    }
    match classify(sub).1 {
        Operation::Read => Ok(Some(ModeCommand::CrcRead)),
        Operation::Test => Ok(Some(ModeCommand::CrcTest)),
        Operation::Write(value) => match value.trim() {
            "0" => Ok(Some(ModeCommand::Crc(false))),
            "1" => Ok(Some(ModeCommand::Crc(true))),
            other => Err(Error::InvalidParameter(format!(
                "CRC accepts 0 or 1, got {other}"
            ))),
        },
        Operation::Run if sub.len() == 4 => Err(Error::InvalidParameter(
            "CRC requires a value".into(),
        )),
        Operation::Run => Ok(None),
    }
}

/// Every valid mode command contained in a full command line.
pub fn mode_commands_in(line: &str) -> Vec<ModeCommand> {
    let Some(body) = strip_at_prefix(line.trim()) else {
        return Vec::new();
    };
    split_subcommands(body)
        .iter()
        .filter_map(|sub| parse_mode_command(sub).ok().flatten())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_codes() {
        assert_eq!(ResultCode::parse_verbose("OK"), Some(ResultCode::Ok));
        assert_eq!(ResultCode::parse_verbose("ERROR"), Some(ResultCode::Error));
        assert_eq!(
            ResultCode::parse_verbose("NO CARRIER"),
            Some(ResultCode::NoCarrier)
        );
        assert_eq!(
            ResultCode::parse_verbose("CONNECT 9600"),
            Some(ResultCode::Connect(Some("9600".into())))
        );
        assert_eq!(
            ResultCode::parse_verbose("CONNECT"),
            Some(ResultCode::Connect(None))
        );
        assert_eq!(ResultCode::parse_verbose("CONNECTED"), None);
        assert_eq!(ResultCode::parse_verbose("+CSQ: 15,99"), None);
        assert_eq!(ResultCode::parse_verbose("OKAY"), None);
    }

    #[test]
    fn extended_error_codes() {
        assert_eq!(
            ResultCode::parse_verbose("+CME ERROR: invalid configuration"),
            Some(ResultCode::CmeError("invalid configuration".into()))
        );
        assert_eq!(
            ResultCode::parse_verbose("+CMS ERROR: 500"),
            Some(ResultCode::CmsError("500".into()))
        );
        let code = ResultCode::CmeError("10".into()).to_error_code();
        assert_eq!(code, AtErrorCode::Modem("+CME ERROR: 10".into()));
    }

    #[test]
    fn numeric_codes_round_trip_known_values() {
        for n in [0u8, 1, 2, 3, 4, 6, 7, 8] {
            let code = ResultCode::parse_numeric(&n.to_string()).unwrap();
            assert_eq!(code.numeric(), Some(n));
        }
        assert_eq!(ResultCode::parse_numeric("5"), None);
        assert_eq!(ResultCode::parse_numeric("15"), None);
    }

    #[test]
    fn finality_and_success() {
        assert!(!ResultCode::Ring.is_final());
        assert!(ResultCode::Busy.is_final());
        assert!(ResultCode::Ok.is_success());
        assert!(ResultCode::Connect(None).is_success());
        assert!(!ResultCode::Error.is_success());
        assert_eq!(ResultCode::Ok.to_error_code(), AtErrorCode::Ok);
        assert_eq!(
            ResultCode::Error.to_error_code(),
            AtErrorCode::Modem("ERROR".into())
        );
    }

    #[test]
    fn at_prefix_is_case_insensitive() {
        assert_eq!(strip_at_prefix("AT+CSQ"), Some("+CSQ"));
        assert_eq!(strip_at_prefix("at+csq"), Some("+csq"));
        assert_eq!(strip_at_prefix("AT"), Some(""));
        assert_eq!(strip_at_prefix("+CSQ"), None);
    }

    #[test]
    fn split_semicolon_batch() {
        assert_eq!(
            split_subcommands("+CSQ;+CGMI?;+CMEE=2"),
            vec!["+CSQ", "+CGMI?", "+CMEE=2"]
        );
    }

    #[test]
    fn split_respects_quotes() {
        assert_eq!(
            split_subcommands("+CMGS=\"a;b\";+CSQ"),
            vec!["+CMGS=\"a;b\"", "+CSQ"]
        );
    }

    #[test]
    fn split_repeated_at_prefix() {
        assert_eq!(split_subcommands("+A;AT+B"), vec!["+A", "+B"]);
    }

    #[test]
    fn split_concatenated_basic_commands() {
        assert_eq!(split_subcommands("E0V1"), vec!["E0", "V1"]);
        assert_eq!(split_subcommands("&F0Z"), vec!["&F0", "Z"]);
        assert_eq!(split_subcommands("I1"), vec!["I1"]);
        assert_eq!(split_subcommands("E0D5551234"), vec!["E0", "D5551234"]);
        assert_eq!(split_subcommands("S0=5"), vec!["S0=5"]);
        assert!(split_subcommands("").is_empty());
    }

    #[test]
    fn classify_operators() {
        assert_eq!(classify("+FOO?"), ("+FOO", Operation::Read));
        assert_eq!(classify("+FOO=?"), ("+FOO", Operation::Test));
        assert_eq!(
            classify("+FOO=1,2"),
            ("+FOO", Operation::Write("1,2".into()))
        );
        assert_eq!(classify("+FOO"), ("+FOO", Operation::Run));
    }

    #[test]
    fn mode_commands() {
        assert_eq!(parse_mode_command("E0").unwrap(), Some(ModeCommand::Echo(false)));
        assert_eq!(parse_mode_command("e1").unwrap(), Some(ModeCommand::Echo(true)));
        assert_eq!(parse_mode_command("E").unwrap(), Some(ModeCommand::Echo(false)));
        assert_eq!(parse_mode_command("V1").unwrap(), Some(ModeCommand::Verbose(true)));
        assert_eq!(parse_mode_command("%CRC=1").unwrap(), Some(ModeCommand::Crc(true)));
        assert_eq!(parse_mode_command("+crc=0").unwrap(), Some(ModeCommand::Crc(false)));
        assert_eq!(parse_mode_command("+CRC?").unwrap(), Some(ModeCommand::CrcRead));
        assert_eq!(parse_mode_command("+CRC=?").unwrap(), Some(ModeCommand::CrcTest));
        assert_eq!(parse_mode_command("+CSQ").unwrap(), None);
        assert_eq!(parse_mode_command("+CRCX").unwrap(), None);
        assert_eq!(parse_mode_command("I").unwrap(), None);
        assert_eq!(parse_mode_command("Ex").unwrap(), None);
    }

    #[test]
    fn invalid_mode_values() {
        assert!(matches!(
            parse_mode_command("E2"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_mode_command("+CRC=5"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_mode_command("+CRC"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn mode_commands_in_full_line() {
        assert_eq!(
            mode_commands_in("ATE0V0"),
            vec![ModeCommand::Echo(false), ModeCommand::Verbose(false)]
        );
        assert_eq!(mode_commands_in("AT%CRC=1"), vec![ModeCommand::Crc(true)]);
        assert!(mode_commands_in("AT+CSQ").is_empty());
        assert!(mode_commands_in("E0").is_empty());
    }

    #[test]
    fn apply_mode_commands() {
        let mut flags = ModeFlags::default();
        ModeCommand::Echo(false).apply(&mut flags);
        ModeCommand::Verbose(false).apply(&mut flags);
        ModeCommand::Crc(true).apply(&mut flags);
        ModeCommand::CrcRead.apply(&mut flags);
        assert_eq!(
            flags,
            ModeFlags {
                verbose: false,
                echo: false,
                crc_enabled: true
            }
        );
    }
}
