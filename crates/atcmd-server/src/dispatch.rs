//! ServerDispatcher -- turns received command lines into modem replies.
//!
//! The dispatcher is transport-agnostic: [`feed`](ServerDispatcher::feed)
//! takes raw bytes and returns one [`DispatchOutcome`] per command line,
//! holding the exact bytes to write back. The [`AtServer`](crate::AtServer)
//! loop drives it over a real transport.
//!
//! Processing order for one line:
//!
//! 1. Lines not starting with `AT` are ignored.
//! 2. The line is echoed as received while echo is on.
//! 3. With checksums on, the line must carry a valid suffix or it is
//!    answered with `ERROR`.
//! 4. Each sub-command runs in turn. Mode commands (`E`, `V`, `+CRC`) are
//!    handled here; everything else goes to the [`CommandRegistry`]. A
//!    failing sub-command does not stop the rest of the batch.
//! 5. One final result code closes the reply: `OK` when every
//!    sub-command succeeded, otherwise the first failure.
//!
//! Reply formatting follows the modes in effect after processing, so
//! `ATV0` is answered with `0` and `AT+CRC=1` with a checksummed `OK`.

use std::fmt;

use tracing::{debug, info, warn};

use atcmd_core::types::{AtErrorCode, Framing, ModeFlags};
use atcmd_protocol::crc::Crc16Codec;
use atcmd_protocol::line::LineAssembler;
use atcmd_protocol::protocol::{
    classify, parse_mode_command, split_subcommands, strip_at_prefix, ModeCommand, Operation,
    ResultCode,
};

use crate::registry::{CommandRegistry, DataTransfer, Reply};

/// Everything produced by one command line.
pub struct DispatchOutcome {
    /// Echo plus reply, ready to write.
    pub output: Vec<u8>,
    /// Overall result: `Ok`, or the first failing sub-command's code.
    pub code: AtErrorCode,
    /// One entry per sub-command, in order.
    pub results: Vec<AtErrorCode>,
    /// Transfers to run after `output` has been written.
    pub transfers: Vec<Box<dyn DataTransfer>>,
}

impl DispatchOutcome {
    /// The output as text, for logging and tests.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOutcome")
            .field("output", &self.output_text())
            .field("code", &self.code)
            .field("results", &self.results)
            .field("transfers", &self.transfers.len())
            .finish()
    }
}

enum Step {
    Handled(Reply),
    Unregistered,
}

/// Modem-side command interpreter.
pub struct ServerDispatcher {
    registry: CommandRegistry,
    modes: ModeFlags,
    framing: Framing,
    codec: Crc16Codec,
    assembler: LineAssembler,
}

impl ServerDispatcher {
    /// A dispatcher with default framing and modes (`E1 V1`, checksums off).
    pub fn new(registry: CommandRegistry) -> Self {
        Self::with_framing(registry, Framing::default())
    }

    pub fn with_framing(registry: CommandRegistry, framing: Framing) -> Self {
        Self {
            registry,
            modes: ModeFlags::default(),
            framing,
            codec: Crc16Codec::new(framing.crc_separator),
            assembler: LineAssembler::new(framing),
        }
    }

    /// Start from the given modes instead of the defaults.
    pub fn with_modes(mut self, modes: ModeFlags) -> Self {
        self.modes = modes;
        self
    }

    pub fn modes(&self) -> ModeFlags {
        self.modes
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Accept received bytes and dispatch every command line they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DispatchOutcome> {
        let lines = self.assembler.feed(bytes);
        self.assembler.discard_consumed();
        lines
            .iter()
            .filter_map(|line| self.dispatch(&line.text))
            .collect()
    }

    /// Drop any partially received line, e.g. after a data transfer.
    pub fn reset_input(&mut self) {
        self.assembler.reset();
    }

    /// Process one command line (without its termination character).
    ///
    /// Returns `None` for lines that are not AT commands; those get no
    /// echo and no reply.
    pub fn dispatch(&mut self, line: &str) -> Option<DispatchOutcome> {
        let line = line.trim();
        if strip_at_prefix(line).is_none() {
            if !line.is_empty() {
                debug!(line = %line, "ignoring non-AT line");
            }
            return None;
        }

        let mut output = Vec::new();
        if self.modes.echo {
            output.extend_from_slice(line.as_bytes());
            output.push(self.framing.termination);
        }

        let command = if self.modes.crc_enabled {
            let (payload, valid) = self.codec.validate(line.as_bytes());
            if !valid {
                warn!(line = %line, "command checksum missing or invalid");
                self.render(&mut output, &[], &ResultCode::Error);
                return Some(DispatchOutcome {
                    output,
                    code: AtErrorCode::CmdCrc,
                    results: vec![AtErrorCode::CmdCrc],
                    transfers: Vec::new(),
                });
            }
            // The separator is ASCII, so this is a char boundary.
            &line[..payload.len()]
        } else {
            line
        };

        let body = strip_at_prefix(command).unwrap_or_default();
        debug!(command = %command, "dispatching");

        let mut info_lines = Vec::new();
        let mut results = Vec::new();
        let mut transfers = Vec::new();
        let mut failure: Option<ResultCode> = None;

        for sub in split_subcommands(body) {
            let result = match self.execute(&sub) {
                Step::Handled(reply) if reply.ok => {
                    info_lines.extend(
                        reply
                            .text
                            .lines()
                            .map(|l| l.trim_end_matches('\r'))
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                    );
                    transfers.extend(reply.transfer);
                    AtErrorCode::Ok
                }
                Step::Handled(reply) => {
                    let token = failure_token(&reply.text);
                    debug!(sub = %sub, token = %token.verbose_text(), "sub-command failed");
                    let code = token.to_error_code();
                    failure.get_or_insert(token);
                    code
                }
                Step::Unregistered => {
                    debug!(sub = %sub, "no handler registered");
                    failure.get_or_insert(ResultCode::Error);
                    AtErrorCode::Unregistered
                }
            };
            results.push(result);
        }

        let code = results
            .iter()
            .find(|r| !r.is_ok())
            .cloned()
            .unwrap_or(AtErrorCode::Ok);
        self.render(&mut output, &info_lines, &failure.unwrap_or(ResultCode::Ok));

        Some(DispatchOutcome {
            output,
            code,
            results,
            transfers,
        })
    }

    fn execute(&mut self, sub: &str) -> Step {
        match parse_mode_command(sub) {
            Ok(Some(cmd)) => return Step::Handled(self.apply_mode(sub, cmd)),
            Ok(None) => {}
            Err(e) => {
                debug!(sub = %sub, error = %e, "rejecting mode command");
                return Step::Handled(Reply::error());
            }
        }

        let (name, op) = classify(sub);
        let args = match &op {
            Operation::Write(args) => Some(args.as_str()),
            _ => None,
        };
        if let Some(handler) = self.registry.get(name).and_then(|c| c.handler(&op)) {
            return Step::Handled(handler(args));
        }

        // `I1` runs the `I` command with argument `1`.
        if op == Operation::Run {
            if let Some((base, digits)) = split_numeric_suffix(name) {
                if let Some(handler) = self.registry.get(base).and_then(|c| c.handler(&op)) {
                    return Step::Handled(handler(Some(digits)));
                }
            }
        }
        Step::Unregistered
    }

    fn apply_mode(&mut self, sub: &str, cmd: ModeCommand) -> Reply {
        let name = sub
            .trim()
            .get(..4)
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "+CRC".to_string());
        match cmd {
            ModeCommand::CrcRead => {
                Reply::ok_with(format!("{name}: {}", u8::from(self.modes.crc_enabled)))
            }
            ModeCommand::CrcTest => Reply::ok_with(format!("{name}: (0,1)")),
            _ => {
                cmd.apply(&mut self.modes);
                info!(
                    echo = self.modes.echo,
                    verbose = self.modes.verbose,
                    crc = self.modes.crc_enabled,
                    "modes changed"
                );
                Reply::ok()
            }
        }
    }

    /// Append the reply for `info_lines` and `code` in the current modes.
    fn render(&self, out: &mut Vec<u8>, info_lines: &[String], code: &ResultCode) {
        let start = out.len();
        let line_break = self.framing.line_break();

        if self.modes.verbose {
            if !info_lines.is_empty() {
                out.extend_from_slice(&line_break);
                for line in info_lines {
                    out.extend_from_slice(line.as_bytes());
                    out.extend_from_slice(&line_break);
                }
            }
            out.extend_from_slice(&line_break);
            out.extend_from_slice(code.verbose_text().as_bytes());
            out.extend_from_slice(&line_break);
        } else {
            for line in info_lines {
                out.extend_from_slice(line.as_bytes());
                out.extend_from_slice(&line_break);
            }
            match code.numeric() {
                Some(n) => out.extend_from_slice(n.to_string().as_bytes()),
                None => out.extend_from_slice(code.verbose_text().as_bytes()),
            }
            out.push(self.framing.termination);
        }

        if self.modes.crc_enabled {
            let suffix = self.codec.suffix(&out[start..]);
            out.extend_from_slice(&suffix);
            if self.modes.verbose {
                out.extend_from_slice(&line_break);
            } else {
                out.push(self.framing.termination);
            }
        }
    }
}

/// The result code to send for a failed reply. A handler may name an
/// error token in its text (`+CME ERROR: 10`, `NO CARRIER`); anything
/// else is reported as plain `ERROR`.
fn failure_token(text: &str) -> ResultCode {
    ResultCode::parse_verbose(text)
        .filter(|code| code.is_final() && !code.is_success())
        .unwrap_or(ResultCode::Error)
}

/// Split `I1` into `("I", "1")`. Returns `None` without trailing digits or
/// without a name in front of them.
fn split_numeric_suffix(name: &str) -> Option<(&str, &str)> {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.is_empty() || base.len() == name.len() {
        return None;
    }
    Some(name.split_at(base.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AtCommand;

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.add_command(AtCommand::new("+CSQ").run(|_| Reply::ok_with("+CSQ: 15,99")));
        registry.add_command(AtCommand::new("+FOO").run(|_| Reply::ok()));
        registry.add_command(
            AtCommand::new("+BAR")
                .read(|_| Reply::ok_with("+BAR: 3"))
                .test(|_| Reply::ok_with("+BAR: (0-9)"))
                .write(|args| match args {
                    Some("9") => Reply::error_with("+CME ERROR: 10"),
                    Some(_) => Reply::ok(),
                    None => Reply::error(),
                }),
        );
        registry.add_command(AtCommand::new("I").run(|args| match args {
            None => Reply::ok_with("ACME Modem"),
            Some("1") => Reply::ok_with("Rev 1.0\nBuild 42"),
            Some(_) => Reply::error(),
        }));
        registry
    }

    fn dispatcher() -> ServerDispatcher {
        ServerDispatcher::new(registry())
    }

    fn run(d: &mut ServerDispatcher, line: &str) -> DispatchOutcome {
        d.dispatch(line).expect("AT line should produce a reply")
    }

    #[test]
    fn bare_at_is_ok() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT");
        assert_eq!(out.output_text(), "AT\r\r\nOK\r\n");
        assert_eq!(out.code, AtErrorCode::Ok);
        assert!(out.results.is_empty());
    }

    #[test]
    fn run_handler_with_info_text() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+CSQ");
        assert_eq!(out.output_text(), "AT+CSQ\r\r\n+CSQ: 15,99\r\n\r\nOK\r\n");
        assert_eq!(out.results, vec![AtErrorCode::Ok]);
    }

    #[test]
    fn missing_operator_is_unregistered() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+FOO?");
        assert_eq!(out.output_text(), "AT+FOO?\r\r\nERROR\r\n");
        assert_eq!(out.code, AtErrorCode::Unregistered);
        assert_eq!(out.results, vec![AtErrorCode::Unregistered]);
    }

    #[test]
    fn unknown_command_is_unregistered() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+NOPE");
        assert_eq!(out.code, AtErrorCode::Unregistered);
        assert!(out.output_text().ends_with("\r\nERROR\r\n"));
    }

    #[test]
    fn names_are_matched_exactly() {
        let mut d = dispatcher();
        assert_eq!(run(&mut d, "AT+csq").code, AtErrorCode::Unregistered);
    }

    #[test]
    fn operators_route_to_their_handlers() {
        let mut d = dispatcher();
        assert_eq!(
            run(&mut d, "AT+BAR?").output_text(),
            "AT+BAR?\r\r\n+BAR: 3\r\n\r\nOK\r\n"
        );
        assert_eq!(
            run(&mut d, "AT+BAR=?").output_text(),
            "AT+BAR=?\r\r\n+BAR: (0-9)\r\n\r\nOK\r\n"
        );
        assert_eq!(run(&mut d, "AT+BAR=4").output_text(), "AT+BAR=4\r\r\nOK\r\n");
        assert_eq!(run(&mut d, "AT+BAR").code, AtErrorCode::Unregistered);
    }

    #[test]
    fn extended_error_token_from_handler() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+BAR=9");
        assert_eq!(out.output_text(), "AT+BAR=9\r\r\n+CME ERROR: 10\r\n");
        assert_eq!(out.code, AtErrorCode::Modem("+CME ERROR: 10".into()));
    }

    #[test]
    fn batch_continues_after_failure() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+FOO?;+CSQ");
        assert_eq!(
            out.results,
            vec![AtErrorCode::Unregistered, AtErrorCode::Ok]
        );
        assert_eq!(out.code, AtErrorCode::Unregistered);
        assert_eq!(
            out.output_text(),
            "AT+FOO?;+CSQ\r\r\n+CSQ: 15,99\r\n\r\nERROR\r\n"
        );
    }

    #[test]
    fn batch_with_repeated_prefix() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT+FOO;AT+CSQ");
        assert_eq!(out.results, vec![AtErrorCode::Ok, AtErrorCode::Ok]);
    }

    #[test]
    fn basic_command_with_numeric_argument() {
        let mut d = dispatcher();
        let out = run(&mut d, "ATI1");
        assert_eq!(
            out.output_text(),
            "ATI1\r\r\nRev 1.0\r\nBuild 42\r\n\r\nOK\r\n"
        );
        let out = run(&mut d, "ATI");
        assert_eq!(out.output_text(), "ATI\r\r\nACME Modem\r\n\r\nOK\r\n");
    }

    #[test]
    fn echo_off_then_numeric_mode() {
        let mut d = dispatcher();
        let out = run(&mut d, "ATE0V0");
        // Echo was on when the line arrived; the reply uses the new modes.
        assert_eq!(out.output_text(), "ATE0V0\r0\r");
        assert_eq!(out.results, vec![AtErrorCode::Ok, AtErrorCode::Ok]);
        assert_eq!(
            d.modes(),
            ModeFlags {
                verbose: false,
                echo: false,
                crc_enabled: false
            }
        );

        let out = run(&mut d, "AT+CSQ");
        assert_eq!(out.output_text(), "+CSQ: 15,99\r\n0\r");
        let out = run(&mut d, "AT+NOPE");
        assert_eq!(out.output_text(), "4\r");
    }

    #[test]
    fn extended_error_in_numeric_mode_stays_textual() {
        let mut d = dispatcher().with_modes(ModeFlags {
            verbose: false,
            echo: false,
            crc_enabled: false,
        });
        assert_eq!(run(&mut d, "AT+BAR=9").output_text(), "+CME ERROR: 10\r");
    }

    #[test]
    fn invalid_mode_value_is_error() {
        let mut d = dispatcher();
        let out = run(&mut d, "ATE2");
        assert_eq!(out.output_text(), "ATE2\r\r\nERROR\r\n");
        assert_eq!(out.code, AtErrorCode::Modem("ERROR".into()));
        assert!(d.modes().echo);

        let out = run(&mut d, "AT+CRC=5");
        assert_eq!(out.code, AtErrorCode::Modem("ERROR".into()));
        assert!(!d.modes().crc_enabled);
    }

    #[test]
    fn crc_enable_reply_is_checksummed() {
        let mut d = dispatcher();
        let out = run(&mut d, "AT%CRC=1");
        assert_eq!(out.output_text(), "AT%CRC=1\r\r\nOK\r\n*86C5\r\n");
        assert!(d.modes().crc_enabled);
    }

    #[test]
    fn crc_query_and_test() {
        let mut d = dispatcher();
        assert_eq!(
            run(&mut d, "AT+CRC?").output_text(),
            "AT+CRC?\r\r\n+CRC: 0\r\n\r\nOK\r\n"
        );
        assert_eq!(
            run(&mut d, "AT+CRC=?").output_text(),
            "AT+CRC=?\r\r\n+CRC: (0,1)\r\n\r\nOK\r\n"
        );
    }

    #[test]
    fn checksummed_command_accepted() {
        let mut d = dispatcher().with_modes(ModeFlags {
            crc_enabled: true,
            ..ModeFlags::default()
        });
        let out = run(&mut d, "AT*3983");
        assert_eq!(out.output_text(), "AT*3983\r\r\nOK\r\n*86C5\r\n");
        assert_eq!(out.code, AtErrorCode::Ok);
    }

    #[test]
    fn missing_checksum_rejected() {
        let mut d = dispatcher().with_modes(ModeFlags {
            crc_enabled: true,
            ..ModeFlags::default()
        });
        let out = run(&mut d, "AT");
        assert_eq!(out.output_text(), "AT\r\r\nERROR\r\n*84D9\r\n");
        assert_eq!(out.code, AtErrorCode::CmdCrc);

        let out = run(&mut d, "AT*1234");
        assert_eq!(out.code, AtErrorCode::CmdCrc);
    }

    #[test]
    fn crc_disable_needs_a_valid_checksum() {
        let mut d = dispatcher().with_modes(ModeFlags {
            crc_enabled: true,
            ..ModeFlags::default()
        });
        let out = run(&mut d, "AT%CRC=0");
        assert_eq!(out.code, AtErrorCode::CmdCrc);
        assert!(d.modes().crc_enabled);

        let out = run(&mut d, "AT%CRC=0*BBEB");
        assert_eq!(out.output_text(), "AT%CRC=0*BBEB\r\r\nOK\r\n");
        assert!(!d.modes().crc_enabled);
    }

    #[test]
    fn numeric_checksummed_reply() {
        let mut d = dispatcher().with_modes(ModeFlags {
            verbose: false,
            echo: false,
            crc_enabled: true,
        });
        assert_eq!(run(&mut d, "AT*3983").output_text(), "0\r*C937\r");
        assert_eq!(run(&mut d, "AT").output_text(), "4\r*05F3\r");
    }

    #[test]
    fn non_at_lines_are_ignored() {
        let mut d = dispatcher();
        assert!(d.dispatch("hello").is_none());
        assert!(d.dispatch("").is_none());
        assert!(d.dispatch("A").is_none());
    }

    #[test]
    fn lowercase_prefix_accepted() {
        let mut d = dispatcher();
        let out = run(&mut d, "at");
        assert_eq!(out.output_text(), "at\r\r\nOK\r\n");
    }

    #[test]
    fn feed_splits_lines() {
        let mut d = dispatcher();
        assert!(d.feed(b"AT+C").is_empty());
        let outcomes = d.feed(b"SQ\r\nAT\rgarbage\r");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].output_text(),
            "AT+CSQ\r\r\n+CSQ: 15,99\r\n\r\nOK\r\n"
        );
        assert_eq!(outcomes[1].output_text(), "AT\r\r\nOK\r\n");
    }

    #[test]
    fn reset_input_drops_partial_line() {
        let mut d = dispatcher();
        assert!(d.feed(b"AT+CS").is_empty());
        d.reset_input();
        let outcomes = d.feed(b"AT\r");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].output_text(), "AT\r\r\nOK\r\n");
    }

    #[test]
    fn custom_framing() {
        let framing = Framing {
            termination: b'#',
            formatting: b'$',
            crc_separator: b'!',
        };
        let mut d = ServerDispatcher::with_framing(registry(), framing);
        let outcomes = d.feed(b"AT+CSQ#");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].output_text(),
            "AT+CSQ##$+CSQ: 15,99#$#$OK#$"
        );
    }

    #[test]
    fn registry_can_change_between_lines() {
        let mut d = dispatcher();
        assert_eq!(run(&mut d, "AT+NEW").code, AtErrorCode::Unregistered);
        d.registry_mut()
            .add_command(AtCommand::new("+NEW").run(|_| Reply::ok()));
        assert_eq!(run(&mut d, "AT+NEW").code, AtErrorCode::Ok);
    }

    #[test]
    fn numeric_suffix_split() {
        assert_eq!(split_numeric_suffix("I1"), Some(("I", "1")));
        assert_eq!(split_numeric_suffix("&F0"), Some(("&F", "0")));
        assert_eq!(split_numeric_suffix("I"), None);
        assert_eq!(split_numeric_suffix("12"), None);
    }
}
