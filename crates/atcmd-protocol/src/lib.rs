//! atcmd-protocol: Wire-level building blocks for V.25 AT command links.
//!
//! - [`LineAssembler`] -- splits a byte stream into lines by S3/S4 framing
//! - [`Crc16Codec`] -- CCITT-16 checksum suffixes
//! - [`ResultCode`] / [`split_subcommands`] / [`parse_mode_command`] --
//!   result codes and command line grammar

pub mod crc;
pub mod line;
pub mod protocol;

pub use crc::{crc16, Crc16Codec};
pub use line::{Boundary, Line, LineAssembler};
pub use protocol::{
    classify, mode_commands_in, parse_mode_command, split_subcommands, strip_at_prefix,
    ModeCommand, Operation, ResultCode,
};
