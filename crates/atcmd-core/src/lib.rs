//! atcmd-core: Core types, error definitions, and the transport trait.
//!
//! This crate defines the pieces shared by both roles of the AT command
//! stack: the client talking to a modem and the server emulating one.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`AtErrorCode`] -- outcome of a command cycle
//! - [`ModeFlags`] / [`Framing`] -- per-connection protocol settings
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
