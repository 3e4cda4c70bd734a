//! Transport implementations for atcmd.
//!
//! Concrete implementations of the [`Transport`](atcmd_core::Transport)
//! trait from `atcmd-core`:
//!
//! - [`SerialTransport`]: USB virtual COM ports and RS-232 serial connections
//! - [`TcpTransport`]: a modem's serial port exposed over TCP by a bridge

pub mod serial;
pub mod tcp;

pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpTransport;
