//! # atcmd -- V.25 AT Commands for Async Rust
//!
//! `atcmd` speaks the Hayes/V.25 AT command protocol from either end of a
//! serial line. Use the client to drive a cellular modem, GNSS receiver or
//! any other AT-controlled device; use the server to build a device (or a
//! test double of one) that answers AT commands.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! atcmd = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Query signal quality from a modem:
//!
//! ```no_run
//! use atcmd::client::AtClientBuilder;
//! use atcmd::AtErrorCode;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AtClientBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .baud_rate(115_200)
//!         .build()
//!         .await?;
//!
//!     match client.send_at_command("AT+CSQ").await? {
//!         AtErrorCode::Ok => println!("{}", client.get_response(Some("+CSQ:")).await),
//!         code => println!("modem said {code}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `atcmd-core`          | [`Transport`] trait, [`AtErrorCode`], modes, errors |
//! | `atcmd-protocol`      | Line assembly, CCITT-16 checksums, V.25 grammar  |
//! | `atcmd-transport`     | Serial and TCP transports                        |
//! | `atcmd-client`        | Command cycles, URC detection, data mode         |
//! | `atcmd-server`        | Command registry, dispatcher, serve loop         |
//! | **`atcmd`**           | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                               | Default |
//! |----------|---------------------------------------|---------|
//! | `client` | [`client`] module (host side)         | yes     |
//! | `server` | [`server`] module (modem side)        | yes     |
//!
//! ## Modes
//!
//! Both sides track the same three per-connection flags ([`ModeFlags`]):
//! echo (`ATE`), verbose result codes (`ATV`) and line checksums
//! (`AT+CRC` / `AT%CRC`). The server changes them when it executes those
//! commands; the client follows what the device confirms, and also
//! detects echo and verbosity from the replies themselves.

pub use atcmd_core::*;

/// Line framing, checksums and result code grammar.
pub mod protocol {
    pub use atcmd_protocol::*;
}

/// Serial and TCP transports.
pub mod transport {
    pub use atcmd_transport::*;
}

/// Host side: [`AtClient`](client::AtClient) and
/// [`AtClientBuilder`](client::AtClientBuilder).
///
/// One command is in flight at a time; concurrent callers queue in
/// arrival order. The payload of the last successful command stays
/// available until read with
/// [`get_response`](client::AtClient::get_response).
#[cfg(feature = "client")]
pub mod client {
    pub use atcmd_client::*;
}

/// Modem side: [`CommandRegistry`](server::CommandRegistry),
/// [`ServerDispatcher`](server::ServerDispatcher) and
/// [`AtServer`](server::AtServer).
#[cfg(feature = "server")]
pub mod server {
    pub use atcmd_server::*;
}
