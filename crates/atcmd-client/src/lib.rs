//! atcmd-client: Host-side AT command engine.
//!
//! [`AtClient`] sends one command at a time over a
//! [`Transport`](atcmd_core::Transport), runs the echo / response / checksum
//! state machine in [`engine`], and keeps the last successful payload until
//! it is retrieved. Between commands, [`AtClient::check_urc`] picks up
//! unsolicited lines.
//!
//! # Example
//!
//! ```no_run
//! use atcmd_client::AtClientBuilder;
//! use atcmd_core::AtErrorCode;
//!
//! # async fn example() -> atcmd_core::Result<()> {
//! let client = AtClientBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .build()
//!     .await?;
//!
//! if client.send_at_command("AT+CSQ").await? == AtErrorCode::Ok {
//!     println!("signal: {}", client.get_response(Some("+CSQ:")).await);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod engine;
pub mod urc;

pub use builder::AtClientBuilder;
pub use client::{AtClient, ClientConfig, DataMode};
pub use engine::{CommandCycle, CycleResult, ParseState, Payload};
