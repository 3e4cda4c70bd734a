//! Modem side of the AT command protocol.
//!
//! Register commands in a [`CommandRegistry`], wrap it in a
//! [`ServerDispatcher`] and serve it over any transport with [`AtServer`].
//! The dispatcher handles echo, verbose/numeric result codes and checksums
//! itself; handlers only produce information text and success.
//!
//! ```no_run
//! use atcmd_server::{AtCommand, AtServer, CommandRegistry, Reply, ServerDispatcher};
//! use atcmd_transport::SerialTransport;
//!
//! # async fn example() -> atcmd_core::Result<()> {
//! let mut registry = CommandRegistry::new();
//! registry.add_command(AtCommand::new("+CSQ").run(|_| Reply::ok_with("+CSQ: 15,99")));
//! registry.add_command(AtCommand::new("I").run(|_| Reply::ok_with("ACME Modem")));
//!
//! let transport = SerialTransport::open("/dev/ttyGS0", 115_200).await?;
//! let server = AtServer::new(Box::new(transport), ServerDispatcher::new(registry)).spawn();
//! // ...
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod registry;
pub mod server;

pub use dispatch::{DispatchOutcome, ServerDispatcher};
pub use registry::{AtCommand, CommandRegistry, DataTransfer, Handler, Reply};
pub use server::{AtServer, ServerHandle};
