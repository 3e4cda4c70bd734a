//! AtClientBuilder -- fluent builder for [`AtClient`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! framing characters, timeouts and the serial port before the transport
//! is opened.
//!
//! # Example
//!
//! ```no_run
//! use atcmd_client::AtClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> atcmd_core::Result<()> {
//! let client = AtClientBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(115_200)
//!     .command_timeout(Duration::from_millis(500))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use atcmd_core::error::{Error, Result};
use atcmd_core::transport::Transport;
use atcmd_core::types::ModeFlags;

use crate::client::{AtClient, ClientConfig};

/// Baud rate used when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Fluent builder for [`AtClient`].
#[derive(Debug, Clone, Default)]
pub struct AtClientBuilder {
    config: ClientConfig,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
}

impl AtClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate (9600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Command line termination character, V.25 S3 (default `\r`).
    pub fn termination(mut self, c: u8) -> Self {
        self.config.framing.termination = c;
        self
    }

    /// Response formatting character, V.25 S4 (default `\n`).
    pub fn formatting(mut self, c: u8) -> Self {
        self.config.framing.formatting = c;
        self
    }

    /// Character separating a line from its checksum (default `*`).
    pub fn crc_separator(mut self, c: u8) -> Self {
        self.config.framing.crc_separator = c;
        self
    }

    /// Default deadline for a command cycle (default 1s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Deadline for completing an unsolicited line (default 1s).
    pub fn urc_timeout(mut self, timeout: Duration) -> Self {
        self.config.urc_timeout = timeout;
        self
    }

    /// Initial assumption about the device's modes.
    pub fn modes(mut self, modes: ModeFlags) -> Self {
        self.config.modes = modes;
        self
    }

    /// Start with checksums on or off.
    pub fn crc(mut self, enabled: bool) -> Self {
        self.config.modes.crc_enabled = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        let f = self.config.framing;
        if f.termination == f.formatting
            || f.crc_separator == f.termination
            || f.crc_separator == f.formatting
        {
            return Err(Error::InvalidParameter(
                "termination, formatting and crc separator must differ".into(),
            ));
        }
        if self.config.command_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "command_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Build an [`AtClient`] with a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `atcmd-test-harness`) and for links other than a local serial port.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<AtClient> {
        self.validate()?;
        Ok(AtClient::new(transport, self.config))
    }

    /// Build an [`AtClient`] on a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<AtClient> {
        self.validate()?;
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

        let transport = atcmd_transport::SerialTransport::open(port, baud).await?;
        self.build_with_transport(Box::new(transport))
    }
}
