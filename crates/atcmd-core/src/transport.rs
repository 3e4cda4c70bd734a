//! Transport trait for the serial link to a modem or host.
//!
//! The [`Transport`] trait abstracts over the physical byte stream. The
//! client engine and the server loop operate on a `Transport` rather than a
//! serial port directly, so the same code drives real hardware, a TCP
//! bridge to a remote serial port, or the mock transports in
//! `atcmd-test-harness`.
//!
//! A transport serves exactly one reader and one writer. Multiplexing
//! several logical streams over one port is not supported.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Asynchronous byte-level transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` to the link.
    ///
    /// Returning does not guarantee the bytes have left the hardware
    /// buffer; call [`flush`](Transport::flush) for that.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Block until every byte previously passed to `send()` has been
    /// handed to the hardware.
    async fn flush(&mut self) -> Result<()>;

    /// Receive bytes into `buf`.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data
    /// to arrive; returns [`Error::Timeout`] if nothing is received within
    /// the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Read whatever is already buffered without waiting.
    ///
    /// Returns `Ok(0)` when nothing is available. The default implementation
    /// polls [`receive`](Transport::receive) with a zero timeout.
    async fn receive_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.receive(buf, Duration::ZERO).await {
            Ok(n) => Ok(n),
            Err(Error::Timeout) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Close the link.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`].
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
