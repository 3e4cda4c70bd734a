//! In-memory serial link for end-to-end tests.
//!
//! [`DuplexTransport::pair`] returns two connected transports; bytes sent
//! on one are received on the other. Use it to run a client engine against
//! a server dispatcher without hardware.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use atcmd_core::error::{Error, Result};
use atcmd_core::transport::Transport;

const LINK_BUFFER: usize = 4096;

/// One end of an in-memory byte link.
#[derive(Debug)]
pub struct DuplexTransport {
    stream: Option<DuplexStream>,
}

impl DuplexTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(LINK_BUFFER);
        (Self { stream: Some(a) }, Self { stream: Some(b) })
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(data).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => Error::ConnectionLost,
            _ => Error::Io(e),
        })
    }

    async fn flush(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.flush().await.map_err(Error::Io)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match tokio::time::timeout(timeout, stream.read(buf)).await {
            // The other end was dropped.
            Ok(Ok(0)) => Err(Error::ConnectionLost),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_cross_the_link() {
        let (mut host, mut device) = DuplexTransport::pair();
        host.send(b"AT\r").await.unwrap();
        host.flush().await.unwrap();

        let mut buf = [0u8; 16];
        let n = device
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"AT\r");
    }

    #[tokio::test]
    async fn idle_link_times_out() {
        let (mut host, _device) = DuplexTransport::pair();
        let mut buf = [0u8; 16];
        let result = host.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(host.receive_available(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_peer_is_connection_lost() {
        let (mut host, device) = DuplexTransport::pair();
        drop(device);
        let mut buf = [0u8; 16];
        let result = host.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn closed_end_is_not_connected() {
        let (mut host, _device) = DuplexTransport::pair();
        host.close().await.unwrap();
        assert!(!host.is_connected());
        assert!(matches!(host.send(b"AT\r").await, Err(Error::NotConnected)));
    }
}
