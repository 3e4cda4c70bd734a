//! Error types for atcmd.
//!
//! Fallible operations across the workspace return [`Result<T>`], which uses
//! [`Error`] as the error type. Only failures of the link itself land here:
//! protocol outcomes such as a modem `ERROR` or a command timeout are
//! reported as [`AtErrorCode`](crate::types::AtErrorCode) values instead.

/// The error type for all atcmd operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected bytes from a mock, bad framing).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for bytes on the transport.
    ///
    /// Transports return this from `receive()` when the deadline passes with
    /// nothing read. The engines translate it into
    /// [`AtErrorCode::Timeout`](crate::types::AtErrorCode::Timeout).
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to an API call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection has been established, or it was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("unexpected write".into());
        assert_eq!(e.to_string(), "protocol error: unexpected write");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("empty command".into());
        assert_eq!(e.to_string(), "invalid parameter: empty command");
    }

    #[test]
    fn error_display_connection_states() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
