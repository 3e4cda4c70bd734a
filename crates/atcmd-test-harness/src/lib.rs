//! atcmd-test-harness: Test transports for atcmd.
//!
//! [`MockTransport`] plays a scripted modem for deterministic unit tests of
//! the client engine. [`DuplexTransport`] connects two engines in memory so
//! a client can be tested against a real server dispatcher.

pub mod duplex;
pub mod mock_serial;

pub use duplex::DuplexTransport;
pub use mock_serial::MockTransport;
