//! Scripted modem transport for deterministic engine tests.
//!
//! [`MockTransport`] implements [`Transport`] with pre-loaded
//! request/response pairs. Each `send()` is matched against the next
//! expectation and queues its response for `receive()`. Bytes can also be
//! injected at any time to simulate unsolicited result codes.
//!
//! The transport is a cheap handle: clones share the same state, so a test
//! can keep one clone for inspection after moving another into an engine.
//!
//! # Example
//!
//! ```
//! use atcmd_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.expect(b"AT+CSQ\r", b"AT+CSQ\r\r\n+CSQ: 15,99\r\n\r\nOK\r\n");
//! mock.inject(b"\r\nRING\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use atcmd_core::error::{Error, Result};
use atcmd_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be read.
    rx: VecDeque<u8>,
    /// Queued bytes become readable at this instant.
    ready_at: Option<Instant>,
    delay: Duration,
    chunk_size: Option<usize>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
    flushes: usize,
}

/// A mock [`Transport`] standing in for a modem.
///
/// Expectations are consumed in order. A `send()` that does not match the
/// next expectation, or arrives with none left, fails with
/// [`Error::Protocol`]. `receive()` with nothing queued waits for the full
/// timeout and returns [`Error::Timeout`], or returns early if bytes are
/// injected meanwhile.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(Inner {
                expectations: VecDeque::new(),
                rx: VecDeque::new(),
                ready_at: None,
                delay: Duration::ZERO,
                chunk_size: None,
                connected: true,
                sent_log: Vec::new(),
                flushes: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread is the only way to poison this lock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request/response pair.
    ///
    /// An empty response models a modem that stays silent.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes for `receive()` without a preceding request.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
        self.notify.notify_waiters();
    }

    /// Hold back each scripted response for `delay` after its request.
    pub fn set_response_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Return at most `size` bytes per `receive()` call.
    pub fn set_chunk_size(&self, size: usize) {
        self.lock().chunk_size = Some(size.max(1));
    }

    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// Every `send()` payload rendered as text, in order.
    pub fn sent_text(&self) -> Vec<String> {
        self.lock()
            .sent_log
            .iter()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    /// Number of `flush()` calls so far.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Bytes queued but not yet read.
    pub fn unread_len(&self) -> usize {
        self.lock().rx.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
        self.notify.notify_waiters();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        inner.sent_log.push(data.to_vec());

        let Some(expectation) = inner.expectations.pop_front() else {
            return Err(Error::Protocol(format!(
                "no more expectations in mock transport, got {:?}",
                String::from_utf8_lossy(data)
            )));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        inner.rx.extend(expectation.response);
        inner.ready_at = Some(Instant::now() + inner.delay);
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        inner.flushes += 1;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking state so an inject between
            // the check and the wait is not missed.
            let notified = self.notify.notified();
            let wake_at = {
                let mut inner = self.lock();
                if !inner.connected {
                    return Err(Error::NotConnected);
                }
                let now = Instant::now();
                let ready_at = inner.ready_at;
                match ready_at {
                    Some(at) if at > now && !inner.rx.is_empty() => at.min(deadline),
                    _ if !inner.rx.is_empty() => {
                        let limit = inner.chunk_size.unwrap_or(usize::MAX);
                        let n = inner.rx.len().min(buf.len()).min(limit);
                        for (slot, b) in buf.iter_mut().zip(inner.rx.drain(..n)) {
                            *slot = b;
                        }
                        return Ok(n);
                    }
                    _ => deadline,
                }
            };
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::select! {
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = notified => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.rx.clear();
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}
