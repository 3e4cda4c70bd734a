//! AtServer -- runs a [`ServerDispatcher`] over a transport.
//!
//! One task owns the transport. It reads whatever arrives, hands it to the
//! dispatcher, writes each reply and then runs any data transfers the
//! handlers attached, before reading the next command line.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atcmd_core::error::{Error, Result};
use atcmd_core::transport::Transport;

use crate::dispatch::{DispatchOutcome, ServerDispatcher};

/// How long one receive waits before the loop checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

/// Modem emulator bound to one transport.
pub struct AtServer {
    transport: Box<dyn Transport>,
    dispatcher: ServerDispatcher,
}

impl AtServer {
    pub fn new(transport: Box<dyn Transport>, dispatcher: ServerDispatcher) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &ServerDispatcher {
        &self.dispatcher
    }

    /// Serve until `cancel` fires, then hand the transport back.
    ///
    /// Cancellation is honoured while waiting for input and between
    /// replies; a reply or data transfer already under way is finished
    /// first. Fails if the transport fails; a peer hanging up shows up as
    /// [`Error::ConnectionLost`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Box<dyn Transport>> {
        info!("AT server started");
        let mut buf = [0u8; READ_CHUNK];

        'serve: loop {
            let received = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("AT server cancelled");
                    break;
                }

                result = self.transport.receive(&mut buf, POLL_INTERVAL) => result,
            };
            let n = match received {
                Ok(n) => n,
                Err(Error::Timeout) => continue,
                Err(e) => {
                    warn!(error = %e, "AT server stopped");
                    return Err(e);
                }
            };

            for outcome in self.dispatcher.feed(&buf[..n]) {
                if cancel.is_cancelled() {
                    debug!(code = %outcome.code, "AT server cancelled, reply not sent");
                    break 'serve;
                }
                if let Err(e) = reply(&mut self.transport, &mut self.dispatcher, outcome).await {
                    warn!(error = %e, "AT server stopped");
                    return Err(e);
                }
            }
        }

        info!("AT server stopped");
        Ok(self.transport)
    }

    /// Run on a spawned task. The returned handle stops it.
    pub fn spawn(self) -> ServerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        ServerHandle { cancel, task }
    }
}

/// Write one reply and run the transfers attached to it.
async fn reply(
    transport: &mut Box<dyn Transport>,
    dispatcher: &mut ServerDispatcher,
    outcome: DispatchOutcome,
) -> Result<()> {
    debug!(code = %outcome.code, "command handled");
    transport.send(&outcome.output).await?;
    transport.flush().await?;

    if outcome.transfers.is_empty() {
        return Ok(());
    }
    for transfer in outcome.transfers {
        debug!("running data transfer");
        match transfer.run(&mut **transport).await {
            Ok(()) => {}
            Err(e @ (Error::ConnectionLost | Error::NotConnected)) => return Err(e),
            Err(e) => warn!(error = %e, "data transfer failed"),
        }
    }
    // Bytes read during the transfer were data, not commands.
    dispatcher.reset_input();
    Ok(())
}

/// Handle to a spawned [`AtServer`].
pub struct ServerHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<Box<dyn Transport>>>,
}

impl ServerHandle {
    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `true` once the server task has exited, by cancellation or error.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the server and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the server to exit on its own.
    pub async fn wait(self) -> Result<Box<dyn Transport>> {
        self.task
            .await
            .map_err(|e| Error::Transport(format!("server task failed: {e}")))?
    }
}
