//! Modem emulator over TCP.
//!
//! Accepts connections on a local port and answers a handful of common
//! commands on each. Connect with any terminal (`nc localhost 2323`) or
//! point an `AtClient` at it through `TcpTransport`.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atcmd --example modem_emulator
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use atcmd::server::{AtCommand, AtServer, CommandRegistry, Reply, ServerDispatcher};
use atcmd::transport::TcpTransport;

fn registry() -> CommandRegistry {
    let signal = Arc::new(AtomicU8::new(15));
    let mut registry = CommandRegistry::new();

    registry.add_command(AtCommand::new("I").run(|rev| match rev {
        None | Some("0") => Reply::ok_with("atcmd modem emulator"),
        Some(_) => Reply::ok_with(format!("version {}", env!("CARGO_PKG_VERSION"))),
    }));
    registry.add_command(AtCommand::new("+CGMM").run(|_| Reply::ok_with("EMU-1")));
    registry.add_command(AtCommand::new("+CSQ").run({
        let signal = signal.clone();
        move |_| Reply::ok_with(format!("+CSQ: {},99", signal.load(Ordering::Relaxed)))
    }));
    registry.add_command(
        AtCommand::new("+XSIG")
            .test(|_| Reply::ok_with("+XSIG: (0-31)"))
            .write(move |value| match value.and_then(|v| v.parse::<u8>().ok()) {
                Some(v) if v <= 31 => {
                    signal.store(v, Ordering::Relaxed);
                    Reply::ok()
                }
                _ => Reply::error_with("+CME ERROR: 50"),
            }),
    );
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:2323").await?;
    println!("Listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                println!("{} connected", peer);
                let transport = TcpTransport::from_stream(stream, peer.to_string());
                let server = AtServer::new(Box::new(transport), ServerDispatcher::new(registry())).spawn();
                tokio::spawn(async move {
                    if let Err(e) = server.wait().await {
                        println!("{} disconnected: {}", peer, e);
                    }
                });
            }
        }
    }
    Ok(())
}
