// atcmd command-line tool -- talk to an AT modem, watch its unsolicited
// result codes, or emulate a minimal modem on a serial port.
//
// Usage:
//   atcmd-cli --port /dev/ttyUSB0 send ATI AT+CSQ
//   atcmd-cli --port /dev/ttyUSB0 --crc send AT+CGMI
//   atcmd-cli --tcp 192.168.1.50:4001 send --prefix +CSQ: AT+CSQ
//   atcmd-cli --port /dev/ttyUSB0 urc --duration 60
//   atcmd-cli --port /dev/ttyGS0 serve --model EMU-1
//   atcmd-cli crc AT%CRC=0
//
// The port and baud rate may also come from SERIAL_PORT and BAUDRATE.
// Set RUST_LOG=debug to see every state transition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use atcmd::client::{AtClient, AtClientBuilder};
use atcmd::protocol::Crc16Codec;
use atcmd::server::{AtCommand, AtServer, CommandRegistry, Reply, ServerDispatcher};
use atcmd::transport::{SerialTransport, TcpTransport};
use atcmd::{AtErrorCode, Transport};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// atcmd command-line tool -- AT commands from either end of the line.
#[derive(Parser)]
#[command(name = "atcmd-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, env = "SERIAL_PORT")]
    port: Option<String>,

    /// Baud rate for --port.
    #[arg(long, env = "BAUDRATE", default_value_t = 9600)]
    baud: u32,

    /// Reach the modem through a TCP serial bridge (host:port) instead of
    /// a local port.
    #[arg(long, conflicts_with = "port")]
    tcp: Option<String>,

    /// Per-command timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Start with line checksums enabled.
    #[arg(long)]
    crc: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one or more commands and print each reply.
    Send {
        /// Commands to send, in order (e.g. ATI AT+CSQ).
        #[arg(required = true)]
        commands: Vec<String>,

        /// Strip this prefix from each reply line (e.g. +CSQ:).
        #[arg(long)]
        prefix: Option<String>,

        /// Print replies exactly as received, framing included.
        #[arg(long)]
        raw: bool,

        /// Probe with AT first and give up if the modem does not answer.
        #[arg(long)]
        wait_ready: bool,
    },

    /// Print unsolicited result codes as they arrive.
    Urc {
        /// Stop after this many seconds (default: run until Ctrl-C).
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Emulate a minimal modem until Ctrl-C.
    Serve {
        /// Model string reported by ATI and AT+CGMM.
        #[arg(long, default_value = "atcmd emulator")]
        model: String,
    },

    /// Print a line with its checksum suffix.
    Crc {
        /// Text to checksum (e.g. AT%CRC=0).
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

async fn open_transport(cli: &Cli) -> Result<Box<dyn Transport>> {
    if let Some(addr) = &cli.tcp {
        let transport = TcpTransport::connect(addr)
            .await
            .with_context(|| format!("connecting to {addr}"))?;
        return Ok(Box::new(transport));
    }
    let Some(port) = &cli.port else {
        bail!("no modem given: pass --port (or SERIAL_PORT) or --tcp");
    };
    let transport = SerialTransport::open(port, cli.baud)
        .await
        .with_context(|| format!("opening {port} at {} baud", cli.baud))?;
    Ok(Box::new(transport))
}

async fn open_client(cli: &Cli) -> Result<AtClient> {
    let transport = open_transport(cli).await?;
    let client = AtClientBuilder::new()
        .command_timeout(Duration::from_millis(cli.timeout_ms))
        .crc(cli.crc)
        .build_with_transport(transport)?;
    Ok(client)
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_send(
    client: &AtClient,
    commands: &[String],
    prefix: Option<&str>,
    raw: bool,
    wait_ready: bool,
) -> Result<()> {
    if wait_ready && !client.wait_ready(Duration::from_secs(5)).await? {
        bail!("modem did not answer AT");
    }

    let mut failed = 0usize;
    for command in commands {
        let started = Instant::now();
        let code = client.send_at_command(command).await?;
        let elapsed = started.elapsed();

        if code.is_ok() {
            let reply = if raw {
                format!("{:?}", client.get_raw_response().await)
            } else {
                client.get_response(prefix).await
            };
            println!("{command}: OK ({} ms)", elapsed.as_millis());
            for line in reply.lines() {
                println!("  {line}");
            }
        } else {
            failed += 1;
            match code.extended_detail() {
                Some(detail) => println!("{command}: {code} -- {detail}"),
                None => println!("{command}: {code}"),
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} commands failed", commands.len());
    }
    Ok(())
}

async fn cmd_urc(client: &AtClient, duration: Option<u64>) -> Result<()> {
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    println!("Watching for unsolicited result codes (Ctrl-C to stop)...");

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            result = client.check_urc(None) => match result? {
                Some(AtErrorCode::Ok) => println!("{}", client.get_response(None).await),
                Some(code) => println!("(incomplete line: {code})"),
                None => tokio::time::sleep(Duration::from_millis(50)).await,
            },
        }
    }
}

fn emulator_registry(model: &str) -> CommandRegistry {
    let model: Arc<str> = Arc::from(model);
    let mut registry = CommandRegistry::new();

    registry.add_command(AtCommand::new("I").run({
        let model = model.clone();
        move |rev| match rev {
            None | Some("0") => Reply::ok_with(model.to_string()),
            Some(_) => Reply::ok_with(format!("atcmd {}", env!("CARGO_PKG_VERSION"))),
        }
    }));
    registry.add_command(AtCommand::new("+CGMI").run(|_| Reply::ok_with("atcmd")));
    registry.add_command(
        AtCommand::new("+CGMM")
            .run(move |_| Reply::ok_with(model.to_string()))
            .test(|_| Reply::ok()),
    );
    registry.add_command(
        AtCommand::new("+CSQ")
            .run(|_| Reply::ok_with("+CSQ: 20,99"))
            .test(|_| Reply::ok_with("+CSQ: (0-31,99),(0-7,99)")),
    );
    registry.add_command(AtCommand::new("Z").run(|_| Reply::ok()));
    registry
}

async fn cmd_serve(cli: &Cli, model: &str) -> Result<()> {
    let transport = open_transport(cli).await?;
    let dispatcher = ServerDispatcher::new(emulator_registry(model));
    info!(commands = ?dispatcher.registry().names(), "emulating modem");

    let server = AtServer::new(transport, dispatcher).spawn();
    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut transport = server.wait().await.context("modem emulator stopped")?;
    transport.close().await?;
    Ok(())
}

fn cmd_crc(text: &str) {
    let line = Crc16Codec::default().append(text.as_bytes());
    println!("{}", String::from_utf8_lossy(&line));
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Crc { text } => {
            cmd_crc(text);
            Ok(())
        }
        Command::Serve { model } => cmd_serve(&cli, model).await,
        Command::Send {
            commands,
            prefix,
            raw,
            wait_ready,
        } => {
            let client = open_client(&cli).await?;
            let result = cmd_send(&client, commands, prefix.as_deref(), *raw, *wait_ready).await;
            client.close().await.ok();
            result
        }
        Command::Urc { duration } => {
            let client = open_client(&cli).await?;
            let result = cmd_urc(&client, *duration).await;
            client.close().await.ok();
            result
        }
    }
}
