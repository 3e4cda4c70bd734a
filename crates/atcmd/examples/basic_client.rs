//! Basic modem query example.
//!
//! Waits for the modem to answer, reads its identification and signal
//! quality, then watches for unsolicited result codes for a few seconds.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=debug cargo run -p atcmd --example basic_client -- /dev/ttyUSB0
//! ```

use std::time::Duration;

use atcmd::client::AtClientBuilder;
use atcmd::AtErrorCode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let serial_port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    println!("Opening {}...", serial_port);

    let client = AtClientBuilder::new()
        .serial_port(&serial_port)
        .baud_rate(115_200)
        .command_timeout(Duration::from_millis(500))
        .build()
        .await?;

    if !client.wait_ready(Duration::from_secs(5)).await? {
        anyhow::bail!("modem did not answer AT");
    }

    for command in ["ATI", "AT+CGMM", "AT+CSQ"] {
        match client.send_at_command(command).await? {
            AtErrorCode::Ok => println!("{:<8} {}", command, client.get_response(None).await),
            code => println!("{:<8} failed: {}", command, code),
        }
    }

    println!("Watching for unsolicited codes for 10 seconds...");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if let Some(urc) = client.get_urc().await? {
            println!("URC: {}", urc);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    client.close().await?;
    Ok(())
}
