//! Shorts Shield - stdio host driver
//!
//! Runs the engine against a host speaking length-prefixed JSON over
//! stdin/stdout (the same framing the platform uses for native messaging
//! hosts). Host events flow in; command acknowledgements flow out. The
//! process exits when the host closes stdin.

use shorts_shield::types::{Ack, EngineError, HostEvent};
use shorts_shield::{Config, Engine};
use std::io::{Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Shorts Shield");

    // The collaborator owns the persisted preference and passes it on the
    // command line; the engine reads it exactly once.
    let enabled_preference = std::env::args().any(|a| a == "--enabled");

    let (event_tx, event_rx) = mpsc::channel::<HostEvent>(100);
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();

    let mut engine = Engine::new(config);
    engine.startup(enabled_preference);

    // Blocking stdin reader; the channel closing on EOF ends the engine loop
    std::thread::spawn(move || {
        read_host_events(event_tx);
    });

    // Ack writer
    tokio::spawn(async move {
        while let Some(ack) = ack_rx.recv().await {
            if let Err(e) = write_message(&ack) {
                warn!("Failed to write acknowledgement: {}", e);
                break;
            }
        }
    });

    if let Err(e) = engine.run(event_rx, ack_tx).await {
        error!("Engine loop failed: {}", e);
        return Err(e.into());
    }

    info!("Host disconnected, exiting");
    Ok(())
}

/// Read length-prefixed JSON host events from stdin until EOF
fn read_host_events(tx: mpsc::Sender<HostEvent>) {
    loop {
        match read_message() {
            Ok(event) => {
                if tx.blocking_send(event).is_err() {
                    debug!("Engine gone, stopping stdin reader");
                    break;
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    debug!("Host closed stdin");
                } else {
                    error!("Error reading host event: {}", e);
                }
                break;
            }
        }
    }
}

/// Read one message: 4-byte little-endian length prefix, then JSON
fn read_message() -> std::io::Result<HostEvent> {
    let mut len_bytes = [0u8; 4];
    std::io::stdin().read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > 1024 * 1024 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buffer = vec![0u8; len];
    std::io::stdin().read_exact(&mut buffer)?;

    serde_json::from_slice(&buffer).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            EngineError::MalformedEvent(e.to_string()).to_string(),
        )
    })
}

/// Write one length-prefixed JSON message to stdout
fn write_message(ack: &Ack) -> std::io::Result<()> {
    let json = serde_json::to_vec(ack)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let len = (json.len() as u32).to_le_bytes();

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&len)?;
    stdout.write_all(&json)?;
    stdout.flush()
}
