//! Canopy display server
//!
//! A software-composited display server: clients connect over a Unix
//! socket, register windows backed by shared-memory framebuffers, and ask
//! the server to composite regions of them onto the screen bitmap.

mod config;
mod server;

use anyhow::{Context, Result};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy_gfx::Color;
use canopy_ipc::protocol::Message;
use canopy_ipc::transport::{read_frame, TransportError};
use server::{ClientId, Manager, ServerEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "canopy=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Canopy display server");

    let config = config::Config::load().context("Failed to load configuration")?;
    let socket_path = config.socket_path();

    // A stale socket from a previous run would make bind fail
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("Failed to remove stale socket {:?}", socket_path))?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {:?}", socket_path))?;
    info!("Listening on {:?}", socket_path);

    let mut manager = Manager::new(
        config.display.width,
        config.display.height,
        Color::from_hex(config.display.background),
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut next_client_id: ClientId = 1;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let id = next_client_id;
                        next_client_id += 1;

                        let outbound = spawn_client(id, stream, event_tx.clone());
                        manager.accept(id, outbound);
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            event = event_rx.recv() => {
                // Senders include our own event_tx, so recv never yields None here
                match event {
                    Some(ServerEvent::Message(client, message)) => {
                        manager.on_message(client, message);
                    }
                    Some(ServerEvent::Disconnected(client)) => {
                        manager.on_disconnect(client);
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
        }
    }

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Failed to remove socket {:?}: {}", socket_path, e);
    }
    info!("Canopy display server stopped");
    Ok(())
}

/// Spawn the reader and writer tasks for one connection, returning the
/// sender the manager uses to queue outbound bytes.
fn spawn_client(
    id: ClientId,
    stream: UnixStream,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> mpsc::UnboundedSender<Vec<u8>> {
    info!("Accepted connection as client {}", id);

    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(write_loop(id, writer, outbound_rx));
    tokio::spawn(async move {
        read_loop(id, reader, &events).await;
        // The dispatch loop outlives every reader task
        let _ = events.send(ServerEvent::Disconnected(id));
    });

    outbound_tx
}

/// Forward decoded messages to the dispatch loop until the connection
/// ends. Messages that fail to decode are logged and skipped; transport
/// failures end the connection.
async fn read_loop(
    id: ClientId,
    mut reader: impl tokio::io::AsyncRead + Unpin,
    events: &mpsc::UnboundedSender<ServerEvent>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(None) => {
                debug!("Client {} closed the connection", id);
                return;
            }
            Ok(Some(frame)) => match Message::decode(&frame) {
                Ok(message) => {
                    if events.send(ServerEvent::Message(id, message)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Client {}: dropping malformed message: {}", id, e);
                }
            },
            Err(TransportError::FrameTooLarge(size)) => {
                warn!("Client {}: oversized frame of {} bytes, disconnecting", id, size);
                return;
            }
            Err(e) => {
                warn!("Client {}: read failed: {}", id, e);
                return;
            }
        }
    }
}

/// Drain queued outbound bytes onto the socket
async fn write_loop(id: ClientId, mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    use tokio::io::AsyncWriteExt;

    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("Client {}: write failed: {}", id, e);
            return;
        }
    }
}
