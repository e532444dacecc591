//! Broadcast relay: every text message is forwarded to all other clients
//!
//! Run with: cargo run --example broadcast -- 127.0.0.1:8080
//!
//! Set `RUST_LOG=wsgate=debug` to watch connections come and go.

use tracing::info;
use tracing_subscriber::EnvFilter;
use wsgate::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let server = WebSocketServer::new(Config::default());

    server.on(EventKind::Connect, |event| {
        info!(conn = %event.connection(), "client joined");
        Ok(())
    });

    let relay = server.clone();
    server.on(EventKind::Message, move |event| {
        let Event::Message(from, msg) = event else {
            return Ok(());
        };
        if !msg.is_text() {
            return Err(HandlerError::new("only text messages are relayed"));
        }
        let delivered = relay.broadcast(|peer| peer.id() != *from, msg)?;
        info!(conn = %from, delivered, "relayed");
        Ok(())
    });

    let registry = server.registry();
    server.on(EventKind::Disconnect, move |event| {
        info!(conn = %event.connection(), remaining = registry.len(), "client left");
        Ok(())
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    server.serve(listener).await
}
