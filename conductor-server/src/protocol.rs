//! TCP accept loop for player connections.

use crate::server::Conductor;
use crate::session::Session;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept player connections until the conductor shuts down.
///
/// Connections beyond `limits.max_players` are dropped immediately.
pub async fn serve(conductor: Arc<Conductor>, listener: TcpListener) -> std::io::Result<()> {
    let mut shutdown = conductor.shutdown_signal();
    tracing::info!("Conductor listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            },
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        };

        let max_players = conductor.config().limits.max_players;
        if conductor.connection_count() >= max_players {
            tracing::warn!(
                "Player limit reached ({}/{}), rejecting {}",
                conductor.connection_count(),
                max_players,
                peer
            );
            conductor
                .metrics()
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            continue;
        }

        conductor
            .metrics()
            .connections_total
            .fetch_add(1, Ordering::Relaxed);
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }

        let session = Session::new(conductor.clone(), stream, peer.to_string());
        // Spawn session handler - don't block the accept loop
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                tracing::debug!("Session with {} ended: {}", peer, e);
            }
        });
    }

    tracing::info!("Accept loop stopped");
    Ok(())
}

/// Bind `bind_address` and run [`serve`] in the background.
///
/// Returns the bound address (useful with port 0) and the accept task.
pub async fn listen(
    conductor: Arc<Conductor>,
    bind_address: &str,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(bind_address).await?;
    let local = listener.local_addr()?;
    Ok((local, tokio::spawn(serve(conductor, listener))))
}
