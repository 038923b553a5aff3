//! Listener pool: local-side `associate_local` listening sockets.
//!
//! Each bound rule gets its own spawned accept-loop task, all parented to
//! one pool-wide cancellation token that is fired once at teardown and
//! stops every task together. Every accepted connection emits one
//! `CONNECT`, with ids drawn from the shared allocator.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::forwarder::Forwarder;
use super::target::Target;

pub struct ListenerPool {
    cancellation: CancellationToken,
}

impl ListenerPool {
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
        }
    }

    /// Fire every accept loop's cancellation at once.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    /// Bind `bind_address:port` and spawn its accept loop. Each accepted
    /// connection is handed to `forwarder` as a new outbound-origin
    /// `Connection`, which allocates its id and emits `CONNECT`.
    pub async fn bind(
        &self,
        bind_address: &str,
        port: u16,
        target: Target,
        forwarder: Forwarder,
    ) -> std::io::Result<()> {
        let addr = format!("{bind_address}:{port}");
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, host = %target.host, host_port = target.port, "local listener bound");

        let token = self.cancellation.child_token();
        tokio::spawn(Self::accept_loop(listener, token, target, forwarder));
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        token: CancellationToken,
        target: Target,
        forwarder: Forwarder,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                r = listener.accept() => r,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, target = %target.addr_string(), "local connection accepted");
                    forwarder.spawn_outbound_connection(stream, target.clone());
                }
                Err(e) => {
                    warn!(error = %e, "local accept failed");
                }
            }
        }
        debug!("listener accept loop stopped");
    }
}

impl Default for ListenerPool {
    fn default() -> Self {
        Self::new()
    }
}
