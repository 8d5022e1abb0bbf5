pub mod auth;
pub mod config;
pub mod registry;
pub mod router;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::SharedAuthenticator;
use crate::config::ServerConfig;
use crate::registry::RoomRegistry;

pub struct Server {
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    auth: SharedAuthenticator,
}

impl Server {
    pub async fn bind(cfg: &ServerConfig, auth: SharedAuthenticator) -> Result<Self> {
        let listener = TcpListener::bind(cfg.listen_addr).await?;
        Ok(Self {
            listener,
            registry: Arc::new(RoomRegistry::new()),
            auth,
        })
    }

    /// The actual bound address; useful when `listen_addr` used port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept loop: one independent handler task per connection. A
    /// handler's failure never takes the server down.
    pub async fn run(self) -> Result<()> {
        info!("listening on {}", self.listener.local_addr()?);
        loop {
            let (socket, addr) = self.listener.accept().await?;
            info!("peer connected: {addr}");
            let registry = Arc::clone(&self.registry);
            let auth = Arc::clone(&self.auth);
            tokio::spawn(async move {
                if let Err(e) = router::serve_connection(socket, addr, registry, auth).await {
                    error!("connection error from {addr}: {e}");
                }
                info!("peer disconnected: {addr}");
            });
        }
    }
}
