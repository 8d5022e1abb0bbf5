use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use shared::codec;
use shared::protocol::Message;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Cap on a single frame write; a stalled peer must not hold a
/// handler hostage beyond this.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Write side of one connected peer. The read half stays with the
/// per-connection handler loop; every other task reaches the peer
/// through this handle.
pub struct PeerHandle {
    addr: SocketAddr,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl PeerHandle {
    pub fn new(addr: SocketAddr, writer: impl AsyncWrite + Send + Unpin + 'static) -> Arc<Self> {
        Arc::new(Self {
            addr,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
        })
    }

    /// Serialize and write one frame, bounded by `SEND_TIMEOUT`.
    pub async fn send(&self, msg: &Message) -> Result<()> {
        let bytes = codec::encode_line(msg)?;
        let mut guard = self.writer.lock().await;
        tokio::time::timeout(SEND_TIMEOUT, guard.write_all(&bytes))
            .await
            .map_err(|_| anyhow::anyhow!("send to {} timed out", self.addr))??;
        Ok(())
    }

    /// Half-close after the final reply so the peer sees a clean EOF.
    pub async fn shutdown(&self) {
        let mut guard = self.writer.lock().await;
        if let Err(e) = guard.shutdown().await {
            debug!("shutdown of {} failed: {e}", self.addr);
        }
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle").field("addr", &self.addr).finish()
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}
