use tracing::info;

/// External remote-desktop viewer boundary. The invitation token is
/// opaque; only the viewer component can interpret it.
pub trait Viewer: Send + Sync {
    fn connect(&self, token: &str) -> anyhow::Result<()>;
}

/// Stand-in viewer for headless use: records that the token arrived.
pub struct LoggingViewer;

impl Viewer for LoggingViewer {
    fn connect(&self, token: &str) -> anyhow::Result<()> {
        info!("viewer session opened with a {}-byte invitation token", token.len());
        Ok(())
    }
}
