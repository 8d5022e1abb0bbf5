use rand::Rng;
use rand::distributions::Alphanumeric;

/// External remote-control boundary: open (or reuse) a local share
/// session and return its opaque invitation token. May block; the
/// agent calls it off the async runtime and bounds the wait.
pub trait ScreenShare: Send + Sync {
    fn open_session(&self) -> anyhow::Result<String>;
}

/// Stand-in share component for headless use: mints a random token
/// per session, the way the real component would mint an invitation.
pub struct LocalScreenShare;

impl ScreenShare for LocalScreenShare {
    fn open_session(&self) -> anyhow::Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();
        Ok(token)
    }
}
