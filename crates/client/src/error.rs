use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),
    /// The transport died; any outstanding request is cancelled with
    /// this error and a `Disconnected` event follows exactly once.
    #[error("connection lost")]
    ConnectionLost,
    /// `request` was called while another request was awaiting its
    /// reply on the same stream.
    #[error("a request is already in flight")]
    RequestInFlight,
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// The peer answered the request but with an error status.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The streaming handshake did not produce a token in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
}
