use serde::{Deserialize, Serialize};

use super::types::SessionId;

/// Teacher -> server: start the screen-view handshake with a student.
/// The success reply arrives immediately; the invitation token follows
/// later as a `ScreenTokenData` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartStreaming {
    pub target_username: String,
}

/// Server -> student push: open a share session and post the token
/// back tagged with `requester_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub requester_id: SessionId,
}

/// Student -> server, forwarded to the requesting teacher as a push.
/// The token is opaque; only the external viewer can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenTokenData {
    pub requester_id: SessionId,
    pub username: String,
    pub token: String,
}
