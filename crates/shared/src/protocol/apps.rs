use serde::{Deserialize, Serialize};

use super::types::{ProcessInfo, SessionId};

/// Teacher -> server: ask a student for its running-application list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRunningApps {
    pub target_username: String,
}

/// Server -> student push: produce an application snapshot for
/// the session identified by `requester_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppsRequest {
    pub requester_id: SessionId,
}

/// Student -> server, forwarded to the requesting teacher as a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRunningApps {
    pub requester_id: SessionId,
    pub username: String,
    pub apps: Vec<ProcessInfo>,
}
