use serde::{Deserialize, Serialize};

use super::apps::{AppsRequest, RequestRunningApps, ReturnRunningApps};
use super::auth::{Login, Logout};
use super::rooms::{BroadcastAll, CreateRoom, JoinRoom, Notice, Notify, Refresh};
use super::streaming::{ScreenTokenData, StartStreaming, StreamRequest};
use super::types::StatusResponse;

/// Every frame on the wire is one of these, discriminated by the
/// `type` field of the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Requests; each is answered by exactly one StatusResponse.
    Login(Login),
    CreateRoom(CreateRoom),
    JoinRoom(JoinRoom),
    Refresh(Refresh),
    Notify(Notify),
    BroadcastAll(BroadcastAll),
    RequestRunningApps(RequestRunningApps),
    StartStreaming(StartStreaming),
    Logout(Logout),
    // Student -> server data deliveries, forwarded without a reply.
    ReturnRunningApps(ReturnRunningApps),
    ScreenTokenData(ScreenTokenData),
    // Server -> client pushes.
    Notice(Notice),
    AppsRequest(AppsRequest),
    StreamRequest(StreamRequest),
    StatusResponse(StatusResponse),
}

impl Message {
    /// Wire discriminator, mainly for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Login(_) => "login",
            Message::CreateRoom(_) => "create_room",
            Message::JoinRoom(_) => "join_room",
            Message::Refresh(_) => "refresh",
            Message::Notify(_) => "notify",
            Message::BroadcastAll(_) => "broadcast_all",
            Message::RequestRunningApps(_) => "request_running_apps",
            Message::StartStreaming(_) => "start_streaming",
            Message::Logout(_) => "logout",
            Message::ReturnRunningApps(_) => "return_running_apps",
            Message::ScreenTokenData(_) => "screen_token_data",
            Message::Notice(_) => "notice",
            Message::AppsRequest(_) => "apps_request",
            Message::StreamRequest(_) => "stream_request",
            Message::StatusResponse(_) => "status_response",
        }
    }
}
