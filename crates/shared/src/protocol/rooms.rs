use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoom {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    pub room_id: String,
    pub student_name: String,
    pub mssv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refresh {
    pub room_id: String,
}

/// Teacher -> server: deliver a notice to every member of an owned room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    pub room_id: String,
    pub message: String,
}

/// Any member -> server: room-wide chat-style delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAll {
    pub room_id: String,
    pub message: String,
}

/// Server -> member push carrying a `Notify`/`BroadcastAll` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub room_id: String,
    pub sender_username: String,
    pub message: String,
}
