use shared::protocol::{Participant, ProcessInfo};

#[derive(Debug)]
pub enum TeacherEvent {
    Connected,
    Disconnected,
    RoomCreated {
        room_id: String,
    },
    Participants {
        room_id: String,
        participants: Vec<Participant>,
    },
    NoticeDelivered {
        room_id: String,
        detail: String,
    },
    /// A student's chat-style broadcast landed in one of our rooms.
    Notice {
        room_id: String,
        sender_username: String,
        message: String,
    },
    RunningApps {
        username: String,
        apps: Vec<ProcessInfo>,
    },
    /// The invitation token arrived and the viewer accepted it.
    ScreenReady {
        username: String,
        token: String,
    },
    HandshakeTimedOut {
        username: String,
    },
    Error(String),
}
