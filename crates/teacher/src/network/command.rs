pub enum TeacherCommand {
    Connect {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    Disconnect,
    CreateRoom {
        room_id: String,
    },
    Refresh {
        room_id: String,
    },
    Notify {
        room_id: String,
        message: String,
    },
    Broadcast {
        room_id: String,
        message: String,
    },
    RequestApps {
        target: String,
    },
    ViewScreen {
        target: String,
    },
}
