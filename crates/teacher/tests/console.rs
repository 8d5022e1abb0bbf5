//! End-to-end teacher console tests against a real server and a real
//! student agent.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use room_server::Server;
use room_server::auth::HashedStore;
use room_server::config::ServerConfig;
use shared::protocol::Role;
use student::{ScreenShare, StaticApps, StudentAgent, StudentConfig};
use teacher::{NetworkManager, TeacherCommand, TeacherEvent, Viewer};
use tokio::sync::mpsc;

#[derive(Default)]
struct RecordingViewer {
    tokens: StdMutex<Vec<String>>,
}

impl Viewer for RecordingViewer {
    fn connect(&self, token: &str) -> anyhow::Result<()> {
        self.tokens.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

struct FixedShare(&'static str);

impl ScreenShare for FixedShare {
    fn open_session(&self) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

struct SlowShare(Duration);

impl ScreenShare for SlowShare {
    fn open_session(&self) -> anyhow::Result<String> {
        std::thread::sleep(self.0);
        Ok("late-token".to_string())
    }
}

async fn spawn_server() -> SocketAddr {
    let auth = HashedStore::new()
        .with_account("t1", "pw", Role::Teacher)
        .with_account("s1", "pw", Role::Student);
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
    };
    let server = Server::bind(&cfg, Arc::new(auth)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn next_event(events: &mut mpsc::Receiver<TeacherEvent>) -> TeacherEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

fn connect_cmd(addr: SocketAddr) -> TeacherCommand {
    TeacherCommand::Connect {
        host: "127.0.0.1".into(),
        port: addr.port(),
        username: "t1".into(),
        password: "pw".into(),
    }
}

async fn spawn_student<S: ScreenShare + 'static>(addr: SocketAddr, share: S) {
    let (agent, _events) = StudentAgent::connect(
        StudentConfig {
            host: "127.0.0.1".into(),
            port: addr.port(),
            username: "s1".into(),
            password: "pw".into(),
            room_id: "101".into(),
            student_name: "Alice".into(),
            mssv: "123".into(),
        },
        Arc::new(share),
        Arc::new(StaticApps::from_pairs(&[("editor", "Notes")])),
    )
    .await
    .unwrap();
    tokio::spawn(agent.run());
}

#[tokio::test]
async fn full_supervision_flow() {
    let addr = spawn_server().await;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut events) = mpsc::channel(64);
    let viewer = Arc::new(RecordingViewer::default());
    let mut manager = NetworkManager::new(cmd_rx, event_tx, Arc::clone(&viewer));
    tokio::spawn(async move { manager.run().await });

    cmd_tx.send(connect_cmd(addr)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TeacherEvent::Connected));

    cmd_tx
        .send(TeacherCommand::CreateRoom {
            room_id: "101".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TeacherEvent::RoomCreated { .. }
    ));

    spawn_student(addr, FixedShare("invite-token-xyz")).await;

    cmd_tx
        .send(TeacherCommand::Refresh {
            room_id: "101".into(),
        })
        .await
        .unwrap();
    match next_event(&mut events).await {
        TeacherEvent::Participants { participants, .. } => {
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].username, "s1");
            assert_eq!(participants[0].student_name, "Alice");
            assert_eq!(participants[0].mssv, "123");
        }
        other => panic!("expected participants, got {other:?}"),
    }

    cmd_tx
        .send(TeacherCommand::RequestApps { target: "s1".into() })
        .await
        .unwrap();
    match next_event(&mut events).await {
        TeacherEvent::RunningApps { username, apps } => {
            assert_eq!(username, "s1");
            assert_eq!(apps.len(), 1);
            assert_eq!(apps[0].process_name, "editor");
        }
        other => panic!("expected the app list, got {other:?}"),
    }

    cmd_tx
        .send(TeacherCommand::ViewScreen { target: "s1".into() })
        .await
        .unwrap();
    match next_event(&mut events).await {
        TeacherEvent::ScreenReady { username, token } => {
            assert_eq!(username, "s1");
            assert_eq!(token, "invite-token-xyz");
        }
        other => panic!("expected the screen to be ready, got {other:?}"),
    }
    assert_eq!(
        viewer.tokens.lock().unwrap().as_slice(),
        ["invite-token-xyz"]
    );
}

#[tokio::test]
async fn handshake_times_out_when_the_student_is_slow() {
    let addr = spawn_server().await;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut events) = mpsc::channel(64);
    let mut manager = NetworkManager::new(cmd_rx, event_tx, Arc::new(RecordingViewer::default()))
        .with_handshake_timeout(Duration::from_millis(200));
    tokio::spawn(async move { manager.run().await });

    cmd_tx.send(connect_cmd(addr)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TeacherEvent::Connected));
    cmd_tx
        .send(TeacherCommand::CreateRoom {
            room_id: "101".into(),
        })
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TeacherEvent::RoomCreated { .. }
    ));

    spawn_student(addr, SlowShare(Duration::from_secs(1))).await;

    cmd_tx
        .send(TeacherCommand::ViewScreen { target: "s1".into() })
        .await
        .unwrap();
    match next_event(&mut events).await {
        TeacherEvent::HandshakeTimedOut { username } => assert_eq!(username, "s1"),
        other => panic!("expected a handshake timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn viewing_an_offline_student_reports_an_error() {
    let addr = spawn_server().await;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut events) = mpsc::channel(64);
    let mut manager = NetworkManager::new(cmd_rx, event_tx, Arc::new(RecordingViewer::default()));
    tokio::spawn(async move { manager.run().await });

    cmd_tx.send(connect_cmd(addr)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TeacherEvent::Connected));

    cmd_tx
        .send(TeacherCommand::ViewScreen { target: "s1".into() })
        .await
        .unwrap();
    match next_event(&mut events).await {
        TeacherEvent::Error(message) => {
            assert!(message.contains("not a connected student"), "{message}");
        }
        other => panic!("expected an error, got {other:?}"),
    }
}
