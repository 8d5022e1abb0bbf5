use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use client::{Client, ClientEvent};
use shared::protocol::{
    BroadcastAll, CreateRoom, Login, Message, Notify, Refresh, RequestRunningApps, Role,
    StartStreaming,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::command::TeacherCommand;
use super::event::TeacherEvent;
use crate::viewer::Viewer;

/// How long the coordinator waits for a student's invitation token.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type PendingScreens = Arc<StdMutex<HashMap<String, oneshot::Sender<String>>>>;

/// Drives the teacher's single server connection from a command
/// channel and reports everything back on an event channel, so the
/// presentation layer never touches the socket.
pub struct NetworkManager<V> {
    cmd_rx: mpsc::Receiver<TeacherCommand>,
    event_tx: mpsc::Sender<TeacherEvent>,
    viewer: Arc<V>,
    connection: Option<Client>,
    pending_screens: PendingScreens,
    handshake_timeout: Duration,
}

impl<V: Viewer + 'static> NetworkManager<V> {
    pub fn new(
        cmd_rx: mpsc::Receiver<TeacherCommand>,
        event_tx: mpsc::Sender<TeacherEvent>,
        viewer: Arc<V>,
    ) -> Self {
        Self {
            cmd_rx,
            event_tx,
            viewer,
            connection: None,
            pending_screens: Arc::new(StdMutex::new(HashMap::new())),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub async fn run(&mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            if let Err(e) = self.handle_command(cmd).await {
                let _ = self.event_tx.send(TeacherEvent::Error(e.to_string())).await;
            }
        }
    }

    async fn handle_command(&mut self, cmd: TeacherCommand) -> Result<()> {
        match cmd {
            TeacherCommand::Connect {
                host,
                port,
                username,
                password,
            } => self.connect(&host, port, &username, &password).await,
            TeacherCommand::Disconnect => {
                self.disconnect().await;
                Ok(())
            }
            TeacherCommand::CreateRoom { room_id } => {
                self.conn()?
                    .request_status(&Message::CreateRoom(CreateRoom {
                        room_id: room_id.clone(),
                    }))
                    .await?;
                let _ = self
                    .event_tx
                    .send(TeacherEvent::RoomCreated { room_id })
                    .await;
                Ok(())
            }
            TeacherCommand::Refresh { room_id } => {
                let reply = self
                    .conn()?
                    .request_status(&Message::Refresh(Refresh {
                        room_id: room_id.clone(),
                    }))
                    .await?;
                let _ = self
                    .event_tx
                    .send(TeacherEvent::Participants {
                        room_id,
                        participants: reply.participants.unwrap_or_default(),
                    })
                    .await;
                Ok(())
            }
            TeacherCommand::Notify { room_id, message } => {
                let reply = self
                    .conn()?
                    .request_status(&Message::Notify(Notify {
                        room_id: room_id.clone(),
                        message,
                    }))
                    .await?;
                let _ = self
                    .event_tx
                    .send(TeacherEvent::NoticeDelivered {
                        room_id,
                        detail: reply.message,
                    })
                    .await;
                Ok(())
            }
            TeacherCommand::Broadcast { room_id, message } => {
                let reply = self
                    .conn()?
                    .request_status(&Message::BroadcastAll(BroadcastAll {
                        room_id: room_id.clone(),
                        message,
                    }))
                    .await?;
                let _ = self
                    .event_tx
                    .send(TeacherEvent::NoticeDelivered {
                        room_id,
                        detail: reply.message,
                    })
                    .await;
                Ok(())
            }
            TeacherCommand::RequestApps { target } => {
                // Acknowledged now; the list arrives later as a push.
                self.conn()?
                    .request_status(&Message::RequestRunningApps(RequestRunningApps {
                        target_username: target,
                    }))
                    .await?;
                Ok(())
            }
            TeacherCommand::ViewScreen { target } => self.view_screen(target).await,
        }
    }

    fn conn(&self) -> Result<&Client> {
        self.connection
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("not connected"))
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<()> {
        info!("connecting to {host}:{port}");
        let (conn, events) = Client::connect(host, port).await?;
        conn.request_status(&Message::Login(Login {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Teacher,
        }))
        .await?;
        info!("logged in as {username}");

        self.connection = Some(conn);
        tokio::spawn(pump_pushes(
            events,
            self.event_tx.clone(),
            Arc::clone(&self.pending_screens),
        ));
        let _ = self.event_tx.send(TeacherEvent::Connected).await;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.disconnect().await;
        }
        self.pending_screens.lock().unwrap().clear();
    }

    /// Viewer-side half of the streaming handshake: the request is
    /// acknowledged immediately, the token arrives as a push and is
    /// correlated back here by target username, bounded by the
    /// handshake timeout.
    async fn view_screen(&mut self, target: String) -> Result<()> {
        let conn = self.conn()?.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_screens.lock().unwrap();
            if pending.contains_key(&target) {
                anyhow::bail!("already waiting for a token from '{target}'");
            }
            pending.insert(target.clone(), tx);
        }

        if let Err(e) = conn
            .request_status(&Message::StartStreaming(StartStreaming {
                target_username: target.clone(),
            }))
            .await
        {
            self.pending_screens.lock().unwrap().remove(&target);
            return Err(e.into());
        }

        let viewer = Arc::clone(&self.viewer);
        let event_tx = self.event_tx.clone();
        let pending = Arc::clone(&self.pending_screens);
        let timeout = self.handshake_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(token)) => {
                    if let Err(e) = viewer.connect(&token) {
                        let _ = event_tx
                            .send(TeacherEvent::Error(format!("viewer failed: {e}")))
                            .await;
                        return;
                    }
                    let _ = event_tx
                        .send(TeacherEvent::ScreenReady {
                            username: target,
                            token,
                        })
                        .await;
                }
                // Sender dropped: the connection died and the pump
                // already reported Disconnected.
                Ok(Err(_)) => {}
                Err(_) => {
                    pending.lock().unwrap().remove(&target);
                    let _ = event_tx
                        .send(TeacherEvent::HandshakeTimedOut { username: target })
                        .await;
                }
            }
        });
        Ok(())
    }
}

/// Single consumer of the connection's push stream; requests never
/// read the socket themselves.
async fn pump_pushes(
    mut events: mpsc::Receiver<ClientEvent>,
    event_tx: mpsc::Sender<TeacherEvent>,
    pending_screens: PendingScreens,
) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Push(Message::ScreenTokenData(data)) => {
                let waiter = pending_screens.lock().unwrap().remove(&data.username);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(data.token);
                    }
                    None => debug!("token from '{}' with no waiter", data.username),
                }
            }
            ClientEvent::Push(Message::ReturnRunningApps(data)) => {
                let _ = event_tx
                    .send(TeacherEvent::RunningApps {
                        username: data.username,
                        apps: data.apps,
                    })
                    .await;
            }
            ClientEvent::Push(Message::Notice(notice)) => {
                let _ = event_tx
                    .send(TeacherEvent::Notice {
                        room_id: notice.room_id,
                        sender_username: notice.sender_username,
                        message: notice.message,
                    })
                    .await;
            }
            ClientEvent::Push(other) => {
                warn!("unexpected push: {}", other.kind());
            }
            ClientEvent::Disconnected => {
                // Waiters learn of the loss through their dropped senders.
                pending_screens.lock().unwrap().clear();
                let _ = event_tx.send(TeacherEvent::Disconnected).await;
                break;
            }
        }
    }
}
