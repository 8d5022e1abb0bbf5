use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use client::{Client, ClientError, ClientEvent};
use shared::protocol::{
    JoinRoom, Login, Message, ReturnRunningApps, Role, ScreenTokenData, SessionId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::apps::RunningApps;
use crate::screen::ScreenShare;

/// Bound on the external share component; past this the attempt is
/// abandoned and the coordinator returns to idle.
pub const SHARE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct StudentConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub room_id: String,
    pub student_name: String,
    pub mssv: String,
}

/// What the presentation layer sees; it never touches the socket.
#[derive(Debug)]
pub enum StudentEvent {
    Notice {
        sender_username: String,
        message: String,
    },
    AppsReported,
    /// The invitation token was minted and handed to the server.
    SharePrepared,
    ShareFailed(String),
    Disconnected,
}

/// Push-driven client loop: joins its room once, then answers
/// server-pushed work (notices, app snapshots, share handshakes).
pub struct StudentAgent<S, A> {
    conn: Client,
    events: mpsc::Receiver<ClientEvent>,
    event_tx: mpsc::Sender<StudentEvent>,
    share: Arc<S>,
    apps: Arc<A>,
    username: String,
    preparing: Arc<AtomicBool>,
    share_timeout: Duration,
}

impl<S, A> StudentAgent<S, A>
where
    S: ScreenShare + 'static,
    A: RunningApps + 'static,
{
    /// Connect, authenticate, and join the configured room. A
    /// rejection surfaces as `ClientError::Rejected` and closes the
    /// connection.
    pub async fn connect(
        cfg: StudentConfig,
        share: Arc<S>,
        apps: Arc<A>,
    ) -> Result<(Self, mpsc::Receiver<StudentEvent>), ClientError> {
        let (conn, events) = Client::connect(&cfg.host, cfg.port).await?;
        if let Err(e) = Self::enroll(&conn, &cfg).await {
            conn.disconnect().await;
            return Err(e);
        }
        info!("joined room '{}' as {}", cfg.room_id, cfg.username);

        let (event_tx, event_rx) = mpsc::channel(64);
        Ok((
            Self {
                conn,
                events,
                event_tx,
                share,
                apps,
                username: cfg.username,
                preparing: Arc::new(AtomicBool::new(false)),
                share_timeout: SHARE_TIMEOUT,
            },
            event_rx,
        ))
    }

    async fn enroll(conn: &Client, cfg: &StudentConfig) -> Result<(), ClientError> {
        conn.request_status(&Message::Login(Login {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            role: Role::Student,
        }))
        .await?;
        conn.request_status(&Message::JoinRoom(JoinRoom {
            room_id: cfg.room_id.clone(),
            student_name: cfg.student_name.clone(),
            mssv: cfg.mssv.clone(),
        }))
        .await?;
        Ok(())
    }

    pub fn with_share_timeout(mut self, timeout: Duration) -> Self {
        self.share_timeout = timeout;
        self
    }

    pub fn client(&self) -> Client {
        self.conn.clone()
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                ClientEvent::Push(msg) => self.handle_push(msg).await,
                ClientEvent::Disconnected => {
                    let _ = self.event_tx.send(StudentEvent::Disconnected).await;
                    break;
                }
            }
        }
    }

    async fn handle_push(&self, msg: Message) {
        match msg {
            Message::Notice(notice) => {
                info!("{} says: {}", notice.sender_username, notice.message);
                let _ = self
                    .event_tx
                    .send(StudentEvent::Notice {
                        sender_username: notice.sender_username,
                        message: notice.message,
                    })
                    .await;
            }
            Message::AppsRequest(req) => {
                let apps = self.apps.snapshot();
                debug!("reporting {} running app(s)", apps.len());
                let reply = Message::ReturnRunningApps(ReturnRunningApps {
                    requester_id: req.requester_id,
                    username: self.username.clone(),
                    apps,
                });
                if self.conn.send(&reply).await.is_err() {
                    warn!("could not deliver the app list");
                    return;
                }
                let _ = self.event_tx.send(StudentEvent::AppsReported).await;
            }
            Message::StreamRequest(req) => self.start_share(req.requester_id),
            other => debug!("ignoring push: {}", other.kind()),
        }
    }

    /// Share-side half of the streaming handshake. At most one
    /// attempt runs at a time; a repeated request acknowledges the
    /// attempt already in flight.
    fn start_share(&self, requester_id: SessionId) {
        if self.preparing.swap(true, Ordering::SeqCst) {
            debug!("share session already preparing");
            return;
        }
        let share = Arc::clone(&self.share);
        let conn = self.conn.clone();
        let event_tx = self.event_tx.clone();
        let username = self.username.clone();
        let preparing = Arc::clone(&self.preparing);
        let share_timeout = self.share_timeout;
        tokio::spawn(async move {
            let opened = tokio::time::timeout(
                share_timeout,
                tokio::task::spawn_blocking(move || share.open_session()),
            )
            .await;
            let outcome = match opened {
                Ok(Ok(Ok(token))) => Ok(token),
                Ok(Ok(Err(e))) => Err(format!("share component failed: {e}")),
                Ok(Err(e)) => Err(format!("share task panicked: {e}")),
                Err(_) => Err("share component timed out".to_string()),
            };
            match outcome {
                Ok(token) => {
                    let msg = Message::ScreenTokenData(ScreenTokenData {
                        requester_id,
                        username,
                        token,
                    });
                    if conn.send(&msg).await.is_err() {
                        warn!("could not deliver the invitation token");
                        let _ = event_tx
                            .send(StudentEvent::ShareFailed("connection lost".into()))
                            .await;
                    } else {
                        let _ = event_tx.send(StudentEvent::SharePrepared).await;
                    }
                }
                Err(reason) => {
                    warn!("{reason}");
                    let _ = event_tx.send(StudentEvent::ShareFailed(reason)).await;
                }
            }
            preparing.store(false, Ordering::SeqCst);
        });
    }
}
