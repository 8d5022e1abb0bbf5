use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use shared::codec;
use shared::protocol::{Logout, Message, StatusResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Everything the reader task hands to the application: pushes that
/// are not replies, and a terminal `Disconnected` marker.
#[derive(Debug)]
pub enum ClientEvent {
    Push(Message),
    Disconnected,
}

/// One outbound connection. A single reader task owns the read half
/// and demultiplexes: `StatusResponse` frames resolve the pending
/// request, everything else flows to the push channel. There is never
/// a second reader on the stream.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    writer: Mutex<OwnedWriteHalf>,
    pending: StdMutex<Option<oneshot::Sender<Message>>>,
    connected: AtomicBool,
}

impl Client {
    pub async fn connect(
        host: &str,
        port: u16,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ClientError::ConnectionFailed)?;
        let (read, write) = stream.into_split();

        let inner = Arc::new(Inner {
            writer: Mutex::new(write),
            pending: StdMutex::new(None),
            connected: AtomicBool::new(true),
        });
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(read_loop(read, Arc::clone(&inner), event_tx));

        Ok((Self { inner }, event_rx))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Fire-and-forget send.
    pub async fn send(&self, msg: &Message) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::ConnectionLost);
        }
        let bytes = codec::encode_line(msg)?;
        let mut writer = self.inner.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|_| ClientError::ConnectionLost)
    }

    /// Send one request and suspend for its single reply. At most one
    /// request may be in flight per connection; the passive push
    /// stream keeps flowing independently while this waits.
    pub async fn request(&self, msg: &Message) -> Result<Message, ClientError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().unwrap();
            if pending.is_some() {
                return Err(ClientError::RequestInFlight);
            }
            *pending = Some(tx);
        }
        if let Err(e) = self.send(msg).await {
            self.inner.pending.lock().unwrap().take();
            return Err(e);
        }
        rx.await.map_err(|_| ClientError::ConnectionLost)
    }

    /// `request`, unwrapped to the status reply; an error status
    /// becomes `ClientError::Rejected`.
    pub async fn request_status(&self, msg: &Message) -> Result<StatusResponse, ClientError> {
        match self.request(msg).await? {
            Message::StatusResponse(resp) if resp.is_success() => Ok(resp),
            Message::StatusResponse(resp) => Err(ClientError::Rejected(resp.message)),
            other => Err(ClientError::Rejected(format!(
                "unexpected reply kind {}",
                other.kind()
            ))),
        }
    }

    /// Best-effort notify-then-close; idempotent. The reader task
    /// observes the shutdown and emits `Disconnected` exactly once.
    pub async fn disconnect(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.inner.writer.lock().await;
        if let Ok(bytes) = codec::encode_line(&Message::Logout(Logout {})) {
            let _ = writer.write_all(&bytes).await;
        }
        let _ = writer.shutdown().await;
    }
}

async fn read_loop(
    mut read: OwnedReadHalf,
    inner: Arc<Inner>,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut chunk = [0u8; 4096];
    'conn: loop {
        let n = match read.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("read failed: {e}");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);
        loop {
            match codec::decode_from_buf(&mut buf) {
                Ok(Some(msg)) => dispatch(&inner, &event_tx, msg).await,
                Ok(None) => break,
                Err(e) if e.is_recoverable() => warn!("dropping malformed frame: {e}"),
                Err(e) => {
                    warn!("terminal decode error: {e}");
                    break 'conn;
                }
            }
        }
    }
    inner.connected.store(false, Ordering::SeqCst);
    // Dropping the sender cancels a parked `request` with ConnectionLost.
    drop(inner.pending.lock().unwrap().take());
    let _ = event_tx.send(ClientEvent::Disconnected).await;
}

async fn dispatch(inner: &Inner, event_tx: &mpsc::Sender<ClientEvent>, msg: Message) {
    if matches!(msg, Message::StatusResponse(_)) {
        let waiter = inner.pending.lock().unwrap().take();
        if let Some(tx) = waiter {
            if let Err(unclaimed) = tx.send(msg) {
                debug!("requester gone before reply: {}", unclaimed.kind());
            }
            return;
        }
        debug!("status response with no pending request");
    }
    if event_tx.send(ClientEvent::Push(msg)).await.is_err() {
        debug!("push receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{Login, Notice, Role};
    use tokio::net::TcpListener;

    async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Option<Message> {
        loop {
            if let Some(msg) = codec::decode_from_buf(buf).unwrap() {
                return Some(msg);
            }
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn write_frame(stream: &mut TcpStream, msg: &Message) {
        stream
            .write_all(&codec::encode_line(msg).unwrap())
            .await
            .unwrap();
    }

    fn login() -> Message {
        Message::Login(Login {
            username: "s1".into(),
            password: "pw".into(),
            role: Role::Student,
        })
    }

    #[tokio::test]
    async fn reply_goes_to_request_and_push_goes_to_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            assert!(matches!(
                read_frame(&mut stream, &mut buf).await,
                Some(Message::Login(_))
            ));
            // Push arrives before the reply; the demux must not hand
            // it to the waiting request.
            write_frame(
                &mut stream,
                &Message::Notice(Notice {
                    room_id: "101".into(),
                    sender_username: "t1".into(),
                    message: "hello".into(),
                }),
            )
            .await;
            write_frame(
                &mut stream,
                &Message::StatusResponse(StatusResponse::success("login successful")),
            )
            .await;
            // Hold the socket open until the client is done.
            let _ = read_frame(&mut stream, &mut buf).await;
        });

        let (conn, mut events) = Client::connect("127.0.0.1", addr.port()).await.unwrap();
        let reply = conn.request_status(&login()).await.unwrap();
        assert!(reply.is_success());
        match events.recv().await.unwrap() {
            ClientEvent::Push(Message::Notice(n)) => assert_eq!(n.message, "hello"),
            other => panic!("expected notice push, got {other:?}"),
        }
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn peer_close_cancels_pending_request_and_disconnects_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let _ = read_frame(&mut stream, &mut buf).await;
            // Close without replying.
        });

        let (conn, mut events) = Client::connect("127.0.0.1", addr.port()).await.unwrap();
        let err = conn.request(&login()).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionLost));
        assert!(matches!(events.recv().await, Some(ClientEvent::Disconnected)));
        assert!(events.recv().await.is_none());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn second_concurrent_request_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            // Never reply; just keep the connection open.
            while read_frame(&mut stream, &mut buf).await.is_some() {}
        });

        let (conn, _events) = Client::connect("127.0.0.1", addr.port()).await.unwrap();
        let parked = conn.clone();
        let handle = tokio::spawn(async move { parked.request(&login()).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(matches!(
            conn.request(&login()).await.unwrap_err(),
            ClientError::RequestInFlight
        ));
        conn.disconnect().await;
        assert!(matches!(
            handle.await.unwrap().unwrap_err(),
            ClientError::ConnectionLost
        ));
    }
}
