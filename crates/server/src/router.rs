use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::BytesMut;
use shared::codec;
use shared::protocol::{
    AppsRequest, Login, Message, Notice, ReturnRunningApps, Role, ScreenTokenData, SessionId,
    StatusResponse, StreamRequest,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::auth::SharedAuthenticator;
use crate::registry::{RegistryError, RoomRegistry};
use crate::transport::PeerHandle;

/// One handler per accepted connection: owns the read half, decodes
/// frames, dispatches, and cleans the session up on the way out.
/// Malformed frames are answered and skipped; an unframeable stream
/// or any transport error ends the connection.
pub async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    auth: SharedAuthenticator,
) -> Result<()> {
    let (mut read, write) = stream.into_split();
    let peer = PeerHandle::new(addr, write);
    let mut session: Option<SessionId> = None;
    let mut buf = BytesMut::with_capacity(16 * 1024);
    let mut chunk = [0u8; 4096];

    'conn: loop {
        let n = match read.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("read from {addr} failed: {e}");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);
        loop {
            match codec::decode_from_buf(&mut buf) {
                Ok(Some(msg)) => {
                    let reply =
                        handle_message(&registry, &auth, &peer, &mut session, msg).await;
                    if let Some(reply) = reply
                        && let Err(e) = peer.send(&reply).await
                    {
                        debug!("reply to {addr} failed: {e}");
                        break 'conn;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    warn!("malformed frame from {addr}: {e}");
                    let reply = Message::StatusResponse(StatusResponse::error(
                        "malformed payload",
                    ));
                    if peer.send(&reply).await.is_err() {
                        break 'conn;
                    }
                }
                Err(e) => {
                    warn!("closing {addr}: {e}");
                    break 'conn;
                }
            }
        }
    }

    if let Some(id) = session.take()
        && let Some(username) = registry.remove_session(id).await
    {
        info!("session closed: {username} ({addr})");
    }
    Ok(())
}

async fn handle_message(
    registry: &RoomRegistry,
    auth: &SharedAuthenticator,
    peer: &Arc<PeerHandle>,
    session: &mut Option<SessionId>,
    msg: Message,
) -> Option<Message> {
    match msg {
        Message::Login(login) => Some(handle_login(registry, auth, peer, session, login).await),
        Message::Logout(_) => match session.take() {
            Some(id) => {
                registry.remove_session(id).await;
                Some(status_ok("logged out"))
            }
            None => Some(status_err(RegistryError::NotLoggedIn)),
        },
        Message::CreateRoom(req) => {
            let Some(id) = *session else {
                return Some(status_err(RegistryError::NotLoggedIn));
            };
            Some(match registry.create_room(id, &req.room_id).await {
                Ok(()) => status_ok(format!("room '{}' created", req.room_id)),
                Err(e) => status_err(e),
            })
        }
        Message::JoinRoom(req) => {
            let Some(id) = *session else {
                return Some(status_err(RegistryError::NotLoggedIn));
            };
            Some(
                match registry
                    .join_room(id, &req.room_id, &req.student_name, &req.mssv)
                    .await
                {
                    Ok(()) => status_ok(format!("joined room '{}'", req.room_id)),
                    Err(e) => status_err(e),
                },
            )
        }
        Message::Refresh(req) => {
            let Some(id) = *session else {
                return Some(status_err(RegistryError::NotLoggedIn));
            };
            Some(match registry.refresh(id, &req.room_id).await {
                Ok(participants) => {
                    Message::StatusResponse(StatusResponse::with_participants(participants))
                }
                Err(e) => status_err(e),
            })
        }
        Message::Notify(req) => {
            Some(notice_to_room(registry, session, &req.room_id, &req.message, true).await)
        }
        Message::BroadcastAll(req) => {
            Some(notice_to_room(registry, session, &req.room_id, &req.message, false).await)
        }
        Message::RequestRunningApps(req) => {
            Some(fan_out_to_student(registry, session, &req.target_username, FanOut::Apps).await)
        }
        Message::StartStreaming(req) => {
            Some(fan_out_to_student(registry, session, &req.target_username, FanOut::Stream).await)
        }
        Message::ReturnRunningApps(data) => {
            forward_apps(registry, session, data).await;
            None
        }
        Message::ScreenTokenData(data) => {
            forward_token(registry, session, data).await;
            None
        }
        Message::Notice(_)
        | Message::AppsRequest(_)
        | Message::StreamRequest(_)
        | Message::StatusResponse(_) => Some(Message::StatusResponse(StatusResponse::error(
            "unsupported message",
        ))),
    }
}

async fn handle_login(
    registry: &RoomRegistry,
    auth: &SharedAuthenticator,
    peer: &Arc<PeerHandle>,
    session: &mut Option<SessionId>,
    login: Login,
) -> Message {
    if !auth.authenticate(&login.username, &login.password, login.role) {
        warn!("authentication failed for '{}'", login.username);
        return Message::StatusResponse(StatusResponse::error("invalid credentials"));
    }
    // A repeated login on the same connection replaces the session.
    if let Some(old) = session.take() {
        registry.remove_session(old).await;
    }
    let id = registry
        .register_session(Arc::clone(peer), &login.username, login.role)
        .await;
    *session = Some(id);
    status_ok("login successful")
}

async fn notice_to_room(
    registry: &RoomRegistry,
    session: &Option<SessionId>,
    room_id: &str,
    message: &str,
    owner_only: bool,
) -> Message {
    let Some(id) = *session else {
        return status_err(RegistryError::NotLoggedIn);
    };
    let recipients = match registry.room_recipients(id, room_id, owner_only).await {
        Ok(recipients) => recipients,
        Err(e) => return status_err(e),
    };
    let Some((sender_username, _)) = registry.session_info(id).await else {
        return status_err(RegistryError::NotLoggedIn);
    };
    let push = Message::Notice(Notice {
        room_id: room_id.to_string(),
        sender_username,
        message: message.to_string(),
    });

    let total = recipients.len();
    let mut delivered = 0usize;
    for (username, member_peer) in recipients {
        // One dead member must not starve the rest of the room.
        match member_peer.send(&push).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!("notice to {username} failed: {e}"),
        }
    }
    info!("notice in '{room_id}': delivered {delivered}/{total}");
    status_ok(format!("notice delivered to {delivered} of {total} member(s)"))
}

enum FanOut {
    Apps,
    Stream,
}

/// Two-hop request: record the correlation, push a work item to the
/// target student, and acknowledge the teacher immediately. The
/// payload comes back later on the student's connection and is
/// forwarded by `forward_apps`/`forward_token`.
async fn fan_out_to_student(
    registry: &RoomRegistry,
    session: &Option<SessionId>,
    target_username: &str,
    kind: FanOut,
) -> Message {
    let Some(id) = *session else {
        return status_err(RegistryError::NotLoggedIn);
    };
    match registry.session_info(id).await {
        Some((_, Role::Teacher)) => {}
        Some(_) => return status_err(RegistryError::NotATeacher),
        None => return status_err(RegistryError::NotLoggedIn),
    }
    let (target_id, target_peer) = match registry.resolve_student(target_username).await {
        Ok(found) => found,
        Err(e) => return status_err(e),
    };

    let newly_recorded = match kind {
        FanOut::Apps => registry.add_pending_apps(target_id, id).await,
        FanOut::Stream => registry.add_pending_stream(target_id, id).await,
    };
    if !newly_recorded {
        // An attempt is already in flight; acknowledge it instead of
        // poking the student again.
        return status_ok(format!("request to '{target_username}' already pending"));
    }

    let push = match kind {
        FanOut::Apps => Message::AppsRequest(AppsRequest { requester_id: id }),
        FanOut::Stream => Message::StreamRequest(StreamRequest { requester_id: id }),
    };
    if let Err(e) = target_peer.send(&push).await {
        warn!("push to '{target_username}' failed: {e}");
        match kind {
            FanOut::Apps => registry.claim_pending_apps(target_id).await,
            FanOut::Stream => registry.claim_pending_stream(target_id).await,
        };
        return Message::StatusResponse(StatusResponse::error(format!(
            "could not reach '{target_username}'"
        )));
    }
    status_ok(format!("request sent to '{target_username}'"))
}

async fn forward_apps(
    registry: &RoomRegistry,
    session: &Option<SessionId>,
    mut data: ReturnRunningApps,
) {
    let Some(id) = *session else {
        debug!("app list from an unauthenticated connection dropped");
        return;
    };
    let Some(requester) = registry.claim_pending_apps(id).await else {
        debug!("unsolicited app list from session {id} dropped");
        return;
    };
    if data.requester_id != requester {
        debug!(
            "app list correlation mismatch (claimed {requester}, payload {})",
            data.requester_id
        );
        data.requester_id = requester;
    }
    if let Some((username, _)) = registry.session_info(id).await {
        data.username = username;
    }
    deliver_to_session(registry, requester, Message::ReturnRunningApps(data), "app list").await;
}

async fn forward_token(
    registry: &RoomRegistry,
    session: &Option<SessionId>,
    mut data: ScreenTokenData,
) {
    let Some(id) = *session else {
        debug!("screen token from an unauthenticated connection dropped");
        return;
    };
    let Some(requester) = registry.claim_pending_stream(id).await else {
        debug!("unsolicited screen token from session {id} dropped");
        return;
    };
    data.requester_id = requester;
    if let Some((username, _)) = registry.session_info(id).await {
        data.username = username;
    }
    deliver_to_session(registry, requester, Message::ScreenTokenData(data), "screen token").await;
}

async fn deliver_to_session(
    registry: &RoomRegistry,
    target: SessionId,
    msg: Message,
    what: &str,
) {
    let Some(peer) = registry.peer_of(target).await else {
        debug!("{what} for session {target} dropped: requester gone");
        return;
    };
    if let Err(e) = peer.send(&msg).await {
        warn!("forwarding {what} to session {target} failed: {e}");
    }
}

fn status_ok(message: impl Into<String>) -> Message {
    Message::StatusResponse(StatusResponse::success(message))
}

fn status_err(err: RegistryError) -> Message {
    Message::StatusResponse(StatusResponse::error(err.to_string()))
}
