use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use shared::protocol::{Participant, Role, SessionId};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::transport::PeerHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("operation requires a teacher session")]
    NotATeacher,
    #[error("operation requires a student session")]
    NotAStudent,
    #[error("room '{0}' already exists")]
    DuplicateRoom(String),
    #[error("room '{0}' not found")]
    RoomNotFound(String),
    #[error("room '{0}' is owned by another teacher")]
    NotOwner(String),
    #[error("not a member of room '{0}'")]
    NotAMember(String),
    #[error("user '{0}' is not a connected student")]
    TargetNotFound(String),
}

/// Single source of truth for who is connected and who is in which
/// room. Every per-connection handler shares one instance; mutations
/// take the write lock so snapshots never observe a half-applied
/// membership change.
pub struct RoomRegistry {
    inner: RwLock<State>,
    session_seq: AtomicU64,
}

/// Requesters stop waiting after this long, so an unanswered
/// correlation older than it no longer blocks a retry.
const PENDING_TTL: Duration = Duration::from_secs(10);

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, SessionEntry>,
    by_username: HashMap<String, SessionId>,
    rooms: HashMap<String, Room>,
    // target session -> pending request, claimed at most once
    pending_apps: HashMap<SessionId, Pending>,
    pending_streams: HashMap<SessionId, Pending>,
}

#[derive(Clone, Copy)]
struct Pending {
    requester: SessionId,
    since: Instant,
}

impl Pending {
    fn expired(&self) -> bool {
        self.since.elapsed() > PENDING_TTL
    }
}

struct SessionEntry {
    username: String,
    role: Role,
    peer: Arc<PeerHandle>,
    room: Option<String>,
}

struct Room {
    // None marks an orphaned room: the owning teacher disconnected,
    // members are retained until a teacher recreates the id.
    owner: Option<SessionId>,
    members: HashMap<String, Member>,
}

struct Member {
    session: SessionId,
    student_name: String,
    mssv: String,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(State::default()),
            session_seq: AtomicU64::new(1),
        }
    }

    /// Called once per connection after successful authentication. A
    /// username that is already registered is taken over: the stale
    /// session is purged and the name maps to the new session.
    pub async fn register_session(
        &self,
        peer: Arc<PeerHandle>,
        username: &str,
        role: Role,
    ) -> SessionId {
        let id = self.session_seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.write().await;
        if let Some(stale) = state.by_username.get(username).copied() {
            debug!("login for '{username}' replaces stale session {stale}");
            purge(&mut state, stale);
        }
        state.by_username.insert(username.to_string(), id);
        state.sessions.insert(
            id,
            SessionEntry {
                username: username.to_string(),
                role,
                peer,
                room: None,
            },
        );
        info!("session {id} registered: {username} ({})", role.as_str());
        id
    }

    /// Disconnect/logout path. Students leave their room; a teacher's
    /// rooms are orphaned with members kept. Returns the username for
    /// logging, or None for an unknown id.
    pub async fn remove_session(&self, id: SessionId) -> Option<String> {
        let mut state = self.inner.write().await;
        purge(&mut state, id)
    }

    pub async fn create_room(&self, session: SessionId, room_id: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.write().await;
        let state = &mut *state;
        let entry = state.sessions.get(&session).ok_or(RegistryError::NotLoggedIn)?;
        if entry.role != Role::Teacher {
            return Err(RegistryError::NotATeacher);
        }
        if let Some(room) = state.rooms.get_mut(room_id) {
            return match room.owner {
                Some(owner) if owner == session => Ok(()),
                Some(_) => Err(RegistryError::DuplicateRoom(room_id.to_string())),
                None => {
                    room.owner = Some(session);
                    info!("room '{room_id}' re-owned by {}", entry.username);
                    Ok(())
                }
            };
        }
        state.rooms.insert(
            room_id.to_string(),
            Room {
                owner: Some(session),
                members: HashMap::new(),
            },
        );
        info!("room '{room_id}' created by {}", entry.username);
        Ok(())
    }

    /// Idempotent: re-joining updates the display fields instead of
    /// duplicating the member. Joining a second room leaves the first.
    pub async fn join_room(
        &self,
        session: SessionId,
        room_id: &str,
        student_name: &str,
        mssv: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.inner.write().await;
        let state = &mut *state;
        let entry = state.sessions.get_mut(&session).ok_or(RegistryError::NotLoggedIn)?;
        if entry.role != Role::Student {
            return Err(RegistryError::NotAStudent);
        }
        if !state
            .rooms
            .get(room_id)
            .is_some_and(|room| room.owner.is_some())
        {
            return Err(RegistryError::RoomNotFound(room_id.to_string()));
        }
        if let Some(previous) = entry.room.take()
            && previous != room_id
            && let Some(room) = state.rooms.get_mut(&previous)
            && room
                .members
                .get(&entry.username)
                .is_some_and(|m| m.session == session)
        {
            room.members.remove(&entry.username);
        }
        let room = state.rooms.get_mut(room_id).unwrap();
        room.members.insert(
            entry.username.clone(),
            Member {
                session,
                student_name: student_name.to_string(),
                mssv: mssv.to_string(),
            },
        );
        entry.room = Some(room_id.to_string());
        info!("{} joined room '{room_id}'", entry.username);
        Ok(())
    }

    /// Owner-only membership snapshot, sorted by username.
    pub async fn refresh(
        &self,
        session: SessionId,
        room_id: &str,
    ) -> Result<Vec<Participant>, RegistryError> {
        let state = self.inner.read().await;
        let entry = state.sessions.get(&session).ok_or(RegistryError::NotLoggedIn)?;
        if entry.role != Role::Teacher {
            return Err(RegistryError::NotATeacher);
        }
        let room = state
            .rooms
            .get(room_id)
            .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))?;
        match room.owner {
            None => return Err(RegistryError::RoomNotFound(room_id.to_string())),
            Some(owner) if owner != session => {
                return Err(RegistryError::NotOwner(room_id.to_string()));
            }
            Some(_) => {}
        }
        let mut participants: Vec<Participant> = room
            .members
            .iter()
            .map(|(username, member)| Participant {
                username: username.clone(),
                student_name: member.student_name.clone(),
                mssv: member.mssv.clone(),
            })
            .collect();
        participants.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(participants)
    }

    /// Live peers to push a room notice to: the owner plus every
    /// member, minus the sender. `owner_only` restricts the sender to
    /// the owning teacher (Notify); otherwise any member or the owner
    /// may broadcast (BroadcastAll).
    pub async fn room_recipients(
        &self,
        session: SessionId,
        room_id: &str,
        owner_only: bool,
    ) -> Result<Vec<(String, Arc<PeerHandle>)>, RegistryError> {
        let state = self.inner.read().await;
        let entry = state.sessions.get(&session).ok_or(RegistryError::NotLoggedIn)?;
        let room = state
            .rooms
            .get(room_id)
            .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))?;
        let owner = room
            .owner
            .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))?;
        if owner_only {
            if owner != session {
                return Err(RegistryError::NotOwner(room_id.to_string()));
            }
        } else {
            let is_member = room
                .members
                .get(&entry.username)
                .is_some_and(|m| m.session == session);
            if owner != session && !is_member {
                return Err(RegistryError::NotAMember(room_id.to_string()));
            }
        }

        let mut recipients = Vec::new();
        if owner != session
            && let Some(owner_entry) = state.sessions.get(&owner)
        {
            recipients.push((owner_entry.username.clone(), Arc::clone(&owner_entry.peer)));
        }
        for (username, member) in &room.members {
            if member.session == session {
                continue;
            }
            if let Some(member_entry) = state.sessions.get(&member.session) {
                recipients.push((username.clone(), Arc::clone(&member_entry.peer)));
            }
        }
        Ok(recipients)
    }

    pub async fn resolve_student(
        &self,
        username: &str,
    ) -> Result<(SessionId, Arc<PeerHandle>), RegistryError> {
        let state = self.inner.read().await;
        let not_found = || RegistryError::TargetNotFound(username.to_string());
        let id = *state.by_username.get(username).ok_or_else(not_found)?;
        let entry = state.sessions.get(&id).ok_or_else(not_found)?;
        if entry.role != Role::Student {
            return Err(not_found());
        }
        Ok((id, Arc::clone(&entry.peer)))
    }

    pub async fn session_info(&self, id: SessionId) -> Option<(String, Role)> {
        let state = self.inner.read().await;
        state
            .sessions
            .get(&id)
            .map(|entry| (entry.username.clone(), entry.role))
    }

    pub async fn peer_of(&self, id: SessionId) -> Option<Arc<PeerHandle>> {
        let state = self.inner.read().await;
        state.sessions.get(&id).map(|entry| Arc::clone(&entry.peer))
    }

    /// Record a stream correlation unless a live one is already
    /// pending for the target; the existing attempt is acknowledged,
    /// not replaced. An expired leftover is overwritten.
    pub async fn add_pending_stream(&self, target: SessionId, requester: SessionId) -> bool {
        let mut state = self.inner.write().await;
        add_pending(&mut state.pending_streams, target, requester)
    }

    pub async fn claim_pending_stream(&self, target: SessionId) -> Option<SessionId> {
        self.inner
            .write()
            .await
            .pending_streams
            .remove(&target)
            .map(|p| p.requester)
    }

    pub async fn add_pending_apps(&self, target: SessionId, requester: SessionId) -> bool {
        let mut state = self.inner.write().await;
        add_pending(&mut state.pending_apps, target, requester)
    }

    pub async fn claim_pending_apps(&self, target: SessionId) -> Option<SessionId> {
        self.inner
            .write()
            .await
            .pending_apps
            .remove(&target)
            .map(|p| p.requester)
    }
}

fn add_pending(
    pending: &mut HashMap<SessionId, Pending>,
    target: SessionId,
    requester: SessionId,
) -> bool {
    if pending.get(&target).is_some_and(|p| !p.expired()) {
        return false;
    }
    pending.insert(
        target,
        Pending {
            requester,
            since: Instant::now(),
        },
    );
    true
}

fn purge(state: &mut State, id: SessionId) -> Option<String> {
    let entry = state.sessions.remove(&id)?;
    if state.by_username.get(&entry.username) == Some(&id) {
        state.by_username.remove(&entry.username);
    }
    match entry.role {
        Role::Student => {
            if let Some(room_id) = &entry.room
                && let Some(room) = state.rooms.get_mut(room_id)
                && room
                    .members
                    .get(&entry.username)
                    .is_some_and(|m| m.session == id)
            {
                room.members.remove(&entry.username);
            }
        }
        Role::Teacher => {
            for (room_id, room) in state.rooms.iter_mut() {
                if room.owner == Some(id) {
                    room.owner = None;
                    debug!("room '{room_id}' orphaned");
                }
            }
        }
    }
    state.pending_apps.retain(|t, p| *t != id && p.requester != id);
    state.pending_streams.retain(|t, p| *t != id && p.requester != id);
    Some(entry.username)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Arc<PeerHandle> {
        PeerHandle::new("127.0.0.1:0".parse().unwrap(), tokio::io::sink())
    }

    async fn teacher(reg: &RoomRegistry, name: &str) -> SessionId {
        reg.register_session(peer(), name, Role::Teacher).await
    }

    async fn student(reg: &RoomRegistry, name: &str) -> SessionId {
        reg.register_session(peer(), name, Role::Student).await
    }

    #[tokio::test]
    async fn at_most_one_live_owner_per_room() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let t2 = teacher(&reg, "t2").await;
        reg.create_room(t1, "101").await.unwrap();
        assert_eq!(
            reg.create_room(t2, "101").await,
            Err(RegistryError::DuplicateRoom("101".into()))
        );
        // Re-creating one's own room is a no-op success.
        reg.create_room(t1, "101").await.unwrap();
    }

    #[tokio::test]
    async fn orphaned_room_keeps_members_until_recreated() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        reg.create_room(t1, "101").await.unwrap();
        reg.join_room(s1, "101", "Alice", "123").await.unwrap();

        reg.remove_session(t1).await.unwrap();
        let t2 = teacher(&reg, "t2").await;
        assert_eq!(
            reg.refresh(t2, "101").await,
            Err(RegistryError::RoomNotFound("101".into()))
        );

        reg.create_room(t2, "101").await.unwrap();
        let members = reg.refresh(t2, "101").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "s1");
    }

    #[tokio::test]
    async fn join_is_idempotent_and_updates_display_fields() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        reg.create_room(t1, "101").await.unwrap();
        reg.join_room(s1, "101", "Alice", "123").await.unwrap();
        reg.join_room(s1, "101", "Alice B.", "123").await.unwrap();

        let members = reg.refresh(t1, "101").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].student_name, "Alice B.");
    }

    #[tokio::test]
    async fn joining_a_second_room_leaves_the_first() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        reg.create_room(t1, "101").await.unwrap();
        reg.create_room(t1, "102").await.unwrap();
        reg.join_room(s1, "101", "Alice", "123").await.unwrap();
        reg.join_room(s1, "102", "Alice", "123").await.unwrap();

        assert!(reg.refresh(t1, "101").await.unwrap().is_empty());
        assert_eq!(reg.refresh(t1, "102").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_requires_an_existing_room() {
        let reg = RoomRegistry::new();
        let s1 = student(&reg, "s1").await;
        assert_eq!(
            reg.join_room(s1, "999", "Alice", "123").await,
            Err(RegistryError::RoomNotFound("999".into()))
        );
    }

    #[tokio::test]
    async fn refresh_is_owner_only() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let t2 = teacher(&reg, "t2").await;
        reg.create_room(t1, "101").await.unwrap();
        assert_eq!(
            reg.refresh(t2, "101").await,
            Err(RegistryError::NotOwner("101".into()))
        );
    }

    #[tokio::test]
    async fn role_checks_on_room_operations() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        assert_eq!(
            reg.create_room(s1, "101").await,
            Err(RegistryError::NotATeacher)
        );
        assert_eq!(
            reg.join_room(t1, "101", "x", "y").await,
            Err(RegistryError::NotAStudent)
        );
    }

    #[tokio::test]
    async fn recipients_exclude_sender_and_include_owner() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        let s2 = student(&reg, "s2").await;
        reg.create_room(t1, "101").await.unwrap();
        reg.join_room(s1, "101", "Alice", "1").await.unwrap();
        reg.join_room(s2, "101", "Bob", "2").await.unwrap();

        let from_teacher = reg.room_recipients(t1, "101", true).await.unwrap();
        let mut names: Vec<_> = from_teacher.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        assert_eq!(names, ["s1", "s2"]);

        let from_student = reg.room_recipients(s1, "101", false).await.unwrap();
        let mut names: Vec<_> = from_student.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        assert_eq!(names, ["s2", "t1"]);

        assert_eq!(
            reg.room_recipients(s1, "101", true).await,
            Err(RegistryError::NotOwner("101".into()))
        );
    }

    #[tokio::test]
    async fn resolve_student_rejects_teachers_and_strangers() {
        let reg = RoomRegistry::new();
        teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        assert!(reg.resolve_student("s1").await.is_ok());
        assert_eq!(reg.resolve_student("s1").await.unwrap().0, s1);
        assert!(matches!(
            reg.resolve_student("t1").await,
            Err(RegistryError::TargetNotFound(_))
        ));
        assert!(matches!(
            reg.resolve_student("ghost").await,
            Err(RegistryError::TargetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_stream_is_single_slot_and_claimed_once() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let t2 = teacher(&reg, "t2").await;
        let s1 = student(&reg, "s1").await;

        assert!(reg.add_pending_stream(s1, t1).await);
        assert!(!reg.add_pending_stream(s1, t2).await);
        assert_eq!(reg.claim_pending_stream(s1).await, Some(t1));
        assert_eq!(reg.claim_pending_stream(s1).await, None);
    }

    #[tokio::test]
    async fn disconnect_drops_pending_correlations() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        let s1 = student(&reg, "s1").await;
        assert!(reg.add_pending_stream(s1, t1).await);
        assert!(reg.add_pending_apps(s1, t1).await);

        reg.remove_session(t1).await.unwrap();
        assert_eq!(reg.claim_pending_stream(s1).await, None);
        assert_eq!(reg.claim_pending_apps(s1).await, None);
    }

    #[tokio::test]
    async fn relogin_takes_over_the_username() {
        let reg = RoomRegistry::new();
        let t1 = teacher(&reg, "t1").await;
        reg.create_room(t1, "101").await.unwrap();

        let t1b = teacher(&reg, "t1").await;
        assert!(reg.session_info(t1).await.is_none());
        // The old session's rooms were orphaned by the takeover.
        assert_eq!(
            reg.refresh(t1b, "101").await,
            Err(RegistryError::RoomNotFound("101".into()))
        );
        reg.create_room(t1b, "101").await.unwrap();
    }
}
