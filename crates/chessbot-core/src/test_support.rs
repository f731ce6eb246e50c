//! In-memory fakes for the core ports, shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chessbot_types::error::{CryptoError, RepositoryError, TransportError};
use chessbot_types::event::{DecryptedEvent, EncryptedEvent, Membership};
use chessbot_types::game::GameSession;
use chessbot_types::ids::{ContentUri, EventId, RoomId, UserId};
use serde_json::{Value, json};

use crate::delivery::RetryPolicy;
use crate::repository::{RoomStateStore, SessionStore};
use crate::transport::{RoomCrypto, Transport};

pub fn room() -> RoomId {
    RoomId::new("!chess:example.org")
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub fn bot_user() -> UserId {
    UserId::new("@chessbot:example.org")
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
    }
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentEvent {
    pub room_id: RoomId,
    pub event_type: String,
    pub txn_id: String,
    pub content: Value,
    pub event_id: EventId,
}

#[derive(Default)]
struct TransportState {
    next_id: u64,
    sent: Vec<SentEvent>,
    send_attempts: u32,
    send_txn_ids: Vec<String>,
    fail_sends: u32,
    fail_uploads: u32,
    fail_joins: u32,
    fail_redactions: bool,
    uploads: u32,
    redacted: Vec<EventId>,
    read: Vec<EventId>,
    joined: Vec<RoomId>,
}

/// Records every call; failures are scripted per action.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` send attempts.
    pub fn fail_sends(&self, n: u32) {
        self.state.lock().unwrap().fail_sends = n;
    }

    pub fn fail_uploads(&self, n: u32) {
        self.state.lock().unwrap().fail_uploads = n;
    }

    pub fn fail_joins(&self, n: u32) {
        self.state.lock().unwrap().fail_joins = n;
    }

    pub fn fail_redactions(&self, fail: bool) {
        self.state.lock().unwrap().fail_redactions = fail;
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn send_attempts(&self) -> u32 {
        self.state.lock().unwrap().send_attempts
    }

    pub fn send_txn_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().send_txn_ids.clone()
    }

    pub fn uploads(&self) -> u32 {
        self.state.lock().unwrap().uploads
    }

    pub fn redacted(&self) -> Vec<EventId> {
        self.state.lock().unwrap().redacted.clone()
    }

    pub fn read_receipts(&self) -> Vec<EventId> {
        self.state.lock().unwrap().read.clone()
    }

    pub fn joined(&self) -> Vec<RoomId> {
        self.state.lock().unwrap().joined.clone()
    }

    /// Sent events that have not been redacted.
    pub fn live_events(&self) -> Vec<SentEvent> {
        let state = self.state.lock().unwrap();
        state
            .sent
            .iter()
            .filter(|event| !state.redacted.contains(&event.event_id))
            .cloned()
            .collect()
    }
}

fn scripted_failure(remaining: &mut u32) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

impl Transport for FakeTransport {
    async fn join_room(&self, room_id: &RoomId) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if scripted_failure(&mut state.fail_joins) {
            return Err(TransportError::Http("join failed".into()));
        }
        state.joined.push(room_id.clone());
        Ok(())
    }

    async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        txn_id: &str,
        content: &Value,
    ) -> Result<EventId, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;
        state.send_txn_ids.push(txn_id.to_string());
        if scripted_failure(&mut state.fail_sends) {
            return Err(TransportError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        state.next_id += 1;
        let event_id = EventId::new(format!("$sent{}", state.next_id));
        state.sent.push(SentEvent {
            room_id: room_id.clone(),
            event_type: event_type.to_string(),
            txn_id: txn_id.to_string(),
            content: content.clone(),
            event_id: event_id.clone(),
        });
        Ok(event_id)
    }

    async fn upload_media(
        &self,
        _bytes: &[u8],
        _mimetype: &str,
        file_name: &str,
    ) -> Result<ContentUri, TransportError> {
        let mut state = self.state.lock().unwrap();
        if scripted_failure(&mut state.fail_uploads) {
            return Err(TransportError::Http("upload failed".into()));
        }
        state.uploads += 1;
        Ok(ContentUri::new(format!(
            "mxc://example.org/{}-{file_name}",
            state.uploads
        )))
    }

    async fn redact(
        &self,
        _room_id: &RoomId,
        event_id: &EventId,
        _txn_id: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_redactions {
            return Err(TransportError::Status {
                status: 403,
                body: "forbidden".into(),
            });
        }
        state.redacted.push(event_id.clone());
        Ok(())
    }

    async fn mark_read(&self, _room_id: &RoomId, event_id: &EventId) -> Result<(), TransportError> {
        self.state.lock().unwrap().read.push(event_id.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeCrypto
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CryptoState {
    encrypt_errors: VecDeque<CryptoError>,
    encrypt_calls: u32,
    shared_with: Vec<Vec<UserId>>,
}

/// "Encrypts" by wrapping the plaintext in a JSON string.
#[derive(Default)]
pub struct FakeCrypto {
    state: Mutex<CryptoState>,
}

impl FakeCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next encrypt calls with these errors, in order.
    pub fn fail_encrypt_with(&self, errors: Vec<CryptoError>) {
        self.state.lock().unwrap().encrypt_errors = errors.into();
    }

    pub fn encrypt_calls(&self) -> u32 {
        self.state.lock().unwrap().encrypt_calls
    }

    pub fn shared_with(&self) -> Vec<Vec<UserId>> {
        self.state.lock().unwrap().shared_with.clone()
    }

    pub fn seal(event_type: &str, content: &Value) -> Value {
        json!({
            "algorithm": "fake",
            "ciphertext": json!({ "type": event_type, "content": content }).to_string(),
        })
    }
}

impl RoomCrypto for FakeCrypto {
    async fn encrypt(
        &self,
        _room_id: &RoomId,
        event_type: &str,
        content: &Value,
    ) -> Result<Value, CryptoError> {
        let mut state = self.state.lock().unwrap();
        state.encrypt_calls += 1;
        if let Some(error) = state.encrypt_errors.pop_front() {
            return Err(error);
        }
        Ok(Self::seal(event_type, content))
    }

    async fn share_group_session(
        &self,
        _room_id: &RoomId,
        members: &[UserId],
    ) -> Result<(), CryptoError> {
        self.state.lock().unwrap().shared_with.push(members.to_vec());
        Ok(())
    }

    async fn decrypt(&self, event: &EncryptedEvent) -> Result<DecryptedEvent, CryptoError> {
        let ciphertext = event
            .content
            .get("ciphertext")
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::Failed("missing ciphertext".into()))?;
        let inner: Value =
            serde_json::from_str(ciphertext).map_err(|e| CryptoError::Failed(e.to_string()))?;
        Ok(DecryptedEvent {
            event_type: inner["type"].as_str().unwrap_or_default().to_string(),
            content: inner["content"].clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<RoomId, GameSession>>,
    diagrams: Mutex<HashMap<(RoomId, EventId), EventId>>,
    fail_writes: Mutex<bool>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn session(&self, room_id: &RoomId) -> Option<GameSession> {
        self.sessions.lock().unwrap().get(room_id).cloned()
    }

    pub fn diagram(&self, room_id: &RoomId, source: &EventId) -> Option<EventId> {
        self.diagrams
            .lock()
            .unwrap()
            .get(&(room_id.clone(), source.clone()))
            .cloned()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if *self.fail_writes.lock().unwrap() {
            Err(RepositoryError::Query("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, room_id: &RoomId) -> Result<Option<GameSession>, RepositoryError> {
        Ok(self.session(room_id))
    }

    async fn put(&self, session: &GameSession) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.sessions
            .lock()
            .unwrap()
            .insert(session.room_id.clone(), session.clone());
        Ok(())
    }

    async fn get_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
    ) -> Result<Option<EventId>, RepositoryError> {
        Ok(self.diagram(room_id, source_event_id))
    }

    async fn set_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
        diagram_event_id: &EventId,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.diagrams.lock().unwrap().insert(
            (room_id.clone(), source_event_id.clone()),
            diagram_event_id.clone(),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRoomState
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRoomState {
    members: Mutex<HashMap<RoomId, HashMap<UserId, Membership>>>,
    encrypted: Mutex<HashSet<RoomId>>,
}

impl MemoryRoomState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn membership(&self, room_id: &RoomId, user_id: &UserId) -> Option<Membership> {
        self.members
            .lock()
            .unwrap()
            .get(room_id)
            .and_then(|members| members.get(user_id).copied())
    }
}

impl RoomStateStore for MemoryRoomState {
    async fn set_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        membership: Membership,
    ) -> Result<(), RepositoryError> {
        let mut members = self.members.lock().unwrap();
        let room = members.entry(room_id.clone()).or_default();
        if membership.is_leave_or_ban() {
            room.remove(user_id);
        } else {
            room.insert(user_id.clone(), membership);
        }
        Ok(())
    }

    async fn set_encryption(&self, room_id: &RoomId, _content: &Value) -> Result<(), RepositoryError> {
        self.encrypted.lock().unwrap().insert(room_id.clone());
        Ok(())
    }

    async fn is_encrypted(&self, room_id: &RoomId) -> Result<bool, RepositoryError> {
        Ok(self.encrypted.lock().unwrap().contains(room_id))
    }

    async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<UserId>, RepositoryError> {
        let members = self.members.lock().unwrap();
        let mut joined: Vec<UserId> = members
            .get(room_id)
            .map(|room| {
                room.iter()
                    .filter(|(_, m)| **m == Membership::Join)
                    .map(|(user, _)| user.clone())
                    .collect()
            })
            .unwrap_or_default();
        joined.sort();
        Ok(joined)
    }
}
