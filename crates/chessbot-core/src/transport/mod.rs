//! Chat transport and end-to-end encryption ports.
//!
//! The core calls these capabilities but never implements the wire protocol
//! or the cryptographic ratchet. Adapters live in chessbot-infra
//! (`MatrixClient`, `DisabledCrypto`); tests use the fakes in `test_support`.

use chessbot_types::error::{CryptoError, TransportError};
use chessbot_types::event::{DecryptedEvent, EncryptedEvent};
use chessbot_types::ids::{ContentUri, EventId, RoomId, UserId};
use serde_json::Value;

/// Network actions against the homeserver. Each call is one attempt; retry
/// policy belongs to the delivery pipeline.
pub trait Transport: Send + Sync {
    fn join_room(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Send a room event. `txn_id` identifies the logical send so the server
    /// can deduplicate a retried request.
    fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        txn_id: &str,
        content: &Value,
    ) -> impl std::future::Future<Output = Result<EventId, TransportError>> + Send;

    fn upload_media(
        &self,
        bytes: &[u8],
        mimetype: &str,
        file_name: &str,
    ) -> impl std::future::Future<Output = Result<ContentUri, TransportError>> + Send;

    fn redact(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        txn_id: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    fn mark_read(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Per-room group-session encryption.
pub trait RoomCrypto: Send + Sync {
    /// Encrypt `content` of type `event_type` for the room's current group
    /// session, returning `m.room.encrypted` content.
    fn encrypt(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: &Value,
    ) -> impl std::future::Future<Output = Result<Value, CryptoError>> + Send;

    /// Start a fresh group session and share it with `members`.
    fn share_group_session(
        &self,
        room_id: &RoomId,
        members: &[UserId],
    ) -> impl std::future::Future<Output = Result<(), CryptoError>> + Send;

    fn decrypt(
        &self,
        event: &EncryptedEvent,
    ) -> impl std::future::Future<Output = Result<DecryptedEvent, CryptoError>> + Send;
}
