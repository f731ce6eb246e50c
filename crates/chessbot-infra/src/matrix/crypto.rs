//! End-to-end encryption hooks shared by every crypto backend.
//!
//! [`SyncCrypto`] is how the sync loop hands each response's key material
//! (to-device events, device-list changes, one-time-key counts) to the
//! backend before any room event is routed. [`DisabledCrypto`] is the
//! backend used when the bot runs without an Olm machine: plain rooms work
//! normally, sends into encrypted rooms fail with `CryptoError::Unavailable`
//! and encrypted inbound events are dropped by the router.

use std::future::Future;

use chessbot_core::transport::RoomCrypto;
use chessbot_types::error::CryptoError;
use chessbot_types::event::{DecryptedEvent, EncryptedEvent};
use chessbot_types::ids::{RoomId, UserId};
use serde_json::Value;

use super::types::SyncResponse;

/// Feeds sync responses to the encryption backend and flushes the key
/// requests it produces.
pub trait SyncCrypto: Send + Sync {
    fn receive_sync(&self, response: &SyncResponse) -> impl Future<Output = Result<(), CryptoError>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCrypto;

impl SyncCrypto for DisabledCrypto {
    async fn receive_sync(&self, _response: &SyncResponse) -> Result<(), CryptoError> {
        Ok(())
    }
}

impl RoomCrypto for DisabledCrypto {
    async fn encrypt(&self, _room_id: &RoomId, _event_type: &str, _content: &Value) -> Result<Value, CryptoError> {
        Err(CryptoError::Unavailable)
    }

    async fn share_group_session(&self, _room_id: &RoomId, _members: &[UserId]) -> Result<(), CryptoError> {
        Err(CryptoError::Unavailable)
    }

    async fn decrypt(&self, _event: &EncryptedEvent) -> Result<DecryptedEvent, CryptoError> {
        Err(CryptoError::Unavailable)
    }
}
