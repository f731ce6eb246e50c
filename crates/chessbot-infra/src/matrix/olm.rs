//! Olm/Megolm encryption backed by `matrix-sdk-crypto`.
//!
//! The machine keeps its account, sessions and tracked device lists in its
//! own SQLite store. Keys stay valid across restarts only while the device id
//! does, which is why the login device id is persisted next to the bot's
//! database.
//!
//! Every key request the machine queues (key upload, key query, one-time key
//! claim, to-device message) goes out through [`MatrixClient::send_request`]
//! and is acknowledged back to the machine.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chessbot_core::transport::RoomCrypto;
use chessbot_types::error::{CryptoError, TransportError};
use chessbot_types::event::{DecryptedEvent, EVENT_ENCRYPTED, EncryptedEvent};
use chessbot_types::ids::{RoomId, UserId};
use matrix_sdk_crypto::types::events::room::encrypted::EncryptedEvent as SealedEvent;
use matrix_sdk_crypto::types::requests::{AnyOutgoingRequest, ToDeviceRequest};
use matrix_sdk_crypto::{
    DecryptionSettings, EncryptionSettings, EncryptionSyncChanges, OlmMachine, TrustRequirement,
};
use matrix_sdk_sqlite::SqliteCryptoStore;
use ruma::api::client::keys::get_keys;
use ruma::api::client::sync::sync_events::DeviceLists;
use ruma::api::client::to_device::send_event_to_device;
use ruma::events::AnyMessageLikeEventContent;
use ruma::serde::Raw;
use ruma::{OneTimeKeyAlgorithm, OwnedDeviceId, OwnedRoomId, OwnedUserId, UInt};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::client::MatrixClient;
use super::crypto::SyncCrypto;
use super::types::SyncResponse;

pub struct OlmCrypto {
    machine: OlmMachine,
    client: Arc<MatrixClient>,
    decryption: DecryptionSettings,
}

impl OlmCrypto {
    /// Open (or create) the crypto store at `store_path` for this device.
    pub async fn open(
        client: Arc<MatrixClient>,
        user_id: &UserId,
        device_id: &str,
        store_path: &Path,
    ) -> Result<Self, CryptoError> {
        let user_id = parse_user(user_id)?;
        let device_id = OwnedDeviceId::from(device_id);

        let store = SqliteCryptoStore::open(store_path, None)
            .await
            .map_err(failed)?;
        let machine = OlmMachine::with_store(&user_id, &device_id, store, None)
            .await
            .map_err(failed)?;
        info!(
            device_id = %device_id,
            identity_key = %machine.identity_keys().curve25519.to_base64(),
            "crypto store loaded"
        );

        Ok(Self {
            machine,
            client,
            decryption: DecryptionSettings {
                sender_device_trust_requirement: TrustRequirement::Untrusted,
            },
        })
    }

    /// Send every request the machine has queued and report the responses.
    pub async fn flush_outgoing(&self) -> Result<(), CryptoError> {
        let requests = self.machine.outgoing_requests().await.map_err(failed)?;
        for request in requests {
            let request_id = request.request_id();
            match request.request() {
                AnyOutgoingRequest::KeysUpload(upload) => {
                    let response = self.client.send_request(upload.clone()).await.map_err(transport)?;
                    self.machine
                        .mark_request_as_sent(request_id, &response)
                        .await
                        .map_err(failed)?;
                }
                AnyOutgoingRequest::KeysQuery(query) => {
                    let mut keys = get_keys::v3::Request::new();
                    keys.device_keys = query.device_keys.clone();
                    keys.timeout = query.timeout;
                    let response = self.client.send_request(keys).await.map_err(transport)?;
                    self.machine
                        .mark_request_as_sent(request_id, &response)
                        .await
                        .map_err(failed)?;
                }
                AnyOutgoingRequest::KeysClaim(claim) => {
                    let response = self.client.send_request(claim.clone()).await.map_err(transport)?;
                    self.machine
                        .mark_request_as_sent(request_id, &response)
                        .await
                        .map_err(failed)?;
                }
                AnyOutgoingRequest::ToDeviceRequest(to_device) => {
                    self.send_to_device(to_device).await?;
                }
                // Cross-signing and in-room verification are not used.
                _ => debug!(request_id = %request_id, "skipping unsupported key request"),
            }
        }
        Ok(())
    }

    async fn send_to_device(&self, request: &ToDeviceRequest) -> Result<(), CryptoError> {
        let send = send_event_to_device::v3::Request::new_raw(
            request.event_type.clone(),
            request.txn_id.clone(),
            request.messages.clone(),
        );
        let response = self.client.send_request(send).await.map_err(transport)?;
        self.machine
            .mark_request_as_sent(&request.txn_id, &response)
            .await
            .map_err(failed)
    }
}

impl RoomCrypto for OlmCrypto {
    async fn encrypt(&self, room_id: &RoomId, event_type: &str, content: &Value) -> Result<Value, CryptoError> {
        let room_id = parse_room(room_id)?;
        let content: Raw<AnyMessageLikeEventContent> = raw_json(content)?;

        let encrypted = self
            .machine
            .encrypt_room_event_raw(&room_id, event_type, &content)
            .await
            .map_err(|error| {
                debug!(room_id = %room_id, %error, "no usable group session");
                CryptoError::NoGroupSession
            })?;
        serde_json::to_value(&encrypted).map_err(failed)
    }

    async fn share_group_session(&self, room_id: &RoomId, members: &[UserId]) -> Result<(), CryptoError> {
        let room_id = parse_room(room_id)?;
        let users = members.iter().map(parse_user).collect::<Result<Vec<_>, _>>()?;

        // Device keys first, then Olm sessions, then the room key itself.
        self.machine
            .update_tracked_users(users.iter().map(|user| &**user))
            .await
            .map_err(failed)?;
        self.flush_outgoing().await?;

        if let Some((txn_id, claim)) = self
            .machine
            .get_missing_sessions(users.iter().map(|user| &**user))
            .await
            .map_err(failed)?
        {
            let response = self.client.send_request(claim).await.map_err(transport)?;
            self.machine
                .mark_request_as_sent(&txn_id, &response)
                .await
                .map_err(failed)?;
        }

        let requests = self
            .machine
            .share_room_key(&room_id, users.iter().map(|user| &**user), EncryptionSettings::default())
            .await
            .map_err(failed)?;
        debug!(room_id = %room_id, members = users.len(), requests = requests.len(), "sharing room key");
        for request in requests {
            self.send_to_device(&request).await?;
        }
        Ok(())
    }

    async fn decrypt(&self, event: &EncryptedEvent) -> Result<DecryptedEvent, CryptoError> {
        let room_id = parse_room(&event.room_id)?;
        let sealed: Raw<SealedEvent> = raw_json(&json!({
            "type": EVENT_ENCRYPTED,
            "room_id": event.room_id.as_str(),
            "sender": event.sender.as_str(),
            "event_id": event.event_id.as_str(),
            "origin_server_ts": event.origin_server_ts,
            "content": event.content,
        }))?;

        let decrypted = self
            .machine
            .decrypt_room_event(&sealed, &room_id, &self.decryption)
            .await
            .map_err(failed)?;
        let plain: Value = decrypted.event.deserialize_as().map_err(failed)?;

        Ok(DecryptedEvent {
            event_type: plain
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content: plain.get("content").cloned().unwrap_or(Value::Null),
        })
    }
}

impl SyncCrypto for OlmCrypto {
    async fn receive_sync(&self, response: &SyncResponse) -> Result<(), CryptoError> {
        let to_device_events = response
            .to_device
            .events
            .iter()
            .map(raw_json)
            .collect::<Result<Vec<_>, _>>()?;
        let changed_devices: DeviceLists = match &response.device_lists {
            Some(lists) => serde_json::from_value(lists.clone()).map_err(failed)?,
            None => DeviceLists::new(),
        };
        let one_time_keys_counts: BTreeMap<OneTimeKeyAlgorithm, UInt> = response
            .device_one_time_keys_count
            .iter()
            .filter_map(|(algorithm, count)| {
                Some((OneTimeKeyAlgorithm::from(algorithm.as_str()), UInt::new(*count)?))
            })
            .collect();
        let unused_fallback_keys: Option<Vec<OneTimeKeyAlgorithm>> =
            response.device_unused_fallback_key_types.as_ref().map(|types| {
                types
                    .iter()
                    .map(|algorithm| OneTimeKeyAlgorithm::from(algorithm.as_str()))
                    .collect()
            });

        self.machine
            .receive_sync_changes(EncryptionSyncChanges {
                to_device_events,
                changed_devices: &changed_devices,
                one_time_keys_counts: &one_time_keys_counts,
                unused_fallback_keys: unused_fallback_keys.as_deref(),
                next_batch_token: Some(response.next_batch.clone()),
            })
            .await
            .map_err(failed)?;

        self.flush_outgoing().await
    }
}

fn parse_room(room_id: &RoomId) -> Result<OwnedRoomId, CryptoError> {
    OwnedRoomId::try_from(room_id.as_str())
        .map_err(|e| CryptoError::Failed(format!("invalid room id '{room_id}': {e}")))
}

fn parse_user(user_id: &UserId) -> Result<OwnedUserId, CryptoError> {
    OwnedUserId::try_from(user_id.as_str())
        .map_err(|e| CryptoError::Failed(format!("invalid user id '{user_id}': {e}")))
}

fn raw_json<T>(value: &Value) -> Result<Raw<T>, CryptoError> {
    serde_json::value::to_raw_value(value)
        .map(Raw::from_json)
        .map_err(failed)
}

fn failed(error: impl std::fmt::Display) -> CryptoError {
    CryptoError::Failed(error.to_string())
}

fn transport(error: TransportError) -> CryptoError {
    CryptoError::Failed(format!("key request failed: {error}"))
}
