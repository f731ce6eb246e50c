//! Wire types for the Matrix client-server API.
//!
//! Only the fields the bot reads are modelled; everything else in the
//! homeserver's responses is ignored.

use std::collections::BTreeMap;

use chessbot_types::ids::{ContentUri, EventId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub login_type: &'static str,
    pub identifier: UserIdentifier<'a>,
    pub password: &'a str,
    /// Reuse an earlier device instead of creating a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<&'a str>,
    pub initial_device_display_name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    pub id_type: &'static str,
    pub user: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub access_token: String,
    pub device_id: String,
}

// ---------------------------------------------------------------------------
// Simple responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EventIdResponse {
    pub event_id: EventId,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub content_uri: ContentUri,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,

    // Crypto bookkeeping, passed through untouched to the Olm machine.
    #[serde(default)]
    pub to_device: ToDeviceEvents,
    #[serde(default)]
    pub device_lists: Option<Value>,
    #[serde(default)]
    pub device_one_time_keys_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub device_unused_fallback_key_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToDeviceEvents {
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: BTreeMap<RoomId, JoinedRoom>,
    #[serde(default)]
    pub invite: BTreeMap<RoomId, InvitedRoom>,
    #[serde(default)]
    pub leave: BTreeMap<RoomId, JoinedRoom>,
}

/// A joined or left room: state since the last sync, then the timeline.
#[derive(Debug, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// A client event with the envelope fields the router needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub sender: Option<UserId>,
    pub event_id: Option<EventId>,
    pub state_key: Option<String>,
    pub origin_server_ts: Option<u64>,
    #[serde(default)]
    pub content: Value,
}
