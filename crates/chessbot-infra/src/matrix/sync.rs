//! Sync loop and sync-response decoding.
//!
//! [`sync_events`] turns one `/sync` response into router events and is pure,
//! so it is tested against JSON fixtures. [`SyncLoop`] drives the long-poll,
//! persists `next_batch` and stops on cancellation.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chessbot_core::delivery::RetryPolicy;
use chessbot_core::dispatch::{EventRouter, MessageHandler};
use chessbot_core::repository::RoomStateStore;
use chessbot_core::transport::RoomCrypto;
use chessbot_types::event::{
    EVENT_ENCRYPTED, EVENT_MESSAGE, EncryptedEvent, InboundEvent, InboundMessage, Membership,
    MembershipChange,
};
use chessbot_types::ids::{RoomId, UserId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::MatrixClient;
use super::crypto::SyncCrypto;
use super::types::{RawEvent, SyncResponse};
use crate::sqlite::SqliteSyncTokenStore;

const EVENT_MEMBER: &str = "m.room.member";
const EVENT_ENCRYPTION: &str = "m.room.encryption";

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a sync response into router events, room by room.
///
/// State changes (membership, encryption) are always returned. Messages are
/// returned only when `include_messages` is set, which lets the first sync
/// after a fresh start catch up on room state without answering history.
pub fn sync_events(response: &SyncResponse, include_messages: bool) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    for (room_id, room) in &response.rooms.invite {
        for raw in &room.invite_state.events {
            events.extend(state_event(room_id, raw));
        }
    }

    for (room_id, room) in response.rooms.join.iter().chain(&response.rooms.leave) {
        for raw in &room.state.events {
            events.extend(state_event(room_id, raw));
        }
        for raw in &room.timeline.events {
            if raw.state_key.is_some() {
                events.extend(state_event(room_id, raw));
            } else if include_messages {
                events.extend(timeline_event(room_id, raw));
            }
        }
    }

    events
}

fn state_event(room_id: &RoomId, raw: &RawEvent) -> Option<InboundEvent> {
    let state_key = raw.state_key.as_deref()?;
    match raw.event_type.as_str() {
        EVENT_MEMBER => {
            let membership = raw.content.get("membership")?.as_str()?;
            let membership = match Membership::from_str(membership) {
                Ok(membership) => membership,
                Err(error) => {
                    debug!(room_id = %room_id, %error, "skipping member event");
                    return None;
                }
            };
            Some(InboundEvent::Membership(MembershipChange {
                room_id: room_id.clone(),
                user_id: UserId::new(state_key),
                membership,
            }))
        }
        EVENT_ENCRYPTION if state_key.is_empty() => Some(InboundEvent::Encryption {
            room_id: room_id.clone(),
            content: raw.content.clone(),
        }),
        _ => None,
    }
}

fn timeline_event(room_id: &RoomId, raw: &RawEvent) -> Option<InboundEvent> {
    let sender = raw.sender.clone()?;
    let event_id = raw.event_id.clone()?;
    match raw.event_type.as_str() {
        EVENT_MESSAGE => {
            InboundMessage::from_content(room_id.clone(), sender, event_id, &raw.content)
                .map(InboundEvent::Message)
        }
        EVENT_ENCRYPTED => Some(InboundEvent::Encrypted(EncryptedEvent {
            room_id: room_id.clone(),
            sender,
            event_id,
            origin_server_ts: raw.origin_server_ts.unwrap_or_default(),
            content: raw.content.clone(),
        })),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SyncLoop
// ---------------------------------------------------------------------------

/// Long-polls `/sync` and routes every decoded event.
pub struct SyncLoop<H, C, R> {
    client: Arc<MatrixClient>,
    router: Arc<EventRouter<H, MatrixClient, C, R>>,
    crypto: Arc<C>,
    tokens: SqliteSyncTokenStore,
    user_id: UserId,
    timeout: Duration,
    backoff: RetryPolicy,
}

impl<H, C, R> SyncLoop<H, C, R>
where
    H: MessageHandler,
    C: RoomCrypto + SyncCrypto,
    R: RoomStateStore,
{
    pub fn new(
        client: Arc<MatrixClient>,
        router: Arc<EventRouter<H, MatrixClient, C, R>>,
        crypto: Arc<C>,
        tokens: SqliteSyncTokenStore,
        user_id: UserId,
        timeout: Duration,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            client,
            router,
            crypto,
            tokens,
            user_id,
            timeout,
            backoff,
        }
    }

    /// Run until `cancel` fires. Sync failures are retried forever with the
    /// backoff of `backoff`, capped at its last step.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut since = match self.tokens.get_next_batch(&self.user_id).await {
            Ok(since) => since,
            Err(error) => {
                warn!(%error, "could not load sync token, starting fresh");
                None
            }
        };
        if since.is_none() {
            info!("no stored sync token, skipping message history on first sync");
        }

        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.client.sync(since.as_deref(), self.timeout) => result,
            };

            match result {
                Ok(response) => {
                    failures = 0;
                    // Room keys must land before the timeline is decrypted.
                    if let Err(error) = self.crypto.receive_sync(&response).await {
                        warn!(%error, "could not process encryption updates");
                    }
                    let events = sync_events(&response, since.is_some());
                    debug!(events = events.len(), next_batch = %response.next_batch, "sync");
                    for event in events {
                        self.router.route(event).await;
                    }
                    if let Err(error) = self
                        .tokens
                        .set_next_batch(&self.user_id, &response.next_batch)
                        .await
                    {
                        warn!(%error, "could not persist sync token");
                    }
                    since = Some(response.next_batch);
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    let delay = self
                        .backoff
                        .delay_for(failures.min(self.backoff.max_attempts));
                    warn!(%error, failures, ?delay, "sync failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("sync loop stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
