//! Event Router: the boundary between the transport and the controller.

use std::sync::Arc;

use chessbot_types::event::{
    EVENT_MESSAGE, EncryptedEvent, InboundEvent, InboundMessage, Membership, MembershipChange,
};
use chessbot_types::ids::UserId;
use tracing::{debug, error, info, warn};

use crate::delivery::DeliveryPipeline;
use crate::repository::RoomStateStore;
use crate::transport::{RoomCrypto, Transport};

use super::handler::MessageHandler;
use super::mailbox::RoomDispatcher;

/// Routes inbound events.
///
/// Membership and encryption events update room state (and the bot accepts
/// its own invites); encrypted events are decrypted; plaintext messages go
/// to the room's mailbox.
pub struct EventRouter<H, T, C, R> {
    own_user: UserId,
    dispatcher: Arc<RoomDispatcher<H>>,
    delivery: Arc<DeliveryPipeline<T, C, R>>,
    crypto: Arc<C>,
    rooms: Arc<R>,
}

impl<H, T, C, R> EventRouter<H, T, C, R>
where
    H: MessageHandler,
    T: Transport,
    C: RoomCrypto,
    R: RoomStateStore,
{
    pub fn new(
        own_user: UserId,
        dispatcher: Arc<RoomDispatcher<H>>,
        delivery: Arc<DeliveryPipeline<T, C, R>>,
        crypto: Arc<C>,
        rooms: Arc<R>,
    ) -> Self {
        Self {
            own_user,
            dispatcher,
            delivery,
            crypto,
            rooms,
        }
    }

    pub async fn route(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => self.dispatch(message).await,
            InboundEvent::Encrypted(event) => self.route_encrypted(event).await,
            InboundEvent::Membership(change) => self.route_membership(change).await,
            InboundEvent::Encryption { room_id, content } => {
                match self.rooms.set_encryption(&room_id, &content).await {
                    Ok(()) => info!(room_id = %room_id, "room is now encrypted"),
                    Err(error) => error!(room_id = %room_id, %error, "failed to record encryption"),
                }
            }
        }
    }

    async fn dispatch(&self, message: InboundMessage) {
        let room_id = message.room_id.clone();
        if let Err(error) = self.dispatcher.dispatch(message).await {
            warn!(room_id = %room_id, %error, "dropped message");
        }
    }

    async fn route_encrypted(&self, event: EncryptedEvent) {
        let decrypted = match self.crypto.decrypt(&event).await {
            Ok(decrypted) => decrypted,
            Err(error) => {
                error!(
                    room_id = %event.room_id,
                    event_id = %event.event_id,
                    sender = %event.sender,
                    %error,
                    "failed to decrypt event"
                );
                return;
            }
        };

        if decrypted.event_type != EVENT_MESSAGE {
            debug!(event_type = %decrypted.event_type, "ignoring decrypted non-message event");
            return;
        }

        // Relations travel in the cleartext envelope of an encrypted event.
        let mut content = decrypted.content;
        if let (Some(fields), Some(relates_to)) =
            (content.as_object_mut(), event.content.get("m.relates_to"))
        {
            fields
                .entry("m.relates_to")
                .or_insert_with(|| relates_to.clone());
        }

        match InboundMessage::from_content(event.room_id, event.sender, event.event_id, &content) {
            Some(message) => self.dispatch(message).await,
            None => debug!("decrypted message has no text body"),
        }
    }

    async fn route_membership(&self, change: MembershipChange) {
        if let Err(error) = self
            .rooms
            .set_membership(&change.room_id, &change.user_id, change.membership)
            .await
        {
            error!(room_id = %change.room_id, %error, "failed to record membership");
        }

        if change.user_id != self.own_user {
            return;
        }

        match change.membership {
            Membership::Invite => {
                info!(room_id = %change.room_id, "invited, joining");
                match self.delivery.join_room(&change.room_id).await {
                    Ok(()) => info!(room_id = %change.room_id, "joined room"),
                    Err(error) => error!(room_id = %change.room_id, %error, "could not join room"),
                }
            }
            membership if membership.is_leave_or_ban() => {
                info!(room_id = %change.room_id, membership = membership.as_str(), "removed from room");
                self.dispatcher.close_room(&change.room_id);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
