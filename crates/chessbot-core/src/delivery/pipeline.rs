//! Delivery pipeline: plaintext or encrypted sends under the retry policy.

use std::sync::Arc;

use chessbot_types::error::DeliveryError;
use chessbot_types::event::{EVENT_ENCRYPTED, EVENT_MESSAGE, ImageInfo, MessageContent};
use chessbot_types::ids::{EventId, RoomId};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chess::RenderedDiagram;
use crate::repository::RoomStateStore;
use crate::transport::{RoomCrypto, Transport};

use super::retry::RetryPolicy;

/// Sends replies to rooms.
///
/// Whether a payload is encrypted is decided per call from the room state
/// store. A send that fails because the group session is unusable triggers
/// one re-share to the joined members and one more encryption attempt.
pub struct DeliveryPipeline<T, C, R> {
    transport: Arc<T>,
    crypto: Arc<C>,
    rooms: Arc<R>,
    retry: RetryPolicy,
}

impl<T, C, R> DeliveryPipeline<T, C, R>
where
    T: Transport,
    C: RoomCrypto,
    R: RoomStateStore,
{
    pub fn new(transport: Arc<T>, crypto: Arc<C>, rooms: Arc<R>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            crypto,
            rooms,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send a message, returning the id of the created event.
    pub async fn send(
        &self,
        room_id: &RoomId,
        content: &MessageContent,
    ) -> Result<EventId, DeliveryError> {
        let (event_type, payload) = self.prepare(room_id, content).await?;
        let txn_id = new_txn_id();

        let transport = &*self.transport;
        let (event_type, payload, txn_id) = (event_type, &payload, txn_id.as_str());
        let event_id = self
            .retry
            .run("send event", move |_| {
                transport.send_event(room_id, event_type, txn_id, payload)
            })
            .await?;

        debug!(room_id = %room_id, event_id = %event_id, event_type, "sent event");
        Ok(event_id)
    }

    /// Upload a rendered board and send it as an image, optionally threaded
    /// under `thread_root`.
    pub async fn send_image(
        &self,
        room_id: &RoomId,
        diagram: &RenderedDiagram,
        thread_root: Option<&EventId>,
    ) -> Result<EventId, DeliveryError> {
        let transport = &*self.transport;
        let url = self
            .retry
            .run("upload media", move |_| {
                transport.upload_media(&diagram.bytes, diagram.mimetype, diagram.file_name)
            })
            .await?;

        let content = MessageContent::Image {
            body: diagram.file_name.to_string(),
            url,
            info: ImageInfo {
                mimetype: diagram.mimetype.to_string(),
                size: diagram.bytes.len(),
                w: diagram.width,
                h: diagram.height,
            },
            thread_root: thread_root.cloned(),
        };
        self.send(room_id, &content).await
    }

    /// Redact an event. Best-effort: failures are logged and swallowed.
    pub async fn redact(&self, room_id: &RoomId, event_id: &EventId) {
        let txn_id = new_txn_id();
        match self.transport.redact(room_id, event_id, &txn_id).await {
            Ok(()) => debug!(room_id = %room_id, event_id = %event_id, "redacted event"),
            Err(error) => {
                warn!(room_id = %room_id, event_id = %event_id, %error, "failed to redact event")
            }
        }
    }

    pub async fn join_room(&self, room_id: &RoomId) -> Result<(), DeliveryError> {
        let transport = &*self.transport;
        self.retry
            .run("join room", move |_| transport.join_room(room_id))
            .await
    }

    /// Send a read receipt. Best-effort.
    pub async fn mark_read(&self, room_id: &RoomId, event_id: &EventId) {
        if let Err(error) = self.transport.mark_read(room_id, event_id).await {
            warn!(room_id = %room_id, event_id = %event_id, %error, "failed to mark event read");
        }
    }

    /// Pick the event type and payload: plaintext, or encrypted when the
    /// room requires it.
    async fn prepare(
        &self,
        room_id: &RoomId,
        content: &MessageContent,
    ) -> Result<(&'static str, Value), DeliveryError> {
        let plaintext = content.to_json();

        let encrypted = self
            .rooms
            .is_encrypted(room_id)
            .await
            .map_err(|e| DeliveryError::RoomState(e.to_string()))?;
        if !encrypted {
            return Ok((EVENT_MESSAGE, plaintext));
        }

        let mut sealed = self.encrypt(room_id, &plaintext).await?;
        if let (Some(relates_to), Some(fields)) = (content.relates_to(), sealed.as_object_mut()) {
            fields.insert("m.relates_to".to_string(), relates_to);
        }
        Ok((EVENT_ENCRYPTED, sealed))
    }

    async fn encrypt(&self, room_id: &RoomId, plaintext: &Value) -> Result<Value, DeliveryError> {
        match self.crypto.encrypt(room_id, EVENT_MESSAGE, plaintext).await {
            Ok(sealed) => Ok(sealed),
            Err(error) if error.needs_new_session() => {
                warn!(room_id = %room_id, %error, "group session unusable, sharing a new one");
                let members = self
                    .rooms
                    .joined_members(room_id)
                    .await
                    .map_err(|e| DeliveryError::RoomState(e.to_string()))?;
                self.crypto.share_group_session(room_id, &members).await?;
                Ok(self.crypto.encrypt(room_id, EVENT_MESSAGE, plaintext).await?)
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Transaction ids are time-ordered so server logs sort naturally.
fn new_txn_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chessbot_types::error::CryptoError;
    use chessbot_types::event::Membership;
    use serde_json::json;

    use super::*;
    use crate::test_support::{FakeCrypto, FakeTransport, MemoryRoomState, fast_retry, room, user};

    fn pipeline(
        transport: &Arc<FakeTransport>,
        crypto: &Arc<FakeCrypto>,
        rooms: &Arc<MemoryRoomState>,
    ) -> DeliveryPipeline<FakeTransport, FakeCrypto, MemoryRoomState> {
        DeliveryPipeline::new(
            Arc::clone(transport),
            Arc::clone(crypto),
            Arc::clone(rooms),
            fast_retry(),
        )
    }

    fn notice() -> MessageContent {
        MessageContent::Notice {
            body: "hi".into(),
            formatted_body: None,
        }
    }

    fn diagram() -> RenderedDiagram {
        RenderedDiagram {
            bytes: b"\x89PNG".to_vec(),
            mimetype: "image/png",
            file_name: "chessboard.png",
            width: 400,
            height: 400,
        }
    }

    // -------------------------------------------------------------------
    // Plaintext
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_plaintext_send() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());
        let event_id = pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_id, event_id);
        assert_eq!(sent[0].event_type, EVENT_MESSAGE);
        assert_eq!(sent[0].content["body"], "hi");
        assert_eq!(crypto.encrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_retries_with_same_txn_id() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_sends(4);
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());

        let result = pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.send_attempts(), 5);
        let txns = transport.send_txn_ids();
        assert!(txns.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_exhausts_retries() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_sends(5);
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());

        let err = pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::RetriesExhausted { attempts: 5, .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_image_uploads_then_threads() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());
        let root = EventId::new("$root");

        pipeline(&transport, &crypto, &rooms)
            .send_image(&room(), &diagram(), Some(&root))
            .await
            .unwrap();

        assert_eq!(transport.uploads(), 1);
        let sent = transport.sent();
        assert_eq!(sent[0].content["msgtype"], "m.image");
        assert_eq!(sent[0].content["info"]["mimetype"], "image/png");
        assert_eq!(sent[0].content["info"]["size"], 4);
        assert_eq!(sent[0].content["m.relates_to"]["rel_type"], "m.thread");
        assert_eq!(sent[0].content["m.relates_to"]["event_id"], "$root");
    }

    #[tokio::test]
    async fn test_upload_failure_sends_nothing() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_uploads(5);
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());

        let err = pipeline(&transport, &crypto, &rooms)
            .send_image(&room(), &diagram(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::RetriesExhausted { ref action, .. } if action == "upload media"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_redact_failure_is_swallowed() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_redactions(true);
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());

        pipeline(&transport, &crypto, &rooms)
            .redact(&room(), &EventId::new("$old"))
            .await;

        assert!(transport.redacted().is_empty());
    }

    // -------------------------------------------------------------------
    // Encrypted
    // -------------------------------------------------------------------

    async fn encrypted_room() -> Arc<MemoryRoomState> {
        let rooms = Arc::new(MemoryRoomState::new());
        rooms
            .set_encryption(&room(), &json!({ "algorithm": "m.megolm.v1.aes-sha2" }))
            .await
            .unwrap();
        rooms
            .set_membership(&room(), &user("@alice:example.org"), Membership::Join)
            .await
            .unwrap();
        rooms
    }

    #[tokio::test]
    async fn test_encrypted_send_keeps_relation_visible() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = encrypted_room().await;
        let root = EventId::new("$root");

        pipeline(&transport, &crypto, &rooms)
            .send_image(&room(), &diagram(), Some(&root))
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].event_type, EVENT_ENCRYPTED);
        assert_eq!(sent[0].content["algorithm"], "fake");
        assert_eq!(sent[0].content["m.relates_to"]["event_id"], "$root");
        assert!(sent[0].content.get("body").is_none());
    }

    #[tokio::test]
    async fn test_session_error_reshares_once() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        crypto.fail_encrypt_with(vec![CryptoError::SessionExpired]);
        let rooms = encrypted_room().await;

        pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await
            .unwrap();

        assert_eq!(crypto.encrypt_calls(), 2);
        assert_eq!(crypto.shared_with(), vec![vec![user("@alice:example.org")]]);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_second_session_error_is_terminal() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        crypto.fail_encrypt_with(vec![CryptoError::NoGroupSession, CryptoError::SessionNotShared]);
        let rooms = encrypted_room().await;

        let err = pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Encryption(CryptoError::SessionNotShared)));
        assert_eq!(crypto.shared_with().len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_other_crypto_error_does_not_reshare() {
        let transport = Arc::new(FakeTransport::new());
        let crypto = Arc::new(FakeCrypto::new());
        crypto.fail_encrypt_with(vec![CryptoError::Unavailable]);
        let rooms = encrypted_room().await;

        let err = pipeline(&transport, &crypto, &rooms)
            .send(&room(), &notice())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Encryption(CryptoError::Unavailable)));
        assert!(crypto.shared_with().is_empty());
    }

    #[tokio::test]
    async fn test_join_room_is_retried() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_joins(2);
        let crypto = Arc::new(FakeCrypto::new());
        let rooms = Arc::new(MemoryRoomState::new());

        pipeline(&transport, &crypto, &rooms)
            .join_room(&room())
            .await
            .unwrap();

        assert_eq!(transport.joined(), vec![room()]);
    }

    #[test]
    fn test_txn_ids_are_unique() {
        assert_ne!(new_txn_id(), new_txn_id());
    }
}
