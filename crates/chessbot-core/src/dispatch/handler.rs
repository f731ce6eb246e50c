//! Message handler trait for the per-room workers.

use chessbot_types::event::InboundMessage;

use crate::repository::{RoomStateStore, SessionStore};
use crate::session::{GameController, HandleOutcome};
use crate::transport::{RoomCrypto, Transport};

/// Handles one plaintext room message.
///
/// Called by at most one task per room at a time, in arrival order.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle_message(
        &self,
        message: InboundMessage,
    ) -> impl std::future::Future<Output = HandleOutcome> + Send;
}

impl<S, T, C, R> MessageHandler for GameController<S, T, C, R>
where
    S: SessionStore + 'static,
    T: Transport + 'static,
    C: RoomCrypto + 'static,
    R: RoomStateStore + 'static,
{
    async fn handle_message(&self, message: InboundMessage) -> HandleOutcome {
        self.handle(&message).await
    }
}
