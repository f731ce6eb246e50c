//! Per-room mailboxes: one bounded queue and one worker task per room.
//!
//! Messages for the same room are handled strictly one after another, in
//! arrival order, so the read-modify-write of a room's game never interleaves
//! and replies leave in the order their triggers arrived. Rooms are
//! independent and run in parallel.

use std::sync::Arc;

use chessbot_types::event::InboundMessage;
use chessbot_types::ids::RoomId;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handler::MessageHandler;

/// Buffer size for each room's mailbox.
const MAILBOX_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("worker for room {0} is gone")]
    WorkerGone(RoomId),
}

struct Mailbox {
    sender: mpsc::Sender<InboundMessage>,
    worker: JoinHandle<()>,
}

pub struct RoomDispatcher<H> {
    handler: Arc<H>,
    mailboxes: DashMap<RoomId, Mailbox>,
    cancel: CancellationToken,
}

impl<H: MessageHandler> RoomDispatcher<H> {
    pub fn new(handler: Arc<H>, cancel: CancellationToken) -> Self {
        Self {
            handler,
            mailboxes: DashMap::new(),
            cancel,
        }
    }

    /// Queue a message on its room's mailbox, starting the worker on first use.
    ///
    /// Waits while the mailbox is full.
    pub async fn dispatch(&self, message: InboundMessage) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }

        let room_id = message.room_id.clone();
        let sender = self.sender_for(&room_id);
        match sender.send(message).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(message)) => {
                // The worker exited (panic or cancellation); start a fresh one once.
                self.mailboxes.remove(&room_id);
                if self.cancel.is_cancelled() {
                    return Err(DispatchError::ShuttingDown);
                }
                warn!(room_id = %room_id, "room worker was gone, restarting");
                self.sender_for(&room_id)
                    .send(message)
                    .await
                    .map_err(|_| DispatchError::WorkerGone(room_id))
            }
        }
    }

    /// Close a room's mailbox. The worker finishes what is already queued and
    /// then stops. Returns whether the room had a worker.
    pub fn close_room(&self, room_id: &RoomId) -> bool {
        match self.mailboxes.remove(room_id) {
            Some(_) => {
                debug!(room_id = %room_id, "closed room mailbox");
                true
            }
            None => false,
        }
    }

    /// Number of rooms with a live worker.
    pub fn active_rooms(&self) -> usize {
        self.mailboxes.len()
    }

    /// Close every mailbox and wait for the workers to drain them.
    ///
    /// Cancellation only stops new dispatches; messages already queued are
    /// still handled here.
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomId> = self.mailboxes.iter().map(|entry| entry.key().clone()).collect();
        for room_id in rooms {
            if let Some((_, mailbox)) = self.mailboxes.remove(&room_id) {
                drop(mailbox.sender);
                if let Err(error) = mailbox.worker.await {
                    warn!(room_id = %room_id, %error, "room worker ended abnormally");
                }
            }
        }
    }

    fn sender_for(&self, room_id: &RoomId) -> mpsc::Sender<InboundMessage> {
        self.mailboxes
            .entry(room_id.clone())
            .or_insert_with(|| self.spawn_worker(room_id.clone()))
            .sender
            .clone()
    }

    fn spawn_worker(&self, room_id: RoomId) -> Mailbox {
        let (sender, receiver) = mpsc::channel(MAILBOX_BUFFER);
        let handler = Arc::clone(&self.handler);
        debug!(room_id = %room_id, "starting room worker");
        let worker = tokio::spawn(run_worker(room_id, handler, receiver));
        Mailbox { sender, worker }
    }
}

async fn run_worker<H: MessageHandler>(
    room_id: RoomId,
    handler: Arc<H>,
    mut receiver: mpsc::Receiver<InboundMessage>,
) {
    // Runs until every sender is dropped and the queue is empty.
    while let Some(message) = receiver.recv().await {
        handler.handle_message(message).await;
    }
    debug!(room_id = %room_id, "room worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
