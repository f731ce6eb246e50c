//! Per-room game session and diagram reply records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, RoomId};

/// The chess game tracked for one room.
///
/// There is at most one session per room. `pgn` is the authoritative move
/// history; an empty `pgn` means no game is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub room_id: RoomId,
    pub pgn: String,
    /// The board image most recently sent for this game, if any.
    pub last_diagram_event_id: Option<EventId>,
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    pub fn new(room_id: RoomId, pgn: String, last_diagram_event_id: Option<EventId>) -> Self {
        Self {
            room_id,
            pgn,
            last_diagram_event_id,
            updated_at: Utc::now(),
        }
    }

    /// Whether a game is in progress.
    pub fn is_active(&self) -> bool {
        !self.pgn.trim().is_empty()
    }
}

/// Maps a message that carried a position to the diagram sent in reply.
///
/// Keyed by `(room_id, source_event_id)`; later writes win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramReply {
    pub room_id: RoomId,
    pub source_event_id: EventId,
    pub diagram_event_id: EventId,
}
