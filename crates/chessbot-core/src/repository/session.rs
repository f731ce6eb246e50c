//! Session Store trait definition.

use chessbot_types::error::RepositoryError;
use chessbot_types::game::GameSession;
use chessbot_types::ids::{EventId, RoomId};

/// Durable per-room game sessions plus the diagram reply index.
///
/// Implementations live in chessbot-infra (e.g., SqliteSessionStore).
/// Reads must reflect the latest committed write from this process.
pub trait SessionStore: Send + Sync {
    /// Get the session for a room, if one was ever stored.
    fn get(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<Option<GameSession>, RepositoryError>> + Send;

    /// Insert or overwrite the session for `session.room_id`.
    fn put(
        &self,
        session: &GameSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Diagram previously sent in reply to `source_event_id`.
    fn get_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
    ) -> impl std::future::Future<Output = Result<Option<EventId>, RepositoryError>> + Send;

    /// Upsert the diagram sent in reply to `source_event_id` (last write wins).
    fn set_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
        diagram_event_id: &EventId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
