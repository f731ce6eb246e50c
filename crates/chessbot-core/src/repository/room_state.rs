//! Room state trait definition: membership and encryption flags.

use chessbot_types::error::RepositoryError;
use chessbot_types::event::Membership;
use chessbot_types::ids::{RoomId, UserId};

/// Membership and encryption state tracked from room state events.
///
/// The delivery pipeline reads it to decide whether to encrypt and whom to
/// share a group session with; the event router writes it.
pub trait RoomStateStore: Send + Sync {
    /// Record a membership change. Leave and ban remove the member.
    fn set_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        membership: Membership,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a room encrypted, keeping the raw `m.room.encryption` content.
    fn set_encryption(
        &self,
        room_id: &RoomId,
        content: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn is_encrypted(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Users whose membership is `join`.
    fn joined_members(
        &self,
        room_id: &RoomId,
    ) -> impl std::future::Future<Output = Result<Vec<UserId>, RepositoryError>> + Send;
}
