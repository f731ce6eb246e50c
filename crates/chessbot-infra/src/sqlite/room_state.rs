//! SQLite Room State Store implementation.
//!
//! Membership rows exist only for users who are invited, joined or knocking;
//! leave and ban delete the row. A room is encrypted once its `rooms` row
//! carries an `m.room.encryption` payload.

use chessbot_core::repository::RoomStateStore;
use chessbot_types::error::RepositoryError;
use chessbot_types::event::Membership;
use chessbot_types::ids::{RoomId, UserId};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RoomStateStore`.
pub struct SqliteRoomStateStore {
    pool: DatabasePool,
}

impl SqliteRoomStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl RoomStateStore for SqliteRoomStateStore {
    async fn set_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        membership: Membership,
    ) -> Result<(), RepositoryError> {
        if membership.is_leave_or_ban() {
            sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
                .bind(room_id.as_str())
                .bind(user_id.as_str())
                .execute(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            return Ok(());
        }

        sqlx::query(
            r#"INSERT INTO room_members (room_id, user_id, membership)
               VALUES (?, ?, ?)
               ON CONFLICT (room_id, user_id) DO UPDATE SET membership = excluded.membership"#,
        )
        .bind(room_id.as_str())
        .bind(user_id.as_str())
        .bind(membership.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn set_encryption(
        &self,
        room_id: &RoomId,
        content: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(content)
            .map_err(|e| RepositoryError::Query(format!("encode encryption event: {e}")))?;

        sqlx::query(
            r#"INSERT INTO rooms (room_id, encryption_event) VALUES (?, ?)
               ON CONFLICT (room_id) DO UPDATE SET encryption_event = excluded.encryption_event"#,
        )
        .bind(room_id.as_str())
        .bind(encoded)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn is_encrypted(&self, room_id: &RoomId) -> Result<bool, RepositoryError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT encryption_event FROM rooms WHERE room_id = ?")
                .bind(room_id.as_str())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(matches!(row, Some((Some(_),))))
    }

    async fn joined_members(&self, room_id: &RoomId) -> Result<Vec<UserId>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM room_members WHERE room_id = ? AND membership = 'join' ORDER BY user_id",
        )
        .bind(room_id.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| UserId::new(id)).collect())
    }
}
