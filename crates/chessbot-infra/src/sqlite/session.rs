//! SQLite Session Store implementation.
//!
//! Implements `SessionStore` from `chessbot-core`: one `game_sessions` row per
//! room and the `sent_diagram_events` reply index. Both are upserts, so the
//! latest write always wins.

use chessbot_core::repository::SessionStore;
use chessbot_types::error::RepositoryError;
use chessbot_types::game::GameSession;
use chessbot_types::ids::{EventId, RoomId};
use chrono::Utc;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `SessionStore`.
pub struct SqliteSessionStore {
    pool: DatabasePool,
}

impl SqliteSessionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    room_id: String,
    pgn: String,
    last_diagram_event_id: Option<String>,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            room_id: row.try_get("room_id")?,
            pgn: row.try_get("pgn")?,
            last_diagram_event_id: row.try_get("last_diagram_event_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<GameSession, RepositoryError> {
        Ok(GameSession {
            room_id: RoomId::new(self.room_id),
            pgn: self.pgn,
            last_diagram_event_id: self.last_diagram_event_id.map(EventId::new),
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// SessionStore implementation
// ---------------------------------------------------------------------------

impl SessionStore for SqliteSessionStore {
    async fn get(&self, room_id: &RoomId) -> Result<Option<GameSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT room_id, pgn, last_diagram_event_id, updated_at FROM game_sessions WHERE room_id = ?",
        )
        .bind(room_id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| {
            SessionRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_session()
        })
        .transpose()
    }

    async fn put(&self, session: &GameSession) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO game_sessions (room_id, pgn, last_diagram_event_id, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (room_id) DO UPDATE SET
                   pgn = excluded.pgn,
                   last_diagram_event_id = excluded.last_diagram_event_id,
                   updated_at = excluded.updated_at"#,
        )
        .bind(session.room_id.as_str())
        .bind(&session.pgn)
        .bind(session.last_diagram_event_id.as_ref().map(EventId::as_str))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
    ) -> Result<Option<EventId>, RepositoryError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT diagram_event_id FROM sent_diagram_events WHERE room_id = ? AND source_event_id = ?",
        )
        .bind(room_id.as_str())
        .bind(source_event_id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row.map(|(id,)| EventId::new(id)))
    }

    async fn set_diagram_for_source(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
        diagram_event_id: &EventId,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        sqlx::query(
            r#"INSERT INTO sent_diagram_events (room_id, source_event_id, diagram_event_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (room_id, source_event_id) DO UPDATE SET
                   diagram_event_id = excluded.diagram_event_id,
                   updated_at = excluded.updated_at"#,
        )
        .bind(room_id.as_str())
        .bind(source_event_id.as_str())
        .bind(diagram_event_id.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}
