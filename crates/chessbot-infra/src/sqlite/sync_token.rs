//! Persisted sync position.
//!
//! The homeserver hands out a `next_batch` token with every sync response.
//! Storing it per account lets a restarted bot resume where it stopped
//! instead of replaying old timelines.

use chessbot_types::error::RepositoryError;
use chessbot_types::ids::UserId;

use super::pool::DatabasePool;

pub struct SqliteSyncTokenStore {
    pool: DatabasePool,
}

impl SqliteSyncTokenStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get_next_batch(&self, user_id: &UserId) -> Result<Option<String>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT next_batch FROM sync_tokens WHERE user_id = ?")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row.map(|(token,)| token))
    }

    pub async fn set_next_batch(&self, user_id: &UserId, next_batch: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO sync_tokens (user_id, next_batch) VALUES (?, ?)
               ON CONFLICT (user_id) DO UPDATE SET next_batch = excluded.next_batch"#,
        )
        .bind(user_id.as_str())
        .bind(next_batch)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}
