//! Persisted login device.
//!
//! The first password login creates a device; later logins pass the stored
//! id back so the homeserver keeps the same device (and the crypto store's
//! keys stay valid) across restarts.

use chessbot_types::error::RepositoryError;
use chessbot_types::ids::UserId;

use super::pool::DatabasePool;

pub struct SqliteDeviceStore {
    pool: DatabasePool,
}

impl SqliteDeviceStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get_device_id(&self, user_id: &UserId) -> Result<Option<String>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT device_id FROM device_ids WHERE user_id = ?")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row.map(|(device_id,)| device_id))
    }

    pub async fn set_device_id(&self, user_id: &UserId, device_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO device_ids (user_id, device_id) VALUES (?, ?)
               ON CONFLICT (user_id) DO UPDATE SET device_id = excluded.device_id"#,
        )
        .bind(user_id.as_str())
        .bind(device_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}
