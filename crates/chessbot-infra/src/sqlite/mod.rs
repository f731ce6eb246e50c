//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod device;
pub mod pool;
pub mod room_state;
pub mod session;
pub mod sync_token;

pub use device::SqliteDeviceStore;
pub use pool::DatabasePool;
pub use room_state::SqliteRoomStateStore;
pub use session::SqliteSessionStore;
pub use sync_token::SqliteSyncTokenStore;

use chrono::{DateTime, Utc};
use chessbot_types::error::RepositoryError;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
