use thiserror::Error;

/// Errors from repository operations (used by trait definitions in chessbot-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by the chat transport for a single network call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),

    #[error("homeserver returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("client is not logged in")]
    NotLoggedIn,
}

/// Errors from the end-to-end encryption collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("group session expired")]
    SessionExpired,

    #[error("group session not shared")]
    SessionNotShared,

    #[error("no group session")]
    NoGroupSession,

    #[error("encryption support is unavailable")]
    Unavailable,

    #[error("crypto failure: {0}")]
    Failed(String),
}

impl CryptoError {
    /// Whether this failure is cured by sharing a fresh group session.
    pub fn needs_new_session(&self) -> bool {
        matches!(
            self,
            CryptoError::SessionExpired | CryptoError::SessionNotShared | CryptoError::NoGroupSession
        )
    }
}

/// Terminal failure of one outbound delivery.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("{action} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        action: String,
        attempts: u32,
        last_error: TransportError,
    },

    #[error("encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error("could not render diagram: {0}")]
    Render(String),

    /// Encryption state or membership for the room could not be read.
    #[error("room state unavailable: {0}")]
    RoomState(String),
}

/// Errors from the chess rules wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("illegal move '{0}'")]
    IllegalMove(String),

    #[error("invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),
}

/// Errors loading the bot configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
