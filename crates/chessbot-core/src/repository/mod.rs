//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (chessbot-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod room_state;
pub mod session;

pub use room_state::RoomStateStore;
pub use session::SessionStore;
