//! Inbound event plumbing.
//!
//! - `router` -- `EventRouter` turns protocol events into room state updates
//!   and plaintext messages
//! - `mailbox` -- `RoomDispatcher` runs one ordered worker per room
//! - `handler` -- `MessageHandler` trait the workers call

pub mod handler;
pub mod mailbox;
pub mod router;

pub use handler::MessageHandler;
pub use mailbox::{DispatchError, RoomDispatcher};
pub use router::EventRouter;
