//! Shared domain types for the chess bot.
//!
//! Identifiers, the per-room game session record, message classification,
//! the inbound/outbound event model, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod game;
pub mod ids;
