//! Infrastructure layer for the chess bot.
//!
//! Contains implementations of the ports defined in `chessbot-core`: SQLite
//! storage for sessions, room state and the sync token, the Matrix
//! client-server transport with its sync loop, and the config file loader.

pub mod config;
pub mod matrix;
pub mod sqlite;
