//! Business logic and port trait definitions for the chess bot.
//!
//! This crate defines the "ports" (storage, transport and crypto traits) that
//! the infrastructure layer implements, plus everything that decides what the
//! bot says: message classification, the chess game wrapper and diagram
//! renderer, the delivery pipeline, the per-room game controller and the
//! inbound dispatch. It depends only on `chessbot-types` -- never on
//! `chessbot-infra` or any database/IO crate.

pub mod chess;
pub mod command;
pub mod delivery;
pub mod dispatch;
pub mod repository;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
