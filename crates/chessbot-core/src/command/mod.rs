//! Message classification: addressed commands, embedded positions, moves.

pub mod classifier;
pub mod fen;

pub use classifier::CommandClassifier;
pub use fen::find_fen;
