//! Game Session Controller and its outcome model.

pub mod controller;
pub mod help;
pub mod outcome;

pub use controller::GameController;
pub use outcome::{HandleOutcome, NoOpReason, ReplyKind};
