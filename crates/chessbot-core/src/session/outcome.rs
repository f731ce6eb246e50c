//! Every handled message ends in exactly one [`HandleOutcome`].
//!
//! No path propagates an error to the event task; failures become
//! [`NoOpReason`]s that are logged and otherwise invisible to the room.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Replied(ReplyKind),
    Ignored(NoOpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    NewGame,
    Help,
    PositionDiagram,
    MoveDiagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    OwnMessage,
    NotApplicable,
    NoActiveGame,
    IllegalMove,
    PositionParseError,
    DeliveryFailed,
    StorageFailed,
    RenderFailed,
}

impl fmt::Display for HandleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleOutcome::Replied(kind) => write!(f, "replied:{kind:?}"),
            HandleOutcome::Ignored(reason) => write!(f, "ignored:{reason:?}"),
        }
    }
}
