//! Classification of inbound message text.

use std::fmt;

/// What a room message asks the bot to do.
///
/// Precedence when classifying: explicit commands, then an embedded
/// position, then a move attempt against the active game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// An addressed command, e.g. `!chess new`.
    Command { name: String, args: Vec<String> },
    /// A position-notation (FEN) string found somewhere in the text.
    PositionImport(String),
    /// Text to try as a move in the room's active game.
    MoveAttempt(String),
    /// Not for us.
    NotApplicable,
}

impl Classification {
    pub fn command(name: impl Into<String>, args: Vec<String>) -> Self {
        Classification::Command {
            name: name.into(),
            args,
        }
    }
}

/// Commands the bot understands. Anything else gets the help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    New,
    Help,
}

impl BotCommand {
    /// Resolve a command name case-insensitively; unknown names map to `Help`.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "new" => BotCommand::New,
            _ => BotCommand::Help,
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotCommand::New => write!(f, "new"),
            BotCommand::Help => write!(f, "help"),
        }
    }
}
