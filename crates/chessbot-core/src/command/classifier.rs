//! Turns raw message text into a [`Classification`].
//!
//! Valid command forms, where `chessbot` is the bot's localpart:
//!
//! ```text
//! chessbot: new
//! @chessbot new
//! @chessbot: new
//! !chess new
//! !chessbot new
//! !chessbot: new
//! ```
//!
//! A bare bang prefix (`!chess`, `!chessbot`) is the `help` command. Text that
//! is not a command is searched for a FEN, and failing that is offered as a
//! move when the room has a game in progress.

use chessbot_types::command::Classification;

use super::fen::find_fen;

const BANG_PREFIXES: [&str; 2] = ["!chessbot", "!chess"];

/// Stateless classifier bound to the bot's localpart.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    localpart: String,
}

impl CommandClassifier {
    pub fn new(localpart: impl Into<String>) -> Self {
        Self {
            localpart: localpart.into(),
        }
    }

    /// Classify a message body.
    ///
    /// `game_active` says whether the room has a game in progress; without
    /// one, plain text is not a move attempt.
    pub fn classify(&self, body: &str, game_active: bool) -> Classification {
        let body = body.trim();
        if body.is_empty() {
            return Classification::NotApplicable;
        }

        if let Some(parts) = self.command_parts(body) {
            let mut parts = parts.into_iter();
            let name = parts.next().unwrap_or_else(|| "help".to_string());
            return Classification::command(name, parts.collect());
        }

        if let Some(fen) = find_fen(body) {
            return Classification::PositionImport(fen.to_string());
        }

        if game_active {
            return Classification::MoveAttempt(body.to_string());
        }

        Classification::NotApplicable
    }

    /// Split an addressed command into `[name, args...]`.
    ///
    /// Returns `None` when `body` is not addressed to the bot.
    fn command_parts(&self, body: &str) -> Option<Vec<String>> {
        if body.contains('\n') {
            return None;
        }
        let remainder = self.strip_prefix(body)?.trim();
        if remainder.is_empty() {
            return Some(vec!["help".to_string()]);
        }
        Some(remainder.split(' ').map(str::to_string).collect())
    }

    fn strip_prefix<'a>(&self, body: &'a str) -> Option<&'a str> {
        if let Some(rest) = body.strip_prefix(self.localpart.as_str()) {
            if let Some(rest) = rest.strip_prefix(':') {
                return Some(rest);
            }
        }

        if let Some(rest) = body
            .strip_prefix('@')
            .and_then(|rest| rest.strip_prefix(self.localpart.as_str()))
        {
            if let Some(rest) = rest.strip_prefix(':') {
                return Some(rest);
            }
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(rest);
            }
        }

        for prefix in BANG_PREFIXES {
            let Some(rest) = body.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                return Some(rest);
            }
            let rest = rest.strip_prefix(':').unwrap_or(rest);
            if let Some(rest) = rest.strip_prefix(' ') {
                return Some(rest);
            }
        }

        None
    }
}
