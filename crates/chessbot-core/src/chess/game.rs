//! A chess game with PGN import/export, backed by shakmaty.
//!
//! The bot stores nothing but PGN text per room, so every move re-parses the
//! history into a [`ChessGame`], plays one move, and writes PGN back.

use std::fmt::Write as _;

use chessbot_types::error::GameError;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, File, Move, Position, Square};

/// A move that was just played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub san: String,
    pub from: Square,
    pub to: Square,
}

/// Move history plus the current position.
#[derive(Debug, Clone)]
pub struct ChessGame {
    tags: Vec<(String, String)>,
    initial_fen: Option<String>,
    initial: Chess,
    position: Chess,
    moves: Vec<String>,
}

impl Default for ChessGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessGame {
    /// A game from the standard starting position.
    pub fn new() -> Self {
        Self {
            tags: Vec::new(),
            initial_fen: None,
            initial: Chess::default(),
            position: Chess::default(),
            moves: Vec::new(),
        }
    }

    /// Add a PGN tag pair.
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((name.into(), value.into()));
        self
    }

    /// A game starting from a FEN position.
    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let position = parse_fen(fen)?;
        Ok(Self {
            tags: Vec::new(),
            initial_fen: Some(fen.trim().to_string()),
            initial: position.clone(),
            position,
            moves: Vec::new(),
        })
    }

    /// Rebuild a game from PGN text.
    ///
    /// Tag pairs are kept (a `FEN` tag sets the starting position). Move
    /// numbers, results, comments, variations, NAGs and `!`/`?` glyphs in the
    /// movetext are skipped.
    pub fn from_pgn(pgn: &str) -> Result<Self, GameError> {
        let mut tags = Vec::new();
        let mut initial_fen = None;
        let mut movetext = String::new();

        for line in pgn.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                let (name, value) = parse_tag(trimmed)
                    .ok_or_else(|| GameError::InvalidPgn(format!("malformed tag '{trimmed}'")))?;
                match name.as_str() {
                    "FEN" => initial_fen = Some(value),
                    "SetUp" => {}
                    _ => tags.push((name, value)),
                }
            } else {
                movetext.push_str(line);
                movetext.push('\n');
            }
        }

        let mut game = match &initial_fen {
            Some(fen) => Self::from_fen(fen).map_err(|e| GameError::InvalidPgn(e.to_string()))?,
            None => Self::new(),
        };
        game.tags = tags;

        for token in movetext_tokens(&movetext) {
            game.play(&token)
                .map_err(|_| GameError::InvalidPgn(format!("illegal move '{token}'")))?;
        }

        Ok(game)
    }

    /// Play a move given as SAN (`Nf3`, `exd5`, `O-O`, `e8=Q+`) or UCI (`g1f3`).
    pub fn play(&mut self, text: &str) -> Result<PlayedMove, GameError> {
        let text = text.trim();
        let chess_move = self
            .parse_move(text)
            .ok_or_else(|| GameError::IllegalMove(text.to_string()))?;

        let (from, to) = move_squares(&chess_move);
        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, &chess_move).to_string();
        self.moves.push(san.clone());

        Ok(PlayedMove { san, from, to })
    }

    fn parse_move(&self, text: &str) -> Option<Move> {
        text.parse::<SanPlus>()
            .ok()
            .and_then(|san| san.san.to_move(&self.position).ok())
            .or_else(|| {
                text.parse::<UciMove>()
                    .ok()
                    .and_then(|uci| uci.to_move(&self.position).ok())
            })
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// SAN of every move played so far.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Serialize as PGN: tag pairs, a blank line, numbered movetext, `*`.
    pub fn to_pgn(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.tags {
            let _ = writeln!(out, "[{name} \"{}\"]", escape_tag(value));
        }
        if let Some(fen) = &self.initial_fen {
            let _ = writeln!(out, "[SetUp \"1\"]");
            let _ = writeln!(out, "[FEN \"{}\"]", escape_tag(fen));
        }
        if !out.is_empty() {
            out.push('\n');
        }

        let mut number = self.initial.fullmoves().get();
        let mut white_to_move = self.initial.turn() == Color::White;
        let mut parts = Vec::with_capacity(self.moves.len() + 1);
        for (index, san) in self.moves.iter().enumerate() {
            if white_to_move {
                parts.push(format!("{number}."));
            } else if index == 0 {
                parts.push(format!("{number}..."));
            }
            parts.push(san.clone());
            if !white_to_move {
                number += 1;
            }
            white_to_move = !white_to_move;
        }
        parts.push("*".to_string());
        out.push_str(&parts.join(" "));
        out
    }
}

fn parse_fen(text: &str) -> Result<Chess, GameError> {
    let fen: Fen = text
        .trim()
        .parse()
        .map_err(|e| GameError::InvalidPosition(format!("{e}")))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| GameError::InvalidPosition(format!("{e}")))
}

/// Origin and destination squares, with castling reported as the king's path.
fn move_squares(chess_move: &Move) -> (Square, Square) {
    match *chess_move {
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() { File::G } else { File::C };
            (king, Square::from_coords(file, king.rank()))
        }
        ref other => (other.from().unwrap_or(other.to()), other.to()),
    }
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    let (name, value) = inner.split_once(char::is_whitespace)?;
    let value = value.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((
        name.to_string(),
        value.replace("\\\"", "\"").replace("\\\\", "\\"),
    ))
}

fn escape_tag(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// SAN tokens of a movetext section.
fn movetext_tokens(movetext: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(movetext.len());
    let mut brace = false;
    let mut line_comment = false;
    let mut depth = 0u32;
    for ch in movetext.chars() {
        match ch {
            _ if line_comment => {
                if ch == '\n' {
                    line_comment = false;
                    cleaned.push(' ');
                }
            }
            '}' if brace => brace = false,
            _ if brace => {}
            '{' => brace = true,
            ';' => line_comment = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ => cleaned.push(ch),
        }
    }

    cleaned
        .split_whitespace()
        .filter_map(|token| {
            let token = match token.rfind('.') {
                Some(dot) if token[..dot].chars().all(|c| c.is_ascii_digit() || c == '.') => {
                    &token[dot + 1..]
                }
                _ => token,
            };
            let token = token.trim_end_matches(['!', '?']);
            if token.is_empty()
                || token.starts_with('$')
                || matches!(token, "*" | "1-0" | "0-1" | "1/2-1/2")
            {
                return None;
            }
            Some(token.to_string())
        })
        .collect()
}
