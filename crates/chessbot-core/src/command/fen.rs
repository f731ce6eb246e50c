//! Locate a position-notation (FEN) string inside free text.
//!
//! The grammar is fixed: eight ranks of piece letters and empty-square counts
//! separated by `/`, side to move, castling rights, en-passant target, and the
//! half-move and full-move counters, all whitespace separated. A match may sit
//! anywhere in the text. Only the shape is checked here; whether the position
//! is actually playable is decided later by the chess engine.

/// Return the first FEN-shaped substring of `text`, if any.
pub fn find_fen(text: &str) -> Option<&str> {
    let tokens = tokenize(text);
    if tokens.len() < 6 {
        return None;
    }

    for i in 0..=tokens.len() - 6 {
        let window = &tokens[i..i + 6];
        if !matches!(window[1].1, "w" | "b")
            || !is_castling(window[2].1)
            || !is_en_passant(window[3].1)
            || !is_counter(window[4].1)
        {
            continue;
        }
        let digits = leading_digits(window[5].1);
        if digits == 0 {
            continue;
        }
        let Some(board_start) = board_start(window[0].1) else {
            continue;
        };

        let start = window[0].0 + board_start;
        let end = window[5].0 + digits;
        return Some(&text[start..end]);
    }

    None
}

/// Whitespace-separated tokens with their byte offsets.
fn tokenize(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push((s, &text[s..idx]));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        tokens.push((s, &text[s..]));
    }
    tokens
}

fn is_board_char(ch: u8) -> bool {
    matches!(ch, b'r' | b'n' | b'b' | b'q' | b'k' | b'p' | b'R' | b'N' | b'B' | b'Q' | b'K' | b'P' | b'1'..=b'8')
}

/// Earliest offset in `token` from which the rest is a board field: eight
/// `/`-separated ranks of one to eight board chars each. Runs in one pass.
fn board_start(token: &str) -> Option<usize> {
    let bytes = token.as_bytes();
    let mut start = bytes
        .iter()
        .rposition(|&b| !(is_board_char(b) || b == b'/'))
        .map_or(0, |pos| pos + 1);

    let slashes: Vec<usize> = bytes[start..]
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'/')
        .map(|(idx, _)| start + idx)
        .collect();
    if slashes.len() < 7 {
        return None;
    }
    // Extra leading ranks belong to the glued prefix.
    let first_slash = slashes.len() - 7;
    if first_slash > 0 {
        start = slashes[first_slash - 1] + 1;
    }
    let slashes = &slashes[first_slash..];

    let first_rank = slashes[0] - start;
    if first_rank == 0 {
        return None;
    }
    start += first_rank.saturating_sub(8);

    let mut rank_start = slashes[0] + 1;
    for end in slashes[1..].iter().copied().chain(std::iter::once(bytes.len())) {
        if !(1..=8).contains(&(end - rank_start)) {
            return None;
        }
        rank_start = end + 1;
    }
    Some(start)
}

fn is_castling(token: &str) -> bool {
    if token == "-" {
        return true;
    }
    let mut order = ['K', 'Q', 'k', 'q'].iter();
    !token.is_empty() && token.chars().all(|ch| order.any(|&expected| expected == ch))
}

fn is_en_passant(token: &str) -> bool {
    match token.as_bytes() {
        [b'-'] => true,
        [file, rank] => (b'a'..=b'h').contains(file) && (b'3'..=b'6').contains(rank),
        _ => false,
    }
}

fn is_counter(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn leading_digits(token: &str) -> usize {
    token.bytes().take_while(|b| b.is_ascii_digit()).count()
}
