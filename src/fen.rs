//! FEN grammar checks and piece-placement helpers.
//!
//! Only syntax is checked here: six fields, eight ranks of eight files, a side
//! to move, castling letters, an en passant square that matches the side to
//! move, and the two move counters. Legality of the position is not checked.

use shakmaty::{Color, Piece, Role};
use thiserror::Error;

/// Standard initial position, substituted whenever extraction finds nothing valid.
pub const DEFAULT_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("expected 6 fields, got {0}")]
    FieldCount(usize),
    #[error("expected 8 ranks, got {0}")]
    RankCount(usize),
    #[error("rank {rank} covers {files} files")]
    RankWidth { rank: usize, files: u32 },
    #[error("invalid character '{0}' in piece placement")]
    PlacementChar(char),
    #[error("invalid side to move '{0}'")]
    SideToMove(String),
    #[error("invalid castling field '{0}'")]
    Castling(String),
    #[error("invalid en passant field '{0}'")]
    EnPassant(String),
    #[error("invalid halfmove clock '{0}'")]
    Halfmove(String),
    #[error("invalid fullmove number '{0}'")]
    Fullmove(String),
}

/// Checks a candidate against the FEN grammar, reporting the first violation.
pub fn validate_fen(fen: &str) -> Result<(), FenError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(FenError::FieldCount(fields.len()));
    }

    validate_placement(fields[0])?;

    let side = fields[1];
    if side != "w" && side != "b" {
        return Err(FenError::SideToMove(side.to_string()));
    }

    let castling: String = fields[2]
        .chars()
        .filter(|c| matches!(c, 'K' | 'Q' | 'k' | 'q' | '-'))
        .collect();
    if !castling_ok(&castling) {
        return Err(FenError::Castling(fields[2].to_string()));
    }

    let ep = fields[3];
    if ep != "-" {
        let bytes = ep.as_bytes();
        let shaped = bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && matches!(bytes[1], b'3' | b'6');
        let expected_rank = if side == "w" { b'6' } else { b'3' };
        if !shaped || bytes[1] != expected_rank {
            return Err(FenError::EnPassant(ep.to_string()));
        }
    }

    let halfmove = fields[4];
    if halfmove.is_empty() || !halfmove.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FenError::Halfmove(halfmove.to_string()));
    }

    let fullmove = fields[5];
    if fullmove.is_empty()
        || !fullmove.bytes().all(|b| b.is_ascii_digit())
        || fullmove.bytes().all(|b| b == b'0')
    {
        return Err(FenError::Fullmove(fullmove.to_string()));
    }

    Ok(())
}

pub fn is_valid_fen(fen: &str) -> bool {
    validate_fen(fen).is_ok()
}

/// Rejoins the fields with single spaces.
pub fn normalize(fen: &str) -> String {
    fen.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the normalized candidate when valid, otherwise the initial position.
pub fn or_default(candidate: Option<&str>) -> String {
    match candidate {
        Some(fen) if is_valid_fen(fen) => normalize(fen),
        _ => DEFAULT_FEN.to_string(),
    }
}

fn validate_placement(placement: &str) -> Result<(), FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::RankCount(ranks.len()));
    }
    for (index, rank) in ranks.iter().enumerate() {
        let mut files = 0u32;
        for c in rank.chars() {
            match c {
                '1'..='8' => files += c.to_digit(10).unwrap_or(0),
                c if Piece::from_char(c).is_some() => files += 1,
                other => return Err(FenError::PlacementChar(other)),
            }
        }
        if files != 8 {
            return Err(FenError::RankWidth { rank: 8 - index, files });
        }
    }
    Ok(())
}

// Equivalent to ^(KQ?k?q?|Qk?q?|kq?|q|-)$
fn castling_ok(castling: &str) -> bool {
    if castling == "-" {
        return true;
    }
    let mut rest = castling;
    let mut matched = false;
    for letter in ["K", "Q", "k", "q"] {
        if let Some(stripped) = rest.strip_prefix(letter) {
            rest = stripped;
            matched = true;
        }
    }
    matched && rest.is_empty()
}

/// 8×8 grid in FEN order: row 0 is rank 8, file 0 is the a-file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardGrid {
    squares: [[Option<Piece>; 8]; 8],
}

impl BoardGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a piece, replacing whatever was there. Out-of-range indices are ignored.
    pub fn place(&mut self, row: usize, file: usize, piece: Piece) -> bool {
        match self.squares.get_mut(row).and_then(|r| r.get_mut(file)) {
            Some(square) => {
                *square = Some(piece);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, row: usize, file: usize) -> Option<Piece> {
        self.squares.get(row).and_then(|r| r.get(file)).copied().flatten()
    }

    pub fn piece_count(&self) -> usize {
        self.squares.iter().flatten().filter(|sq| sq.is_some()).count()
    }

    pub fn king_count(&self, color: Color) -> usize {
        let king = Piece { color, role: Role::King };
        self.squares.iter().flatten().filter(|sq| **sq == Some(king)).count()
    }

    /// Piece-placement field, run-length encoding empty squares.
    pub fn placement(&self) -> String {
        let rows: Vec<String> = self
            .squares
            .iter()
            .map(|row| {
                let mut out = String::new();
                let mut empty = 0;
                for square in row {
                    match square {
                        Some(piece) => {
                            if empty > 0 {
                                out.push_str(&empty.to_string());
                                empty = 0;
                            }
                            out.push(piece.char());
                        }
                        None => empty += 1,
                    }
                }
                if empty > 0 {
                    out.push_str(&empty.to_string());
                }
                out
            })
            .collect();
        rows.join("/")
    }
}

/// Walks the placement field of `fen` and yields `(row, file, piece)` for every
/// piece found before the first malformed character. A broken field gives a
/// partial list rather than an error.
pub fn placed_pieces(fen: &str) -> Vec<(usize, usize, Piece)> {
    let placement = fen.split_whitespace().next().unwrap_or("");
    let mut pieces = Vec::new();

    for (row, rank) in placement.split('/').enumerate().take(8) {
        let mut file = 0usize;
        for c in rank.chars() {
            if let Some(skip) = c.to_digit(10) {
                file += skip as usize;
            } else if let Some(piece) = Piece::from_char(c) {
                if file < 8 {
                    pieces.push((row, file, piece));
                }
                file += 1;
            } else {
                return pieces;
            }
        }
    }
    pieces
}
